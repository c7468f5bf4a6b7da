//! Tax treaty model.

use chrono::NaiveDate;
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Income category a withholding rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Professional,
    Royalties,
    Interest,
    Dividends,
    Rental,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Professional => "professional",
            ServiceCategory::Royalties => "royalties",
            ServiceCategory::Interest => "interest",
            ServiceCategory::Dividends => "dividends",
            ServiceCategory::Rental => "rental",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "royalties" => ServiceCategory::Royalties,
            "interest" => ServiceCategory::Interest,
            "dividends" => ServiceCategory::Dividends,
            "rental" => ServiceCategory::Rental,
            _ => ServiceCategory::Professional,
        }
    }
}

/// Bilateral withholding agreement between two countries for one income
/// category. Matches in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxTreaty {
    pub treaty_id: Uuid,
    pub country_a: String,
    pub country_b: String,
    pub service_category: ServiceCategory,
    pub withholding_rate: Decimal,
    /// Reduced rate is granted only with a tax-residency certificate on file.
    pub requires_certificate: bool,
    pub effective_from: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub active: bool,
}

impl TaxTreaty {
    pub fn try_new(
        country_a: &str,
        country_b: &str,
        service_category: ServiceCategory,
        withholding_rate: Decimal,
        requires_certificate: bool,
    ) -> Result<Self, AppError> {
        let country_a = country_a.to_uppercase();
        let country_b = country_b.to_uppercase();
        if country_a == country_b {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "treaty countries must be different"
            )));
        }
        if withholding_rate < Decimal::ZERO || withholding_rate > Decimal::ONE_HUNDRED {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "withholding rate must be between 0 and 100"
            )));
        }
        Ok(Self {
            treaty_id: Uuid::new_v4(),
            country_a,
            country_b,
            service_category,
            withholding_rate,
            requires_certificate,
            effective_from: None,
            expiry_date: None,
            active: true,
        })
    }

    pub fn with_effective_window(
        mut self,
        effective_from: Option<NaiveDate>,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Self, AppError> {
        if let (Some(from), Some(until)) = (effective_from, expiry_date) {
            if until < from {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "treaty expiry cannot be before its effective date"
                )));
            }
        }
        self.effective_from = effective_from;
        self.expiry_date = expiry_date;
        Ok(self)
    }

    /// Sorted country-pair code, e.g. `DE-US`.
    pub fn code(&self) -> String {
        let mut codes = [self.country_a.as_str(), self.country_b.as_str()];
        codes.sort();
        format!("{}-{}", codes[0], codes[1])
    }

    /// Whether this treaty covers the country pair (either direction) for
    /// the category on the given date.
    pub fn matches(
        &self,
        country_1: &str,
        country_2: &str,
        category: ServiceCategory,
        as_of: NaiveDate,
    ) -> bool {
        if !self.active || self.service_category != category {
            return false;
        }
        let pair_matches = (self.country_a == country_1 && self.country_b == country_2)
            || (self.country_a == country_2 && self.country_b == country_1);
        if !pair_matches {
            return false;
        }
        if let Some(from) = self.effective_from {
            if as_of < from {
                return false;
            }
        }
        if let Some(until) = self.expiry_date {
            if as_of > until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_country_rejected() {
        let err = TaxTreaty::try_new("NL", "nl", ServiceCategory::Professional, Decimal::TEN, true)
            .unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[test]
    fn matches_in_either_direction() {
        let treaty =
            TaxTreaty::try_new("NL", "IN", ServiceCategory::Professional, Decimal::TEN, true)
                .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(treaty.matches("NL", "IN", ServiceCategory::Professional, day));
        assert!(treaty.matches("IN", "NL", ServiceCategory::Professional, day));
        assert!(!treaty.matches("IN", "NL", ServiceCategory::Royalties, day));
        assert!(!treaty.matches("IN", "DE", ServiceCategory::Professional, day));
    }

    #[test]
    fn effective_window_is_honored() {
        let treaty =
            TaxTreaty::try_new("DE", "US", ServiceCategory::Professional, Decimal::TEN, true)
                .unwrap()
                .with_effective_window(
                    NaiveDate::from_ymd_opt(2026, 1, 1),
                    NaiveDate::from_ymd_opt(2026, 12, 31),
                )
                .unwrap();
        assert!(!treaty.matches(
            "DE",
            "US",
            ServiceCategory::Professional,
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        ));
        assert!(treaty.matches(
            "DE",
            "US",
            ServiceCategory::Professional,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
        ));
        assert!(!treaty.matches(
            "DE",
            "US",
            ServiceCategory::Professional,
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()
        ));
    }

    #[test]
    fn code_is_sorted() {
        let treaty =
            TaxTreaty::try_new("US", "DE", ServiceCategory::Professional, Decimal::TEN, false)
                .unwrap();
        assert_eq!(treaty.code(), "DE-US");
    }
}
