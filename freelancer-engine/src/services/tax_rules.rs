//! Tax rule resolver: VAT treatment and withholding classification.

use crate::models::{Freelancer, ServiceCategory, TaxConfig, TaxTreaty};
use crate::services::metrics::TAX_RESOLUTIONS_TOTAL;
use chrono::NaiveDate;
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of classifying one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxClassification {
    pub vat_rate: Decimal,
    pub reverse_charge: bool,
    pub withholding_rate: Decimal,
    pub treaty_applied: bool,
}

impl TaxClassification {
    fn treatment(&self) -> &'static str {
        if self.reverse_charge {
            "reverse_charge"
        } else if self.vat_rate.is_zero() {
            "zero_rated_export"
        } else {
            "standard"
        }
    }
}

/// Classifies transactions against the injected read-only reference data.
/// Holds no mutable state: identical inputs always yield the identical
/// classification.
pub struct TaxRuleResolver {
    reference: Arc<TaxConfig>,
}

impl TaxRuleResolver {
    pub fn new(reference: Arc<TaxConfig>) -> Self {
        Self { reference }
    }

    /// Classify a transaction between the freelancer and a counterparty
    /// jurisdiction.
    #[instrument(skip(self, freelancer), fields(
        freelancer_country = freelancer.tax_country(),
        counterparty_country = counterparty_country,
        b2b = b2b,
        category = category.as_str(),
    ))]
    pub fn resolve(
        &self,
        freelancer: &Freelancer,
        counterparty_country: &str,
        b2b: bool,
        category: ServiceCategory,
        as_of: NaiveDate,
    ) -> Result<TaxClassification, AppError> {
        let freelancer_country = freelancer.tax_country().to_uppercase();
        let counterparty_country = counterparty_country.to_uppercase();

        let (vat_rate, reverse_charge) =
            self.resolve_vat(&freelancer_country, &counterparty_country, b2b)?;
        let (withholding_rate, treaty_applied) = self.resolve_withholding(
            &freelancer_country,
            &counterparty_country,
            freelancer.tax_certificate_on_file,
            category,
            as_of,
        )?;

        let classification = TaxClassification {
            vat_rate,
            reverse_charge,
            withholding_rate,
            treaty_applied,
        };
        TAX_RESOLUTIONS_TOTAL
            .with_label_values(&[classification.treatment()])
            .inc();
        debug!(
            vat_rate = %classification.vat_rate,
            reverse_charge = classification.reverse_charge,
            withholding_rate = %classification.withholding_rate,
            treaty_applied = classification.treaty_applied,
            "transaction classified"
        );
        Ok(classification)
    }

    /// VAT treatment, first match wins:
    /// 1. EU freelancer, EU counterparty, B2B: reverse charge.
    /// 2. Non-EU freelancer, EU counterparty, B2B: import reverse charge.
    /// 3. EU freelancer, non-EU counterparty: zero-rated export.
    /// 4. Otherwise: the standard rate of the freelancer's country.
    fn resolve_vat(
        &self,
        freelancer_country: &str,
        counterparty_country: &str,
        b2b: bool,
    ) -> Result<(Decimal, bool), AppError> {
        let freelancer_eu = self.reference.is_eu(freelancer_country);
        let counterparty_eu = self.reference.is_eu(counterparty_country);

        if counterparty_eu && b2b {
            // Rules 1 and 2 collapse: B2B supplies into the EU shift VAT to
            // the recipient whether the freelancer is EU or not.
            return Ok((Decimal::ZERO, true));
        }
        if freelancer_eu && !counterparty_eu {
            return Ok((Decimal::ZERO, false));
        }

        let configuration = self
            .reference
            .vat_configuration(freelancer_country)
            .ok_or_else(|| {
                AppError::RuleResolution(anyhow::anyhow!(
                    "no VAT configuration for {}; refusing to default to 0%",
                    freelancer_country
                ))
            })?;
        Ok((configuration.standard_rate, false))
    }

    /// Withholding treatment. Intra-EU and domestic payments carry none;
    /// otherwise a treaty (either direction, most recent effective date
    /// first) or the configured defaults decide the rate.
    fn resolve_withholding(
        &self,
        freelancer_country: &str,
        counterparty_country: &str,
        certificate_on_file: bool,
        category: ServiceCategory,
        as_of: NaiveDate,
    ) -> Result<(Decimal, bool), AppError> {
        if freelancer_country == counterparty_country {
            return Ok((Decimal::ZERO, false));
        }
        if self.reference.is_eu(freelancer_country) && self.reference.is_eu(counterparty_country) {
            return Ok((Decimal::ZERO, false));
        }

        if let Some(treaty) =
            self.applicable_treaty(freelancer_country, counterparty_country, category, as_of)?
        {
            if treaty.requires_certificate && !certificate_on_file {
                debug!(
                    treaty = %treaty.code(),
                    "treaty requires a certificate that is not on file; using default rate"
                );
            } else {
                return Ok((treaty.withholding_rate, true));
            }
        }

        let rate = if certificate_on_file {
            self.reference.certificate_default_rate(category)
        } else {
            self.reference.statutory_default_rate()
        };
        Ok((rate, false))
    }

    /// Most recent matching treaty. Two equally-recent rows disagreeing on
    /// the rate make the direction ambiguous, which requires operator
    /// configuration rather than a silent pick.
    fn applicable_treaty(
        &self,
        freelancer_country: &str,
        counterparty_country: &str,
        category: ServiceCategory,
        as_of: NaiveDate,
    ) -> Result<Option<&TaxTreaty>, AppError> {
        let mut matches: Vec<&TaxTreaty> = self
            .reference
            .treaties()
            .iter()
            .filter(|t| t.matches(freelancer_country, counterparty_country, category, as_of))
            .collect();
        matches.sort_by_key(|t| std::cmp::Reverse(t.effective_from.unwrap_or(NaiveDate::MIN)));

        match matches.as_slice() {
            [] => Ok(None),
            [first, second, ..]
                if first.effective_from == second.effective_from
                    && first.withholding_rate != second.withholding_rate =>
            {
                Err(AppError::RuleResolution(anyhow::anyhow!(
                    "ambiguous treaties for {}-{} ({}): {} and {} are equally applicable",
                    freelancer_country,
                    counterparty_country,
                    category.as_str(),
                    first.code(),
                    second.code()
                )))
            }
            [first, ..] => Ok(Some(first)),
        }
    }
}
