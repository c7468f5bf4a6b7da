//! VAT configuration and the read-only tax reference data.

use crate::models::treaty::{ServiceCategory, TaxTreaty};
use engine_core::error::AppError;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-country VAT configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatConfiguration {
    pub country: String,
    pub standard_rate: Decimal,
    pub eu_member: bool,
}

impl VatConfiguration {
    pub fn new(country: &str, standard_rate: Decimal, eu_member: bool) -> Self {
        Self {
            country: country.to_uppercase(),
            standard_rate,
            eu_member,
        }
    }
}

/// Read-only reference data injected into the tax rule resolver: VAT
/// configurations, treaties, default withholding rates, and VAT-number
/// format patterns. Single source of truth; the resolver holds no other
/// lookup tables.
#[derive(Debug, Clone)]
pub struct TaxConfig {
    vat: HashMap<String, VatConfiguration>,
    treaties: Vec<TaxTreaty>,
    /// Default withholding per category when a certificate is on file and no
    /// treaty applies.
    certificate_default_rates: HashMap<ServiceCategory, Decimal>,
    /// Statutory default withholding without certificate or treaty.
    statutory_default_rate: Decimal,
    vat_number_patterns: HashMap<String, Regex>,
}

impl TaxConfig {
    pub fn new(
        vat_configurations: Vec<VatConfiguration>,
        treaties: Vec<TaxTreaty>,
    ) -> Self {
        Self {
            vat: vat_configurations
                .into_iter()
                .map(|c| (c.country.clone(), c))
                .collect(),
            treaties,
            certificate_default_rates: default_certificate_rates(),
            statutory_default_rate: Decimal::from(30),
            vat_number_patterns: default_vat_patterns(),
        }
    }

    /// Reference data covering the 27 EU member states with their standard
    /// VAT rates, and no treaties.
    pub fn builtin() -> Self {
        let vat = EU_STANDARD_RATES
            .iter()
            .map(|(code, tenths)| VatConfiguration::new(code, Decimal::new(*tenths, 1), true))
            .collect();
        Self::new(vat, Vec::new())
    }

    pub fn with_treaties(mut self, treaties: Vec<TaxTreaty>) -> Self {
        self.treaties = treaties;
        self
    }

    pub fn with_vat_configuration(mut self, configuration: VatConfiguration) -> Self {
        self.vat.insert(configuration.country.clone(), configuration);
        self
    }

    pub fn is_eu(&self, country: &str) -> bool {
        self.vat
            .get(&country.to_uppercase())
            .map(|c| c.eu_member)
            .unwrap_or(false)
    }

    pub fn vat_configuration(&self, country: &str) -> Option<&VatConfiguration> {
        self.vat.get(&country.to_uppercase())
    }

    pub fn treaties(&self) -> &[TaxTreaty] {
        &self.treaties
    }

    pub fn certificate_default_rate(&self, category: ServiceCategory) -> Decimal {
        self.certificate_default_rates
            .get(&category)
            .copied()
            .unwrap_or(self.statutory_default_rate)
    }

    pub fn statutory_default_rate(&self) -> Decimal {
        self.statutory_default_rate
    }

    /// Advisory format check for a VAT number. EU numbers must carry the
    /// country prefix (`EL` for Greece); countries with a known pattern are
    /// matched against it; anything else passes.
    pub fn check_vat_number_format(&self, country: &str, vat_number: &str) -> Result<(), AppError> {
        let country = country.to_uppercase();
        let normalized = vat_number.to_uppercase().replace([' ', '-', '.'], "");

        if self.is_eu(&country) {
            let prefix = if country == "GR" { "EL" } else { country.as_str() };
            if !normalized.starts_with(prefix) {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "VAT number for {} must start with {}",
                    country,
                    prefix
                )));
            }
        }
        if let Some(pattern) = self.vat_number_patterns.get(&country) {
            if !pattern.is_match(&normalized) {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "VAT number {} does not match the {} format",
                    normalized,
                    country
                )));
            }
        }
        Ok(())
    }
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

// Standard VAT rates per EU member state, in tenths of a percent.
const EU_STANDARD_RATES: &[(&str, i64)] = &[
    ("AT", 200),
    ("BE", 210),
    ("BG", 200),
    ("HR", 250),
    ("CY", 190),
    ("CZ", 210),
    ("DK", 250),
    ("EE", 220),
    ("FI", 240),
    ("FR", 200),
    ("DE", 190),
    ("GR", 240),
    ("HU", 270),
    ("IE", 230),
    ("IT", 220),
    ("LV", 210),
    ("LT", 210),
    ("LU", 170),
    ("MT", 180),
    ("NL", 210),
    ("PL", 230),
    ("PT", 230),
    ("RO", 190),
    ("SK", 200),
    ("SI", 220),
    ("ES", 210),
    ("SE", 250),
];

fn default_certificate_rates() -> HashMap<ServiceCategory, Decimal> {
    HashMap::from([
        (ServiceCategory::Professional, Decimal::from(15)),
        (ServiceCategory::Royalties, Decimal::from(10)),
        (ServiceCategory::Interest, Decimal::from(10)),
        (ServiceCategory::Dividends, Decimal::from(15)),
        (ServiceCategory::Rental, Decimal::from(20)),
    ])
}

fn default_vat_patterns() -> HashMap<String, Regex> {
    let patterns = [
        ("NL", r"^NL[0-9]{9}B[0-9]{2}$"),
        ("DE", r"^DE[0-9]{9}$"),
        ("FR", r"^FR[0-9A-Z]{2}[0-9]{9}$"),
        ("BE", r"^BE[01][0-9]{9}$"),
        ("ES", r"^ES[0-9A-Z][0-9]{7}[0-9A-Z]$"),
        ("IT", r"^IT[0-9]{11}$"),
        ("AT", r"^ATU[0-9]{8}$"),
        ("PL", r"^PL[0-9]{10}$"),
        ("IE", r"^IE[0-9]{7}[A-W][A-I]?$"),
        ("GR", r"^EL[0-9]{9}$"),
    ];
    patterns
        .iter()
        .filter_map(|(country, pattern)| {
            Regex::new(pattern)
                .ok()
                .map(|re| (country.to_string(), re))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_knows_eu_membership() {
        let config = TaxConfig::builtin();
        assert!(config.is_eu("DE"));
        assert!(config.is_eu("nl"));
        assert!(!config.is_eu("US"));
        assert!(!config.is_eu("IN"));
    }

    #[test]
    fn builtin_standard_rates() {
        let config = TaxConfig::builtin();
        assert_eq!(
            config.vat_configuration("DE").unwrap().standard_rate,
            Decimal::new(190, 1)
        );
        assert_eq!(
            config.vat_configuration("HU").unwrap().standard_rate,
            Decimal::new(270, 1)
        );
    }

    #[test]
    fn vat_number_prefix_enforced_for_eu() {
        let config = TaxConfig::builtin();
        assert!(config.check_vat_number_format("NL", "NL123456789B01").is_ok());
        assert!(config.check_vat_number_format("NL", "DE123456789").is_err());
        // Greece uses the EL prefix.
        assert!(config.check_vat_number_format("GR", "EL123456789").is_ok());
        assert!(config.check_vat_number_format("GR", "GR123456789").is_err());
    }

    #[test]
    fn vat_number_pattern_checked_when_known() {
        let config = TaxConfig::builtin();
        assert!(config.check_vat_number_format("DE", "DE123456789").is_ok());
        assert!(config.check_vat_number_format("DE", "DE12345").is_err());
        // Unknown country passes; the check is advisory.
        assert!(config.check_vat_number_format("SG", "S12345678Z").is_ok());
    }

    #[test]
    fn certificate_default_rates_by_category() {
        let config = TaxConfig::builtin();
        assert_eq!(
            config.certificate_default_rate(ServiceCategory::Professional),
            Decimal::from(15)
        );
        assert_eq!(
            config.certificate_default_rate(ServiceCategory::Rental),
            Decimal::from(20)
        );
        assert_eq!(config.statutory_default_rate(), Decimal::from(30));
    }
}
