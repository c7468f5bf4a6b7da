//! Freelancer model.

use chrono::{DateTime, Utc};
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Freelancer engagement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreelancerStatus {
    Onboarding,
    Active,
    Inactive,
    Offboarding,
    Blacklisted,
}

impl FreelancerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreelancerStatus::Onboarding => "onboarding",
            FreelancerStatus::Active => "active",
            FreelancerStatus::Inactive => "inactive",
            FreelancerStatus::Offboarding => "offboarding",
            FreelancerStatus::Blacklisted => "blacklisted",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "onboarding" => FreelancerStatus::Onboarding,
            "inactive" => FreelancerStatus::Inactive,
            "offboarding" => FreelancerStatus::Offboarding,
            "blacklisted" => FreelancerStatus::Blacklisted,
            _ => FreelancerStatus::Active,
        }
    }
}

/// Outcome of the advisory VAT-registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatVerification {
    Unverified,
    Valid,
    Invalid,
}

impl VatVerification {
    pub fn as_str(&self) -> &'static str {
        match self {
            VatVerification::Unverified => "unverified",
            VatVerification::Valid => "valid",
            VatVerification::Invalid => "invalid",
        }
    }
}

/// Independent contractor record.
///
/// Never hard-deleted: GDPR erasure anonymizes the personal fields and keeps
/// the record so contracts and payments retain their audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Freelancer {
    pub freelancer_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub residency_country: String,
    /// Tax residency when it differs from physical residency.
    pub tax_residency_country: Option<String>,
    pub status: FreelancerStatus,
    pub vat_registered: bool,
    pub vat_number: Option<String>,
    pub vat_verification: VatVerification,
    pub currency: String,
    pub hourly_rate: Option<Decimal>,
    pub daily_rate: Option<Decimal>,
    pub gdpr_consent: bool,
    pub gdpr_consent_utc: Option<DateTime<Utc>>,
    pub tax_certificate_on_file: bool,
    pub anonymized: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
}

impl Freelancer {
    /// Country that tax rules evaluate against.
    pub fn tax_country(&self) -> &str {
        self.tax_residency_country
            .as_deref()
            .unwrap_or(&self.residency_country)
    }

    /// Blacklisted and offboarding freelancers cannot receive new payments.
    pub fn can_receive_payments(&self) -> bool {
        !matches!(
            self.status,
            FreelancerStatus::Blacklisted | FreelancerStatus::Offboarding
        )
    }

    /// GDPR erasure: blank personal fields, keep the record and its
    /// financial linkage intact.
    pub fn anonymize(&mut self) {
        self.full_name = format!("erased-{}", self.freelancer_id);
        self.email = None;
        self.vat_registered = false;
        self.vat_number = None;
        self.vat_verification = VatVerification::Unverified;
        self.gdpr_consent = false;
        self.gdpr_consent_utc = None;
        self.anonymized = true;
        self.status = FreelancerStatus::Inactive;
    }
}

/// Input for onboarding a freelancer.
#[derive(Debug, Clone, Validate)]
pub struct CreateFreelancer {
    #[validate(length(min = 1))]
    pub full_name: String,
    pub email: Option<String>,
    #[validate(length(equal = 2))]
    pub residency_country: String,
    pub tax_residency_country: Option<String>,
    pub vat_registered: bool,
    pub vat_number: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub hourly_rate: Option<Decimal>,
    pub daily_rate: Option<Decimal>,
    pub gdpr_consent: bool,
    pub tax_certificate_on_file: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Input for a profile edit. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateFreelancer {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub tax_residency_country: Option<String>,
    pub status: Option<FreelancerStatus>,
    pub vat_registered: Option<bool>,
    pub vat_number: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub daily_rate: Option<Decimal>,
    pub tax_certificate_on_file: Option<bool>,
}

impl Freelancer {
    /// Build a validated freelancer record from onboarding input.
    pub fn try_new(input: CreateFreelancer) -> Result<Self, AppError> {
        input.validate()?;
        validate_vat_registration(input.vat_registered, input.vat_number.as_deref())?;

        let now = Utc::now();
        Ok(Self {
            freelancer_id: Uuid::new_v4(),
            full_name: input.full_name,
            email: input.email,
            residency_country: input.residency_country.to_uppercase(),
            tax_residency_country: input.tax_residency_country.map(|c| c.to_uppercase()),
            status: FreelancerStatus::Onboarding,
            vat_registered: input.vat_registered,
            vat_number: input.vat_number.map(normalize_vat_number),
            vat_verification: VatVerification::Unverified,
            currency: input.currency.to_uppercase(),
            hourly_rate: input.hourly_rate,
            daily_rate: input.daily_rate,
            gdpr_consent: input.gdpr_consent,
            gdpr_consent_utc: input.gdpr_consent.then_some(now),
            tax_certificate_on_file: input.tax_certificate_on_file,
            anonymized: false,
            metadata: input.metadata,
            created_utc: now,
            updated_utc: now,
            version: 0,
        })
    }

    /// Apply a profile edit, re-checking the VAT invariant.
    pub fn apply_update(&mut self, update: UpdateFreelancer) -> Result<(), AppError> {
        if let Some(name) = update.full_name {
            self.full_name = name;
        }
        if let Some(email) = update.email {
            self.email = Some(email);
        }
        if let Some(country) = update.tax_residency_country {
            self.tax_residency_country = Some(country.to_uppercase());
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(registered) = update.vat_registered {
            self.vat_registered = registered;
        }
        if let Some(number) = update.vat_number {
            self.vat_number = Some(normalize_vat_number(number));
            self.vat_verification = VatVerification::Unverified;
        }
        if let Some(rate) = update.hourly_rate {
            self.hourly_rate = Some(rate);
        }
        if let Some(rate) = update.daily_rate {
            self.daily_rate = Some(rate);
        }
        if let Some(flag) = update.tax_certificate_on_file {
            self.tax_certificate_on_file = flag;
        }
        if !self.vat_registered {
            self.vat_number = None;
        }
        validate_vat_registration(self.vat_registered, self.vat_number.as_deref())
    }
}

/// `vat_number` is required iff `vat_registered`.
fn validate_vat_registration(registered: bool, number: Option<&str>) -> Result<(), AppError> {
    match (registered, number) {
        (true, None) => Err(AppError::Invalid(anyhow::anyhow!(
            "VAT number is required for VAT-registered freelancers"
        ))),
        (true, Some(n)) if n.trim().is_empty() => Err(AppError::Invalid(anyhow::anyhow!(
            "VAT number is required for VAT-registered freelancers"
        ))),
        (false, Some(_)) => Err(AppError::Invalid(anyhow::anyhow!(
            "VAT number given but freelancer is not VAT-registered"
        ))),
        _ => Ok(()),
    }
}

fn normalize_vat_number(raw: String) -> String {
    raw.to_uppercase().replace([' ', '-', '.'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateFreelancer {
        CreateFreelancer {
            full_name: "Anna Visser".to_string(),
            email: Some("anna@example.com".to_string()),
            residency_country: "NL".to_string(),
            tax_residency_country: None,
            vat_registered: true,
            vat_number: Some("nl 123456789 b01".to_string()),
            currency: "EUR".to_string(),
            hourly_rate: Some(Decimal::new(9500, 2)),
            daily_rate: None,
            gdpr_consent: true,
            tax_certificate_on_file: false,
            metadata: None,
        }
    }

    #[test]
    fn vat_number_required_when_registered() {
        let mut missing = input();
        missing.vat_number = None;
        let err = Freelancer::try_new(missing).unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[test]
    fn vat_number_forbidden_when_not_registered() {
        let mut unregistered = input();
        unregistered.vat_registered = false;
        let err = Freelancer::try_new(unregistered).unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[test]
    fn vat_number_is_normalized() {
        let freelancer = Freelancer::try_new(input()).unwrap();
        assert_eq!(freelancer.vat_number.as_deref(), Some("NL123456789B01"));
    }

    #[test]
    fn anonymize_keeps_identity_and_audit_linkage() {
        let mut freelancer = Freelancer::try_new(input()).unwrap();
        let id = freelancer.freelancer_id;
        freelancer.anonymize();

        assert!(freelancer.anonymized);
        assert_eq!(freelancer.freelancer_id, id);
        assert!(freelancer.vat_number.is_none());
        assert!(!freelancer.gdpr_consent);
        assert_ne!(freelancer.full_name, "Anna Visser");
    }

    #[test]
    fn blacklisted_cannot_receive_payments() {
        let mut freelancer = Freelancer::try_new(input()).unwrap();
        freelancer.status = FreelancerStatus::Blacklisted;
        assert!(!freelancer.can_receive_payments());
        freelancer.status = FreelancerStatus::Active;
        assert!(freelancer.can_receive_payments());
    }

    #[test]
    fn tax_country_prefers_tax_residency() {
        let mut freelancer = Freelancer::try_new(input()).unwrap();
        assert_eq!(freelancer.tax_country(), "NL");
        freelancer.tax_residency_country = Some("DE".to_string());
        assert_eq!(freelancer.tax_country(), "DE");
    }
}
