//! Freelancer onboarding, profile edits, and GDPR erasure.

use crate::collaborators::{with_timeout, RecordStore, VatRegistryValidator};
use crate::models::{CreateFreelancer, Freelancer, TaxConfig, UpdateFreelancer, VatVerification};
use engine_core::config::Config;
use engine_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Freelancer profile operations.
pub struct FreelancerService {
    store: Arc<dyn RecordStore>,
    vat_registry: Arc<dyn VatRegistryValidator>,
    reference: Arc<TaxConfig>,
    config: Arc<Config>,
}

impl FreelancerService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        vat_registry: Arc<dyn VatRegistryValidator>,
        reference: Arc<TaxConfig>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            vat_registry,
            reference,
            config,
        }
    }

    /// Onboard a freelancer. The VAT number, when present, must pass the
    /// per-country format check.
    #[instrument(skip(self, input), fields(residency = %input.residency_country))]
    pub async fn create_freelancer(&self, input: CreateFreelancer) -> Result<Freelancer, AppError> {
        let freelancer = Freelancer::try_new(input)?;
        if let Some(number) = freelancer.vat_number.as_deref() {
            self.reference
                .check_vat_number_format(freelancer.tax_country(), number)?;
        }
        let saved = self.store.save_freelancer(&freelancer).await?;
        info!(freelancer_id = %saved.freelancer_id, "freelancer onboarded");
        Ok(saved)
    }

    /// Apply a profile edit.
    #[instrument(skip(self, update), fields(freelancer_id = %id))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        update: UpdateFreelancer,
    ) -> Result<Freelancer, AppError> {
        let mut freelancer = self.load(id).await?;
        freelancer.apply_update(update)?;
        if let Some(number) = freelancer.vat_number.as_deref() {
            self.reference
                .check_vat_number_format(freelancer.tax_country(), number)?;
        }
        let saved = self.store.save_freelancer(&freelancer).await?;
        info!(freelancer_id = %saved.freelancer_id, "freelancer profile updated");
        Ok(saved)
    }

    /// Advisory VAT-registry check. A registry timeout degrades the result
    /// to `Unverified` instead of failing the caller.
    #[instrument(skip(self), fields(freelancer_id = %id))]
    pub async fn verify_vat_number(&self, id: Uuid) -> Result<Freelancer, AppError> {
        let mut freelancer = self.load(id).await?;
        let number = freelancer.vat_number.clone().ok_or_else(|| {
            AppError::Invalid(anyhow::anyhow!("freelancer has no VAT number on file"))
        })?;

        let verification = match with_timeout(
            self.config.external_call_timeout(),
            "vat_registry",
            self.vat_registry
                .validate(&number, freelancer.tax_country()),
        )
        .await
        {
            Ok(lookup) if lookup.valid => VatVerification::Valid,
            Ok(_) => VatVerification::Invalid,
            Err(AppError::ExternalServiceTimeout(op)) => {
                warn!(operation = %op, "VAT registry unavailable; leaving number unverified");
                VatVerification::Unverified
            }
            Err(e) => return Err(e),
        };

        freelancer.vat_verification = verification;
        let saved = self.store.save_freelancer(&freelancer).await?;
        info!(
            freelancer_id = %saved.freelancer_id,
            verification = saved.vat_verification.as_str(),
            "VAT number verification recorded"
        );
        Ok(saved)
    }

    /// GDPR erasure. Anonymizes personal fields; the record and its
    /// financial references survive for the audit trail.
    #[instrument(skip(self), fields(freelancer_id = %id))]
    pub async fn erase_personal_data(&self, id: Uuid) -> Result<Freelancer, AppError> {
        let mut freelancer = self.load(id).await?;
        freelancer.anonymize();
        let saved = self.store.save_freelancer(&freelancer).await?;
        info!(freelancer_id = %saved.freelancer_id, "personal data anonymized");
        Ok(saved)
    }

    async fn load(&self, id: Uuid) -> Result<Freelancer, AppError> {
        self.store
            .get_freelancer(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("freelancer {}", id)))
    }
}
