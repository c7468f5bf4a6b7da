//! Contract lifecycle service: activation, expiry, termination, renewal,
//! milestone tracking, and payment creation from milestones.

use crate::collaborators::RecordStore;
use crate::models::{
    Contract, ContractStatus, CreateContract, Freelancer, Milestone, MilestoneStatus, Payment,
    PaymentItem, PaymentStatus, ServiceCategory, TaxConfig,
};
use crate::services::computation;
use crate::services::currency::CurrencyConverter;
use crate::services::metrics::{CONTRACTS_TOTAL, ENGINE_OP_DURATION};
use crate::services::tax_rules::TaxRuleResolver;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use engine_core::config::Config;
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Summary statistics for one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSummary {
    pub total_value: Decimal,
    pub paid_amount: Decimal,
    pub remaining: Decimal,
    pub completed_milestones: usize,
    pub total_milestones: usize,
}

/// Contract lifecycle operations. Milestone selection serializes per
/// contract id so two concurrent payment creations cannot double-book the
/// same milestones.
pub struct ContractService {
    store: Arc<dyn RecordStore>,
    resolver: Arc<TaxRuleResolver>,
    converter: Arc<CurrencyConverter>,
    reference: Arc<TaxConfig>,
    config: Arc<Config>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ContractService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: Arc<TaxRuleResolver>,
        converter: Arc<CurrencyConverter>,
        reference: Arc<TaxConfig>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            resolver,
            converter,
            reference,
            config,
            locks: DashMap::new(),
        }
    }

    /// Create a draft contract. Soft-invariant violations are recorded as
    /// compliance notes on the saved record, never rejected.
    #[instrument(skip(self, input), fields(freelancer_id = %input.freelancer_id))]
    pub async fn create_contract(&self, input: CreateContract) -> Result<Contract, AppError> {
        let freelancer = self.load_freelancer(input.freelancer_id).await?;

        let derived_reverse_charge = self.derive_reverse_charge(&freelancer);
        let mut contract = Contract::try_new(input, derived_reverse_charge)?;

        let mut notes = contract.reconciliation_warnings();
        for note in &notes {
            warn!(contract_id = %contract.contract_id, note = %note.as_str(), "soft invariant violated");
        }
        if let Some(end) = contract.end_date {
            // Long engagements can create a permanent establishment; flag
            // them for review (183-day convention).
            if (end - contract.start_date).num_days() > 183 {
                notes.push(
                    "duration exceeds 183 days; review permanent-establishment exposure"
                        .to_string(),
                );
            }
        }
        if !notes.is_empty() {
            contract.compliance_notes = Some(notes.join("\n"));
        }

        let saved = self.store.save_contract(&contract).await?;
        CONTRACTS_TOTAL.with_label_values(&["draft"]).inc();
        info!(contract_id = %saved.contract_id, "draft contract created");
        Ok(saved)
    }

    /// Draft -> Active.
    #[instrument(skip(self), fields(contract_id = %id))]
    pub async fn activate_contract(&self, id: Uuid) -> Result<Contract, AppError> {
        let _guard = self.lock(id).await;
        let mut contract = self.load_contract(id).await?;
        contract.activate()?;
        let saved = self.store.save_contract(&contract).await?;
        CONTRACTS_TOTAL.with_label_values(&["active"]).inc();
        info!(contract_id = %saved.contract_id, "contract activated");
        Ok(saved)
    }

    /// Active -> Expired once the end date has passed. Invoked by the
    /// external scheduler; idempotent.
    #[instrument(skip(self), fields(contract_id = %id))]
    pub async fn expire_contract(&self, id: Uuid, as_of: NaiveDate) -> Result<Contract, AppError> {
        let _guard = self.lock(id).await;
        let mut contract = self.load_contract(id).await?;
        if contract.expire(as_of)? {
            let saved = self.store.save_contract(&contract).await?;
            CONTRACTS_TOTAL.with_label_values(&["expired"]).inc();
            info!(contract_id = %saved.contract_id, %as_of, "contract expired");
            return Ok(saved);
        }
        Ok(contract)
    }

    /// Active -> Terminated.
    #[instrument(skip(self), fields(contract_id = %id))]
    pub async fn terminate_contract(
        &self,
        id: Uuid,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Contract, AppError> {
        let _guard = self.lock(id).await;
        let mut contract = self.load_contract(id).await?;
        contract.terminate(date, reason, Utc::now().date_naive())?;
        let saved = self.store.save_contract(&contract).await?;
        CONTRACTS_TOTAL.with_label_values(&["terminated"]).inc();
        info!(contract_id = %saved.contract_id, %date, reason = reason, "contract terminated");
        Ok(saved)
    }

    /// Active -> Renewed, creating the draft successor. The successor
    /// inherits the freelancer, currency, payment frequency, and reverse
    /// charge treatment; milestones start fresh.
    #[instrument(skip(self), fields(contract_id = %id))]
    pub async fn renew_contract(
        &self,
        id: Uuid,
        new_end_date: NaiveDate,
        new_value: Option<Decimal>,
    ) -> Result<(Contract, Contract), AppError> {
        let _guard = self.lock(id).await;
        let mut predecessor = self.load_contract(id).await?;
        if predecessor.status != ContractStatus::Active {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "only active contracts can be renewed (status: {})",
                predecessor.status.as_str()
            )));
        }

        let start_date = predecessor
            .end_date
            .and_then(|d| d.succ_opt())
            .unwrap_or_else(|| Utc::now().date_naive());
        if new_end_date < start_date {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "renewal end date {} is before the successor start date {}",
                new_end_date,
                start_date
            )));
        }

        let now = Utc::now();
        let successor = Contract {
            contract_id: Uuid::new_v4(),
            freelancer_id: predecessor.freelancer_id,
            contract_type: predecessor.contract_type,
            status: ContractStatus::Draft,
            start_date,
            end_date: Some(new_end_date),
            total_value: new_value.unwrap_or(predecessor.total_value),
            currency: predecessor.currency.clone(),
            payment_frequency: predecessor.payment_frequency,
            reverse_charge: predecessor.reverse_charge,
            milestones: Vec::new(),
            termination_reason: None,
            termination_date: None,
            renewed_from: Some(predecessor.contract_id),
            renewed_to: None,
            compliance_notes: None,
            metadata: predecessor.metadata.clone(),
            created_utc: now,
            updated_utc: now,
            version: 0,
        };

        predecessor.mark_renewed(successor.contract_id)?;
        let successor = self.store.save_contract(&successor).await?;
        let predecessor = self.store.save_contract(&predecessor).await?;
        CONTRACTS_TOTAL.with_label_values(&["renewed"]).inc();
        info!(
            contract_id = %predecessor.contract_id,
            successor_id = %successor.contract_id,
            "contract renewed"
        );
        Ok((predecessor, successor))
    }

    /// Advance a milestone one step through its lifecycle.
    #[instrument(skip(self), fields(contract_id = %contract_id, milestone_id = %milestone_id))]
    pub async fn advance_milestone(
        &self,
        contract_id: Uuid,
        milestone_id: Uuid,
        target: MilestoneStatus,
    ) -> Result<Contract, AppError> {
        let _guard = self.lock(contract_id).await;
        let mut contract = self.load_contract(contract_id).await?;
        let today = Utc::now().date_naive();
        let milestone = contract.advance_milestone(milestone_id, target, today)?;
        info!(
            milestone = %milestone.name,
            status = milestone.status.as_str(),
            "milestone advanced"
        );
        self.store.save_contract(&contract).await
    }

    /// Build a draft payment from eligible contract milestones.
    ///
    /// Eligible means Completed or Approved and not already referenced by a
    /// non-rejected payment. Selection is serialized per contract.
    #[instrument(skip(self), fields(contract_id = %contract_id, milestones = milestone_ids.len()))]
    pub async fn create_payment_from_contract(
        &self,
        contract_id: Uuid,
        milestone_ids: &[Uuid],
        posting_date: NaiveDate,
    ) -> Result<Payment, AppError> {
        if milestone_ids.is_empty() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "at least one milestone must be selected"
            )));
        }
        let timer = ENGINE_OP_DURATION
            .with_label_values(&["create_payment_from_contract"])
            .start_timer();
        let _guard = self.lock(contract_id).await;

        let contract = self.load_contract(contract_id).await?;
        if contract.status == ContractStatus::Draft || contract.status == ContractStatus::Renewed {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "payments cannot be created from a {} contract",
                contract.status.as_str()
            )));
        }
        let freelancer = self.load_freelancer(contract.freelancer_id).await?;
        if !freelancer.can_receive_payments() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "freelancer status {} does not allow payments",
                freelancer.status.as_str()
            )));
        }

        let selected = self
            .eligible_milestones(&contract, milestone_ids)
            .await?;

        let classification = self.resolver.resolve(
            &freelancer,
            &self.config.company_country,
            true,
            ServiceCategory::Professional,
            posting_date,
        )?;

        let exchange_rate = self.converter.rate(
            &contract.currency,
            &self.config.company_currency,
            posting_date,
        )?;

        let now = Utc::now();
        let mut payment = Payment {
            payment_id: Uuid::new_v4(),
            freelancer_id: contract.freelancer_id,
            contract_id: Some(contract.contract_id),
            milestone_ids: selected.iter().map(|m| m.milestone_id).collect(),
            posting_date,
            status: PaymentStatus::Draft,
            items: selected
                .iter()
                .map(|m| PaymentItem::new(m.name.clone(), Decimal::ONE, m.amount))
                .collect(),
            expenses: Vec::new(),
            base_amount: Decimal::ZERO,
            total_expenses: Decimal::ZERO,
            service_category: ServiceCategory::Professional,
            vat_rate: classification.vat_rate,
            vat_amount: Decimal::ZERO,
            // The contract flag may force reverse charge on; the legal
            // classification can never be forced off.
            apply_reverse_charge: classification.reverse_charge || contract.reverse_charge,
            withholding_rate: classification.withholding_rate,
            withholding_tax_amount: Decimal::ZERO,
            treaty_applied: classification.treaty_applied,
            net_payable: Decimal::ZERO,
            currency: contract.currency.clone(),
            exchange_rate,
            net_amount_company_currency: Decimal::ZERO,
            approved_by: None,
            approved_utc: None,
            rejection_reason: None,
            payment_date: None,
            payment_reference: None,
            invoice_id: None,
            withholding_entry_id: None,
            metadata: None,
            created_utc: now,
            updated_utc: now,
            version: 0,
        };
        computation::recompute(&mut payment);

        let saved = self.store.save_payment(&payment).await?;
        timer.observe_duration();
        info!(
            payment_id = %saved.payment_id,
            net_payable = %saved.net_payable,
            "draft payment created from contract milestones"
        );
        Ok(saved)
    }

    /// Summary statistics: paid amount counts settled payments only.
    #[instrument(skip(self), fields(contract_id = %id))]
    pub async fn get_contract_summary(&self, id: Uuid) -> Result<ContractSummary, AppError> {
        let contract = self.load_contract(id).await?;
        let payments = self.store.list_payments_for_contract(id).await?;

        let paid_amount: Decimal = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Paid)
            .map(|p| p.net_payable)
            .sum();
        let completed = contract
            .milestones
            .iter()
            .filter(|m| {
                matches!(
                    m.status,
                    MilestoneStatus::Completed | MilestoneStatus::Approved | MilestoneStatus::Paid
                )
            })
            .count();

        Ok(ContractSummary {
            total_value: contract.total_value,
            paid_amount,
            remaining: contract.total_value - paid_amount,
            completed_milestones: completed,
            total_milestones: contract.milestones.len(),
        })
    }

    /// Resolve the selected milestones, enforcing payability and the
    /// paid-once rule.
    async fn eligible_milestones(
        &self,
        contract: &Contract,
        milestone_ids: &[Uuid],
    ) -> Result<Vec<Milestone>, AppError> {
        let existing = self
            .store
            .list_payments_for_contract(contract.contract_id)
            .await?;

        let mut selected = Vec::with_capacity(milestone_ids.len());
        for id in milestone_ids {
            let milestone = contract
                .milestones
                .iter()
                .find(|m| m.milestone_id == *id)
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("milestone {}", id)))?;
            if !milestone.status.is_payable() {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "milestone '{}' is {} and not eligible for payment",
                    milestone.name,
                    milestone.status.as_str()
                )));
            }
            if existing.iter().any(|p| p.holds_milestone(*id)) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "milestone '{}' is already covered by another payment",
                    milestone.name
                )));
            }
            selected.push(milestone.clone());
        }
        Ok(selected)
    }

    fn derive_reverse_charge(&self, freelancer: &Freelancer) -> bool {
        freelancer.vat_registered
            && self.reference.is_eu(freelancer.tax_country())
            && self.reference.is_eu(&self.config.company_country)
            && freelancer.tax_country() != self.config.company_country
    }

    async fn lock(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let cell = self.locks.entry(id).or_default().value().clone();
        cell.lock_owned().await
    }

    async fn load_contract(&self, id: Uuid) -> Result<Contract, AppError> {
        self.store
            .get_contract(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("contract {}", id)))
    }

    async fn load_freelancer(&self, id: Uuid) -> Result<Freelancer, AppError> {
        self.store
            .get_freelancer(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("freelancer {}", id)))
    }
}
