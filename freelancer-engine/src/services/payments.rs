//! Payment approval workflow: submit, approve, reject, mark paid.

use crate::collaborators::{with_timeout, AccountingSink, AuthorizationCheck, RecordStore};
use crate::models::{CreatePayment, Payment, PaymentStatus};
use crate::services::computation;
use crate::services::currency::CurrencyConverter;
use crate::services::metrics::{
    ENGINE_OP_DURATION, ERRORS_TOTAL, PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL,
};
use crate::services::tax_rules::TaxRuleResolver;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use engine_core::config::Config;
use engine_core::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Payment lifecycle operations. Transitions serialize per payment id, and
/// every transition re-runs the computation engine before advancing.
pub struct PaymentService {
    store: Arc<dyn RecordStore>,
    resolver: Arc<TaxRuleResolver>,
    converter: Arc<CurrencyConverter>,
    authorization: Arc<dyn AuthorizationCheck>,
    accounting: Arc<dyn AccountingSink>,
    config: Arc<Config>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: Arc<TaxRuleResolver>,
        converter: Arc<CurrencyConverter>,
        authorization: Arc<dyn AuthorizationCheck>,
        accounting: Arc<dyn AccountingSink>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            resolver,
            converter,
            authorization,
            accounting,
            config,
            locks: DashMap::new(),
        }
    }

    /// Create a standalone draft payment: classify it, resolve the exchange
    /// rate, and persist the computed figures.
    #[instrument(skip(self, input), fields(freelancer_id = %input.freelancer_id))]
    pub async fn create_payment(&self, input: CreatePayment) -> Result<Payment, AppError> {
        let timer = ENGINE_OP_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let freelancer = self
            .store
            .get_freelancer(input.freelancer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("freelancer {}", input.freelancer_id))
            })?;
        if !freelancer.can_receive_payments() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "freelancer status {} does not allow payments",
                freelancer.status.as_str()
            )));
        }

        let mut payment = Payment::try_new(&input)?;
        let classification = self.resolver.resolve(
            &freelancer,
            &self.config.company_country,
            input.transaction_is_b2b,
            input.service_category,
            input.posting_date,
        )?;
        payment.vat_rate = classification.vat_rate;
        payment.apply_reverse_charge = classification.reverse_charge;
        payment.withholding_rate = input
            .manual_withholding_rate
            .unwrap_or(classification.withholding_rate);
        payment.treaty_applied =
            classification.treaty_applied && input.manual_withholding_rate.is_none();
        payment.exchange_rate = self.converter.rate(
            &payment.currency,
            &self.config.company_currency,
            payment.posting_date,
        )?;
        computation::recompute(&mut payment);

        let saved = self.store.save_payment(&payment).await?;
        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["draft"]).inc();
        info!(payment_id = %saved.payment_id, net_payable = %saved.net_payable, "draft payment created");
        Ok(saved)
    }

    /// Draft -> Pending Approval. Requires payable content; recomputes and
    /// persists corrected figures so the approver sees fresh numbers.
    #[instrument(skip(self), fields(payment_id = %id))]
    pub async fn submit_payment(&self, id: Uuid) -> Result<Payment, AppError> {
        let _guard = self.lock(id).await;
        let mut payment = self.load(id).await?;
        self.ensure_status(&payment, PaymentStatus::Draft)?;
        if !payment.has_payable_content() {
            ERRORS_TOTAL.with_label_values(&["empty_payment"]).inc();
            return Err(AppError::EmptyPayment);
        }

        let notices = computation::recompute(&mut payment);
        for notice in &notices {
            warn!(payment_id = %id, correction = %notice, "stored amounts corrected on submit");
        }
        if payment.net_payable < Decimal::ZERO {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "net payable amount cannot be negative"
            )));
        }

        payment.status = PaymentStatus::PendingApproval;
        let saved = self.store.save_payment(&payment).await?;
        PAYMENTS_TOTAL.with_label_values(&["pending_approval"]).inc();
        info!(payment_id = %saved.payment_id, "payment submitted for approval");
        Ok(saved)
    }

    /// Pending Approval -> Approved, gated by the external authorization
    /// check. Refuses to advance when recomputation moves any figure beyond
    /// the rounding tolerance: the operator would be approving stale numbers.
    #[instrument(skip(self), fields(payment_id = %id, user = user))]
    pub async fn approve_payment(&self, id: Uuid, user: &str) -> Result<Payment, AppError> {
        let _guard = self.lock(id).await;
        let mut payment = self.load(id).await?;
        self.ensure_status(&payment, PaymentStatus::PendingApproval)?;

        let allowed = with_timeout(
            self.config.external_call_timeout(),
            "authorization_check",
            self.authorization.can_approve(user, &payment),
        )
        .await?;
        if !allowed {
            ERRORS_TOTAL.with_label_values(&["forbidden"]).inc();
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "user {} cannot approve payment {}",
                user,
                id
            )));
        }

        self.refuse_stale_amounts(&payment)?;

        payment.status = PaymentStatus::Approved;
        payment.approved_by = Some(user.to_string());
        payment.approved_utc = Some(Utc::now());
        let saved = self.store.save_payment(&payment).await?;
        PAYMENTS_TOTAL.with_label_values(&["approved"]).inc();
        info!(payment_id = %saved.payment_id, approved_by = user, "payment approved");
        Ok(saved)
    }

    /// Pending Approval -> Rejected. Terminal; a new payment must be created
    /// instead, which also releases any milestones this one held.
    #[instrument(skip(self), fields(payment_id = %id))]
    pub async fn reject_payment(&self, id: Uuid, reason: &str) -> Result<Payment, AppError> {
        let _guard = self.lock(id).await;
        let mut payment = self.load(id).await?;
        self.ensure_status(&payment, PaymentStatus::PendingApproval)?;
        if reason.trim().is_empty() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "rejection reason is required"
            )));
        }

        payment.status = PaymentStatus::Rejected;
        payment.rejection_reason = Some(reason.to_string());
        let saved = self.store.save_payment(&payment).await?;
        PAYMENTS_TOTAL.with_label_values(&["rejected"]).inc();
        info!(payment_id = %saved.payment_id, reason = reason, "payment rejected");
        Ok(saved)
    }

    /// Approved -> Paid. Verifies the amounts one last time, then posts the
    /// payable invoice and, when withholding was deducted, the remittance
    /// entry to the accounting sink.
    #[instrument(skip(self), fields(payment_id = %id))]
    pub async fn mark_as_paid(
        &self,
        id: Uuid,
        payment_date: NaiveDate,
        payment_reference: &str,
    ) -> Result<Payment, AppError> {
        let timer = ENGINE_OP_DURATION
            .with_label_values(&["mark_as_paid"])
            .start_timer();
        let _guard = self.lock(id).await;
        let mut payment = self.load(id).await?;
        self.ensure_status(&payment, PaymentStatus::Approved)?;
        self.refuse_stale_amounts(&payment)?;

        let timeout = self.config.external_call_timeout();
        let invoice_id = with_timeout(
            timeout,
            "create_payable_invoice",
            self.accounting.create_payable_invoice(&payment),
        )
        .await?;
        payment.invoice_id = Some(invoice_id);

        if payment.withholding_tax_amount > Decimal::ZERO {
            let entry_id = with_timeout(
                timeout,
                "create_withholding_entry",
                self.accounting.create_withholding_entry(&payment),
            )
            .await?;
            payment.withholding_entry_id = Some(entry_id);
        }

        payment.status = PaymentStatus::Paid;
        payment.payment_date = Some(payment_date);
        payment.payment_reference = Some(payment_reference.to_string());
        let saved = self.store.save_payment(&payment).await?;

        // Close out the milestones this payment settles.
        if let Some(contract_id) = saved.contract_id {
            if !saved.milestone_ids.is_empty() {
                let mut contract = self
                    .store
                    .get_contract(contract_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("contract {}", contract_id))
                    })?;
                contract.mark_milestones_paid(&saved.milestone_ids);
                self.store.save_contract(&contract).await?;
            }
        }

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["paid"]).inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[saved.currency.as_str()])
            .inc_by(saved.net_payable.to_f64().unwrap_or(0.0));
        info!(
            payment_id = %saved.payment_id,
            net_payable = %saved.net_payable,
            reference = payment_reference,
            "payment settled"
        );
        Ok(saved)
    }

    /// Recompute on a scratch copy and refuse the transition if any figure
    /// drifted beyond the rounding tolerance.
    fn refuse_stale_amounts(&self, payment: &Payment) -> Result<(), AppError> {
        let mut fresh = payment.clone();
        let notices = computation::recompute(&mut fresh);
        if notices.is_empty() {
            return Ok(());
        }
        ERRORS_TOTAL
            .with_label_values(&["computation_mismatch"])
            .inc();
        warn!(
            payment_id = %payment.payment_id,
            discrepancies = notices.len(),
            "recomputation changed amounts; refusing transition"
        );
        Err(AppError::ComputationMismatch(notices.join("; ")))
    }

    fn ensure_status(&self, payment: &Payment, expected: PaymentStatus) -> Result<(), AppError> {
        if payment.status != expected {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "payment is {}, expected {}",
                payment.status.as_str(),
                expected.as_str()
            )));
        }
        Ok(())
    }

    async fn lock(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let cell = self.locks.entry(id).or_default().value().clone();
        cell.lock_owned().await
    }

    async fn load(&self, id: Uuid) -> Result<Payment, AppError> {
        self.store
            .get_payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment {}", id)))
    }
}
