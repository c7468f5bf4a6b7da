//! Cross-component workflow tests library.
//!
//! Provides a fully wired engine over in-memory collaborators so tests can
//! drive complete business flows: contract lifecycle, milestone tracking,
//! tax classification, payment approval, and accounting hand-off.

use async_trait::async_trait;
use chrono::NaiveDate;
use engine_core::config::Config;
use engine_core::error::AppError;
use freelancer_engine::collaborators::{
    AccountingSink, AuthorizationCheck, InMemoryRecordStore, RecordStore, VatLookup,
    VatRegistryValidator,
};
use freelancer_engine::models::{
    CreateFreelancer, Freelancer, FreelancerStatus, Payment, ServiceCategory, TaxConfig, TaxTreaty,
};
use freelancer_engine::services::{
    init_metrics, ContractService, CurrencyConverter, FreelancerService, PaymentService,
    TaxRuleResolver,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// One-time process setup shared by every workflow test.
pub fn init() {
    INIT.call_once(|| {
        engine_core::observability::init_tracing("workflow-tests", "info");
        init_metrics();
    });
}

/// The approver every workflow test uses.
pub const APPROVER: &str = "finance.lead";

/// Authorization stub: only [`APPROVER`] may approve.
pub struct SingleApprover;

#[async_trait]
impl AuthorizationCheck for SingleApprover {
    async fn can_approve(&self, user: &str, _payment: &Payment) -> Result<bool, AppError> {
        Ok(user == APPROVER)
    }
}

/// Accounting stub that records postings and hands out sequential ids.
#[derive(Default)]
pub struct LedgerStub {
    counter: AtomicUsize,
    pub invoices: Mutex<Vec<(Uuid, Decimal)>>,
    pub withholding_entries: Mutex<Vec<(Uuid, Decimal)>>,
}

#[async_trait]
impl AccountingSink for LedgerStub {
    async fn create_payable_invoice(&self, payment: &Payment) -> Result<String, AppError> {
        self.invoices
            .lock()
            .unwrap()
            .push((payment.payment_id, payment.net_payable));
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("PINV-{:05}", n))
    }

    async fn create_withholding_entry(&self, payment: &Payment) -> Result<String, AppError> {
        self.withholding_entries
            .lock()
            .unwrap()
            .push((payment.payment_id, payment.withholding_tax_amount));
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("WHT-{:05}", n))
    }
}

/// VAT registry stub that accepts everything.
pub struct AcceptingRegistry;

#[async_trait]
impl VatRegistryValidator for AcceptingRegistry {
    async fn validate(&self, _vat_number: &str, _country: &str) -> Result<VatLookup, AppError> {
        Ok(VatLookup {
            valid: true,
            name: Some("Registered Trader".to_string()),
        })
    }
}

/// The wired engine under test.
pub struct Engine {
    pub store: Arc<InMemoryRecordStore>,
    pub converter: Arc<CurrencyConverter>,
    pub ledger: Arc<LedgerStub>,
    pub freelancers: FreelancerService,
    pub contracts: ContractService,
    pub payments: PaymentService,
}

/// Wire every component over in-memory collaborators. The company side is
/// a Dutch organization settling in EUR.
pub fn bootstrap() -> Engine {
    init();

    let config = Arc::new(Config::default());
    let reference = Arc::new(TaxConfig::builtin().with_treaties(vec![
        TaxTreaty::try_new("NL", "IN", ServiceCategory::Professional, Decimal::TEN, true)
            .expect("NL-IN treaty"),
        TaxTreaty::try_new(
            "NL",
            "US",
            ServiceCategory::Professional,
            Decimal::from(15),
            true,
        )
        .expect("NL-US treaty"),
    ]));
    let store = Arc::new(InMemoryRecordStore::new());
    let converter = Arc::new(CurrencyConverter::new());
    let resolver = Arc::new(TaxRuleResolver::new(reference.clone()));
    let ledger = Arc::new(LedgerStub::default());

    let freelancers = FreelancerService::new(
        store.clone(),
        Arc::new(AcceptingRegistry),
        reference.clone(),
        config.clone(),
    );
    let contracts = ContractService::new(
        store.clone(),
        resolver.clone(),
        converter.clone(),
        reference,
        config.clone(),
    );
    let payments = PaymentService::new(
        store.clone(),
        resolver,
        converter.clone(),
        Arc::new(SingleApprover),
        ledger.clone(),
        config,
    );

    Engine {
        store,
        converter,
        ledger,
        freelancers,
        contracts,
        payments,
    }
}

impl Engine {
    /// Onboard a freelancer and flip them straight to active.
    pub async fn active_freelancer(
        &self,
        country: &str,
        currency: &str,
        vat_number: Option<&str>,
        certificate_on_file: bool,
    ) -> Freelancer {
        let mut freelancer = self
            .freelancers
            .create_freelancer(CreateFreelancer {
                full_name: format!("Contractor {}", country),
                email: None,
                residency_country: country.to_string(),
                tax_residency_country: None,
                vat_registered: vat_number.is_some(),
                vat_number: vat_number.map(|s| s.to_string()),
                currency: currency.to_string(),
                hourly_rate: Some(Decimal::from(90)),
                daily_rate: None,
                gdpr_consent: true,
                tax_certificate_on_file: certificate_on_file,
                metadata: None,
            })
            .await
            .expect("onboarding input is valid");
        freelancer.status = FreelancerStatus::Active;
        self.store
            .save_freelancer(&freelancer)
            .await
            .expect("activate freelancer")
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
