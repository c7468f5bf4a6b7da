//! Shared test harness: engine services wired to in-memory collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use engine_core::config::Config;
use engine_core::error::AppError;
use freelancer_engine::collaborators::{
    AccountingSink, AuthorizationCheck, InMemoryRecordStore, RateProvider, RecordStore, VatLookup,
    VatRegistryValidator,
};
use freelancer_engine::models::{
    CreateFreelancer, Freelancer, FreelancerStatus, ServiceCategory, TaxConfig, TaxTreaty,
};
use freelancer_engine::services::{
    ContractService, CurrencyConverter, FreelancerService, PaymentService, TaxRuleResolver,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Authorization fake: a fixed list of approver user ids.
pub struct AllowListAuthorization {
    allowed: Vec<String>,
}

impl AllowListAuthorization {
    pub fn new(allowed: &[&str]) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AuthorizationCheck for AllowListAuthorization {
    async fn can_approve(
        &self,
        user: &str,
        _payment: &freelancer_engine::models::Payment,
    ) -> Result<bool, AppError> {
        Ok(self.allowed.iter().any(|u| u == user))
    }
}

/// Accounting fake that records every posting.
#[derive(Default)]
pub struct RecordingAccountingSink {
    counter: AtomicUsize,
    pub invoices: Mutex<Vec<Uuid>>,
    pub withholding_entries: Mutex<Vec<Uuid>>,
}

impl RecordingAccountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }

    pub fn withholding_count(&self) -> usize {
        self.withholding_entries.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountingSink for RecordingAccountingSink {
    async fn create_payable_invoice(
        &self,
        payment: &freelancer_engine::models::Payment,
    ) -> Result<String, AppError> {
        self.invoices.lock().unwrap().push(payment.payment_id);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("PINV-{:05}", n))
    }

    async fn create_withholding_entry(
        &self,
        payment: &freelancer_engine::models::Payment,
    ) -> Result<String, AppError> {
        self.withholding_entries
            .lock()
            .unwrap()
            .push(payment.payment_id);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("WHT-{:05}", n))
    }
}

/// VAT registry fake returning a fixed verdict.
pub struct StaticVatRegistry {
    pub valid: bool,
}

#[async_trait]
impl VatRegistryValidator for StaticVatRegistry {
    async fn validate(&self, _vat_number: &str, _country: &str) -> Result<VatLookup, AppError> {
        Ok(VatLookup {
            valid: self.valid,
            name: self.valid.then(|| "Registered Trader".to_string()),
        })
    }
}

/// VAT registry fake that never answers within any sane timeout.
pub struct SlowVatRegistry;

#[async_trait]
impl VatRegistryValidator for SlowVatRegistry {
    async fn validate(&self, _vat_number: &str, _country: &str) -> Result<VatLookup, AppError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the timeout should have fired")
    }
}

/// Rate provider fake backed by a fixed table.
pub struct FixedRateProvider {
    rates: HashMap<(String, String), Decimal>,
}

impl FixedRateProvider {
    pub fn new(rates: &[(&str, &str, Decimal)]) -> Self {
        Self {
            rates: rates
                .iter()
                .map(|(from, to, rate)| ((from.to_string(), to.to_string()), *rate))
                .collect(),
        }
    }
}

/// Rate provider fake that never answers within any sane timeout.
pub struct SlowRateProvider;

#[async_trait]
impl RateProvider for SlowRateProvider {
    async fn fetch_rate(
        &self,
        _from: &str,
        _to: &str,
        _date: NaiveDate,
    ) -> Result<Decimal, AppError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the timeout should have fired")
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn fetch_rate(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, AppError> {
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .ok_or(AppError::RateUnavailable {
                from: from.to_string(),
                to: to.to_string(),
                date,
            })
    }
}

/// Fully wired engine over in-memory collaborators. The company side is the
/// default configuration: an organization in the Netherlands paying in EUR.
pub struct TestHarness {
    pub store: Arc<InMemoryRecordStore>,
    pub converter: Arc<CurrencyConverter>,
    pub reference: Arc<TaxConfig>,
    pub config: Arc<Config>,
    pub sink: Arc<RecordingAccountingSink>,
    pub freelancers: FreelancerService,
    pub contracts: ContractService,
    pub payments: PaymentService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_approvers(&["finance.lead"])
    }

    pub fn with_approvers(approvers: &[&str]) -> Self {
        let config = Arc::new(Config::default());
        let reference = Arc::new(TaxConfig::builtin().with_treaties(default_treaties()));
        let store = Arc::new(InMemoryRecordStore::new());
        let converter = Arc::new(CurrencyConverter::new());
        let resolver = Arc::new(TaxRuleResolver::new(reference.clone()));
        let sink = Arc::new(RecordingAccountingSink::new());
        let authorization = Arc::new(AllowListAuthorization::new(approvers));
        let vat_registry = Arc::new(StaticVatRegistry { valid: true });

        let freelancers = FreelancerService::new(
            store.clone(),
            vat_registry,
            reference.clone(),
            config.clone(),
        );
        let contracts = ContractService::new(
            store.clone(),
            resolver.clone(),
            converter.clone(),
            reference.clone(),
            config.clone(),
        );
        let payments = PaymentService::new(
            store.clone(),
            resolver,
            converter.clone(),
            authorization,
            sink.clone(),
            config.clone(),
        );

        Self {
            store,
            converter,
            reference,
            config,
            sink,
            freelancers,
            contracts,
            payments,
        }
    }

    /// Seed an active freelancer directly into the store.
    pub async fn seed_freelancer(
        &self,
        country: &str,
        vat_registered: bool,
        certificate_on_file: bool,
    ) -> Freelancer {
        let mut freelancer = Freelancer::try_new(CreateFreelancer {
            full_name: format!("Freelancer {}", country),
            email: None,
            residency_country: country.to_string(),
            tax_residency_country: None,
            vat_registered,
            vat_number: vat_registered.then(|| vat_number_for(country)),
            currency: "EUR".to_string(),
            hourly_rate: Some(Decimal::from(95)),
            daily_rate: None,
            gdpr_consent: true,
            tax_certificate_on_file: certificate_on_file,
            metadata: None,
        })
        .expect("valid freelancer input");
        freelancer.status = FreelancerStatus::Active;
        self.store
            .save_freelancer(&freelancer)
            .await
            .expect("seed freelancer")
    }
}

fn vat_number_for(country: &str) -> String {
    match country {
        "NL" => "NL123456789B01".to_string(),
        "DE" => "DE123456789".to_string(),
        other => format!("{}123456789", other),
    }
}

/// Treaties the scenarios rely on: a certificate-conditional 10% services
/// treaty between the Netherlands and India, and a 15% one with the US.
pub fn default_treaties() -> Vec<TaxTreaty> {
    vec![
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
    ]
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
