//! Freelancer onboarding, VAT verification, and GDPR erasure tests.

mod common;

use common::{SlowVatRegistry, TestHarness};
use engine_core::config::Config;
use engine_core::error::AppError;
use freelancer_engine::collaborators::{InMemoryRecordStore, RecordStore};
use freelancer_engine::models::{
    CreateFreelancer, TaxConfig, UpdateFreelancer, VatVerification,
};
use freelancer_engine::services::FreelancerService;
use rust_decimal::Decimal;
use std::sync::Arc;

fn onboarding(country: &str, vat_number: Option<&str>) -> CreateFreelancer {
    CreateFreelancer {
        full_name: "Priya Sharma".to_string(),
        email: Some("priya@example.com".to_string()),
        residency_country: country.to_string(),
        tax_residency_country: None,
        vat_registered: vat_number.is_some(),
        vat_number: vat_number.map(|s| s.to_string()),
        currency: "EUR".to_string(),
        hourly_rate: Some(Decimal::from(80)),
        daily_rate: None,
        gdpr_consent: true,
        tax_certificate_on_file: true,
        metadata: None,
    }
}

#[tokio::test]
async fn onboarding_checks_the_vat_number_format() {
    let harness = TestHarness::new();

    let ok = harness
        .freelancers
        .create_freelancer(onboarding("NL", Some("NL123456789B01")))
        .await;
    assert!(ok.is_ok());

    // German-prefixed number on a Dutch freelancer.
    let err = harness
        .freelancers
        .create_freelancer(onboarding("NL", Some("DE123456789")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invalid(_)));
}

#[tokio::test]
async fn registry_confirms_a_vat_number() {
    let harness = TestHarness::new();
    let freelancer = harness
        .freelancers
        .create_freelancer(onboarding("NL", Some("NL123456789B01")))
        .await
        .unwrap();
    assert_eq!(freelancer.vat_verification, VatVerification::Unverified);

    let freelancer = harness
        .freelancers
        .verify_vat_number(freelancer.freelancer_id)
        .await
        .unwrap();
    assert_eq!(freelancer.vat_verification, VatVerification::Valid);
}

#[tokio::test]
async fn registry_timeout_degrades_to_unverified() {
    // Wire a service with a registry that never answers and a short timeout.
    let config = Arc::new(Config {
        external_call_timeout_ms: 50,
        ..Config::default()
    });
    let service = FreelancerService::new(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(SlowVatRegistry),
        Arc::new(TaxConfig::builtin()),
        config,
    );

    let freelancer = service
        .create_freelancer(onboarding("NL", Some("NL123456789B01")))
        .await
        .unwrap();

    // Advisory check: the timeout is absorbed, not surfaced.
    let freelancer = service
        .verify_vat_number(freelancer.freelancer_id)
        .await
        .unwrap();
    assert_eq!(freelancer.vat_verification, VatVerification::Unverified);
}

#[tokio::test]
async fn profile_update_reenforces_the_vat_invariant() {
    let harness = TestHarness::new();
    let freelancer = harness
        .freelancers
        .create_freelancer(onboarding("NL", Some("NL123456789B01")))
        .await
        .unwrap();

    // Flipping registration off without clearing the number: the number is
    // dropped with the registration.
    let updated = harness
        .freelancers
        .update_profile(
            freelancer.freelancer_id,
            UpdateFreelancer {
                vat_registered: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.vat_number.is_none());

    // Becoming registered without a number fails the invariant.
    let err = harness
        .freelancers
        .update_profile(
            freelancer.freelancer_id,
            UpdateFreelancer {
                vat_registered: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invalid(_)));
}

#[tokio::test]
async fn gdpr_erasure_anonymizes_but_keeps_the_record() {
    let harness = TestHarness::new();
    let freelancer = harness
        .freelancers
        .create_freelancer(onboarding("NL", Some("NL123456789B01")))
        .await
        .unwrap();
    let id = freelancer.freelancer_id;

    let erased = harness.freelancers.erase_personal_data(id).await.unwrap();
    assert!(erased.anonymized);
    assert!(erased.email.is_none());
    assert!(erased.vat_number.is_none());
    assert_ne!(erased.full_name, "Priya Sharma");

    // The record is still there for the financial audit trail.
    let stored = harness.store.get_freelancer(id).await.unwrap();
    assert!(stored.is_some());
    assert!(!harness.store.audit_trail(id).is_empty());
}
