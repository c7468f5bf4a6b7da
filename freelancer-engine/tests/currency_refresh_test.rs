//! Currency converter integration with the external rate provider.

mod common;

use common::{date, FixedRateProvider, SlowRateProvider};
use engine_core::error::AppError;
use freelancer_engine::services::CurrencyConverter;
use rust_decimal::Decimal;
use std::time::Duration;

#[tokio::test]
async fn refresh_records_provider_rates() {
    let converter = CurrencyConverter::new();
    let provider = FixedRateProvider::new(&[
        ("USD", "EUR", Decimal::new(92, 2)),
        ("GBP", "EUR", Decimal::new(117, 2)),
    ]);

    let recorded = converter
        .refresh_from_provider(
            &provider,
            &[
                ("USD".to_string(), "EUR".to_string()),
                ("GBP".to_string(), "EUR".to_string()),
            ],
            date(2026, 3, 1),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(recorded, 2);

    let converted = converter
        .convert(Decimal::from(100), "USD", "EUR", date(2026, 3, 5))
        .unwrap();
    assert_eq!(converted, Decimal::from(92));
}

#[tokio::test]
async fn missing_provider_rate_is_fatal() {
    let converter = CurrencyConverter::new();
    let provider = FixedRateProvider::new(&[("USD", "EUR", Decimal::new(92, 2))]);

    // No silent 1:1 fallback when the provider cannot serve the pair.
    let err = converter
        .refresh_from_provider(
            &provider,
            &[("JPY".to_string(), "EUR".to_string())],
            date(2026, 3, 1),
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateUnavailable { .. }));
}

#[tokio::test]
async fn hung_provider_times_out() {
    let converter = CurrencyConverter::new();

    let err = converter
        .refresh_from_provider(
            &SlowRateProvider,
            &[("USD".to_string(), "EUR".to_string())],
            date(2026, 3, 1),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExternalServiceTimeout(_)));
    assert!(err.is_retryable());
}
