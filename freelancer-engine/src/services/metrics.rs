//! Prometheus metrics for freelancer-engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Payment transition counter by resulting status.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "freelancer_payments_total",
        "Total number of payment transitions by resulting status",
        &["status"] // draft, pending_approval, approved, rejected, paid
    )
    .expect("Failed to register payments_total")
});

/// Contract transition counter by resulting status.
pub static CONTRACTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "freelancer_contracts_total",
        "Total number of contract transitions by resulting status",
        &["status"]
    )
    .expect("Failed to register contracts_total")
});

/// Tax classification counter by VAT treatment.
pub static TAX_RESOLUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "freelancer_tax_resolutions_total",
        "Total number of tax classifications by VAT treatment",
        &["treatment"] // reverse_charge, zero_rated_export, standard
    )
    .expect("Failed to register tax_resolutions_total")
});

/// Engine operation duration histogram.
pub static ENGINE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "freelancer_engine_op_duration_seconds",
        "Engine operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register engine_op_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "freelancer_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Net payable counter by currency.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "freelancer_payment_amount_total",
        "Total net payable amount by currency",
        &["currency"]
    )
    .expect("Failed to register payment_amount_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&CONTRACTS_TOTAL);
    Lazy::force(&TAX_RESOLUTIONS_TOTAL);
    Lazy::force(&ENGINE_OP_DURATION);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
