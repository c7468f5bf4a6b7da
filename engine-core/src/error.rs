use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Validation error: {0}")]
    Invalid(anyhow::Error),

    #[error("Payment has no items and no base amount")]
    EmptyPayment,

    #[error("Tax rule resolution failed: {0}")]
    RuleResolution(anyhow::Error),

    #[error("No exchange rate for {from}->{to} on or before {date}")]
    RateUnavailable {
        from: String,
        to: String,
        date: NaiveDate,
    },

    #[error("Unrecognized currency code: {0}")]
    InvalidCurrency(String),

    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("External call timed out: {0}")]
    ExternalServiceTimeout(String),

    #[error("Amounts changed on recomputation: {0}")]
    ComputationMismatch(String),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller may safely retry the failed operation.
    ///
    /// The engine itself never retries; idempotent recomputation makes a
    /// caller-side retry of these classes safe.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateUnavailable { .. }
                | AppError::ConcurrentModification { .. }
                | AppError::ExternalServiceTimeout(_)
        )
    }

    /// Short machine-readable label, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::Invalid(_) => "validation",
            AppError::EmptyPayment => "empty_payment",
            AppError::RuleResolution(_) => "rule_resolution",
            AppError::RateUnavailable { .. } => "rate_unavailable",
            AppError::InvalidCurrency(_) => "invalid_currency",
            AppError::ConcurrentModification { .. } => "concurrent_modification",
            AppError::ExternalServiceTimeout(_) => "external_timeout",
            AppError::ComputationMismatch(_) => "computation_mismatch",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::ConfigError(_) => "config",
            AppError::InternalError(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}
