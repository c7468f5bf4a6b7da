//! External collaborator seams.
//!
//! Persistence, exchange rates, VAT-registry validation, approval
//! authorization, and accounting postings are owned by other systems; the
//! engine talks to them through these traits. Every call goes through
//! [`with_timeout`] so a hung collaborator cannot stall a transition.

pub mod memory;

use crate::models::{Contract, Freelancer, Payment};
use async_trait::async_trait;
use chrono::NaiveDate;
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub use memory::InMemoryRecordStore;

/// Bound an external collaborator call.
///
/// The engine performs no retries of its own; a timeout surfaces as
/// `ExternalServiceTimeout`, which callers may retry safely because every
/// transition recomputes idempotently.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation,
                timeout_ms = limit.as_millis() as u64,
                "external call timed out"
            );
            Err(AppError::ExternalServiceTimeout(operation.to_string()))
        }
    }
}

/// Document store owning all persistent records.
///
/// Saves are optimistic: a record whose `version` no longer matches the
/// stored one is rejected with `ConcurrentModification`. Implementations
/// keep an append-only audit trail per record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_freelancer(&self, id: Uuid) -> Result<Option<Freelancer>, AppError>;
    async fn save_freelancer(&self, freelancer: &Freelancer) -> Result<Freelancer, AppError>;

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError>;
    async fn save_contract(&self, contract: &Contract) -> Result<Contract, AppError>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError>;
    async fn save_payment(&self, payment: &Payment) -> Result<Payment, AppError>;
    /// Payments referencing the contract, in creation order.
    async fn list_payments_for_contract(
        &self,
        contract_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>;
}

/// Exchange-rate source feeding the currency converter's table.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate)
        -> Result<Decimal, AppError>;
}

/// Result of an advisory VAT-registry lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatLookup {
    pub valid: bool,
    pub name: Option<String>,
}

/// VAT-registry validation (e.g. VIES). Advisory only: callers degrade to
/// "unverified" when this times out.
#[async_trait]
pub trait VatRegistryValidator: Send + Sync {
    async fn validate(&self, vat_number: &str, country: &str) -> Result<VatLookup, AppError>;
}

/// Externally-supplied approval capability check.
#[async_trait]
pub trait AuthorizationCheck: Send + Sync {
    async fn can_approve(&self, user: &str, payment: &Payment) -> Result<bool, AppError>;
}

/// Downstream accounting system.
#[async_trait]
pub trait AccountingSink: Send + Sync {
    /// Create the payable invoice for a settled payment; returns its id.
    async fn create_payable_invoice(&self, payment: &Payment) -> Result<String, AppError>;
    /// Create the withholding remittance entry; returns its id.
    async fn create_withholding_entry(&self, payment: &Payment) -> Result<String, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_through_fast_calls() {
        let result = with_timeout(Duration::from_millis(100), "fast", async {
            Ok::<_, AppError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_timeout_maps_elapsed_to_external_timeout() {
        let result = with_timeout(Duration::from_millis(10), "slow_registry", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceTimeout(_)));
        assert!(err.is_retryable());
    }
}
