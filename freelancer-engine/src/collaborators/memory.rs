//! In-memory record store for embedding and tests.

use crate::collaborators::RecordStore;
use crate::models::{Contract, Freelancer, Payment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use engine_core::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One line of a record's append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity: String,
    pub record_id: Uuid,
    pub version: i64,
    pub at: DateTime<Utc>,
}

/// DashMap-backed record store with optimistic version checks and an
/// append-only audit trail.
#[derive(Default)]
pub struct InMemoryRecordStore {
    freelancers: DashMap<Uuid, Freelancer>,
    contracts: DashMap<Uuid, Contract>,
    payments: DashMap<Uuid, Payment>,
    payment_order: Mutex<Vec<Uuid>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit entries for one record, oldest first.
    pub fn audit_trail(&self, record_id: Uuid) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .expect("audit mutex poisoned")
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect()
    }

    fn record_audit(&self, entity: &'static str, record_id: Uuid, version: i64) {
        self.audit
            .lock()
            .expect("audit mutex poisoned")
            .push(AuditEntry {
                entity: entity.to_string(),
                record_id,
                version,
                at: Utc::now(),
            });
    }
}

/// Version check shared by all entities: a save must carry the currently
/// stored version; the stored copy gets `version + 1`.
fn check_version(
    entity: &'static str,
    id: Uuid,
    stored: Option<i64>,
    incoming: i64,
) -> Result<(), AppError> {
    match stored {
        Some(current) if current != incoming => {
            Err(AppError::ConcurrentModification { entity, id })
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_freelancer(&self, id: Uuid) -> Result<Option<Freelancer>, AppError> {
        Ok(self.freelancers.get(&id).map(|r| r.clone()))
    }

    async fn save_freelancer(&self, freelancer: &Freelancer) -> Result<Freelancer, AppError> {
        let id = freelancer.freelancer_id;
        let stored_version = self.freelancers.get(&id).map(|r| r.version);
        check_version("freelancer", id, stored_version, freelancer.version)?;

        let mut stored = freelancer.clone();
        stored.version += 1;
        stored.updated_utc = Utc::now();
        self.freelancers.insert(id, stored.clone());
        self.record_audit("freelancer", id, stored.version);
        Ok(stored)
    }

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
        Ok(self.contracts.get(&id).map(|r| r.clone()))
    }

    async fn save_contract(&self, contract: &Contract) -> Result<Contract, AppError> {
        let id = contract.contract_id;
        let stored_version = self.contracts.get(&id).map(|r| r.version);
        check_version("contract", id, stored_version, contract.version)?;

        let mut stored = contract.clone();
        stored.version += 1;
        stored.updated_utc = Utc::now();
        self.contracts.insert(id, stored.clone());
        self.record_audit("contract", id, stored.version);
        Ok(stored)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.payments.get(&id).map(|r| r.clone()))
    }

    async fn save_payment(&self, payment: &Payment) -> Result<Payment, AppError> {
        let id = payment.payment_id;
        let stored_version = self.payments.get(&id).map(|r| r.version);
        check_version("payment", id, stored_version, payment.version)?;

        let mut stored = payment.clone();
        stored.version += 1;
        stored.updated_utc = Utc::now();
        if stored_version.is_none() {
            self.payment_order
                .lock()
                .expect("order mutex poisoned")
                .push(id);
        }
        self.payments.insert(id, stored.clone());
        self.record_audit("payment", id, stored.version);
        Ok(stored)
    }

    async fn list_payments_for_contract(
        &self,
        contract_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let order = self
            .payment_order
            .lock()
            .expect("order mutex poisoned")
            .clone();
        Ok(order
            .iter()
            .filter_map(|id| self.payments.get(id).map(|r| r.clone()))
            .filter(|p| p.contract_id == Some(contract_id))
            .collect())
    }
}
