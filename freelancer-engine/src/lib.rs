//! freelancer-engine: tax and payment computation engine for an organization
//! engaging independent contractors across tax jurisdictions.
//!
//! The crate owns the contract and payment lifecycle state machines, the
//! VAT/withholding rule resolver, the deterministic payment computation, and
//! the currency converter. Persistence, exchange-rate retrieval, VAT-registry
//! validation, approval authorization, and accounting postings are external
//! collaborators behind the traits in [`collaborators`].
pub mod collaborators;
pub mod models;
pub mod services;
