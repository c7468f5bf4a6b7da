//! Services module for freelancer-engine.

pub mod computation;
pub mod contracts;
pub mod currency;
pub mod freelancers;
pub mod metrics;
pub mod payments;
pub mod tax_rules;

pub use computation::{compute, recompute, round_money, TaxBreakdown, ROUNDING_TOLERANCE_CENTS};
pub use contracts::{ContractService, ContractSummary};
pub use currency::CurrencyConverter;
pub use freelancers::FreelancerService;
pub use metrics::{get_metrics, init_metrics};
pub use payments::PaymentService;
pub use tax_rules::{TaxClassification, TaxRuleResolver};
