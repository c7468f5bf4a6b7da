//! Domain models for freelancer-engine.

mod contract;
mod freelancer;
mod payment;
mod treaty;
mod vat;

pub use contract::{
    Contract, ContractStatus, ContractType, CreateContract, CreateMilestone, Milestone,
    MilestoneStatus, PaymentFrequency,
};
pub use freelancer::{
    CreateFreelancer, Freelancer, FreelancerStatus, UpdateFreelancer, VatVerification,
};
pub use payment::{
    CreateExpense, CreatePayment, CreatePaymentItem, ExpenseReimbursement, Payment, PaymentItem,
    PaymentStatus,
};
pub use treaty::{ServiceCategory, TaxTreaty};
pub use vat::{TaxConfig, VatConfiguration};
