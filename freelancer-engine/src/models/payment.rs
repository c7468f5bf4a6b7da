//! Payment model: line items, expense reimbursements, and tax fields.

use crate::models::treaty::ServiceCategory;
use chrono::{DateTime, NaiveDate, Utc};
use engine_core::error::AppError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Draft => "draft",
            PaymentStatus::PendingApproval => "pending_approval",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending_approval" => PaymentStatus::PendingApproval,
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Draft,
        }
    }

    /// Paid and Rejected are terminal; a rejected payment is never reused.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Rejected)
    }
}

/// Payment line item. `amount` is derived as quantity x rate and kept in
/// sync by recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentItem {
    pub item_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

impl PaymentItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, rate: Decimal) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            description: description.into(),
            quantity,
            rate,
            amount: (quantity * rate)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        }
    }
}

/// Expense reimbursement. Only approved expenses count toward totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseReimbursement {
    pub expense_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub approved: bool,
}

/// Freelancer payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub freelancer_id: Uuid,
    pub contract_id: Option<Uuid>,
    /// Milestones this payment settles. A milestone referenced by any
    /// non-rejected payment cannot be selected again.
    pub milestone_ids: Vec<Uuid>,
    pub posting_date: NaiveDate,
    pub status: PaymentStatus,
    pub items: Vec<PaymentItem>,
    pub expenses: Vec<ExpenseReimbursement>,
    /// Sum of item amounts, or manually entered when there are no items.
    pub base_amount: Decimal,
    pub total_expenses: Decimal,
    pub service_category: ServiceCategory,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub apply_reverse_charge: bool,
    pub withholding_rate: Decimal,
    pub withholding_tax_amount: Decimal,
    pub treaty_applied: bool,
    pub net_payable: Decimal,
    pub currency: String,
    /// Rate into the company currency, resolved at the posting date.
    pub exchange_rate: Decimal,
    pub net_amount_company_currency: Decimal,
    pub approved_by: Option<String>,
    pub approved_utc: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub invoice_id: Option<String>,
    pub withholding_entry_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
}

/// Input for a payment line item.
#[derive(Debug, Clone, Validate)]
pub struct CreatePaymentItem {
    #[validate(length(min = 1))]
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// Input for an expense reimbursement.
#[derive(Debug, Clone, Validate)]
pub struct CreateExpense {
    #[validate(length(min = 1))]
    pub description: String,
    pub amount: Decimal,
    pub approved: bool,
}

/// Input for creating a standalone payment.
#[derive(Debug, Clone, Validate)]
pub struct CreatePayment {
    pub freelancer_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub posting_date: NaiveDate,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(nested)]
    pub items: Vec<CreatePaymentItem>,
    #[validate(nested)]
    pub expenses: Vec<CreateExpense>,
    /// Manual base amount, used only when there are no items.
    pub base_amount: Option<Decimal>,
    pub transaction_is_b2b: bool,
    pub service_category: ServiceCategory,
    /// Manual withholding-rate override; `None` takes the resolved rate.
    pub manual_withholding_rate: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
}

impl Payment {
    /// Build a draft payment shell from validated input. Tax fields are
    /// filled in by the resolver and the computation engine afterwards.
    pub fn try_new(input: &CreatePayment) -> Result<Self, AppError> {
        input.validate()?;

        for item in &input.items {
            if item.quantity <= Decimal::ZERO || item.rate < Decimal::ZERO {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "item '{}' must have a positive quantity and a non-negative rate",
                    item.description
                )));
            }
        }
        for expense in &input.expenses {
            if expense.amount <= Decimal::ZERO {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "expense '{}' must have a positive amount",
                    expense.description
                )));
            }
        }
        if let Some(base) = input.base_amount {
            if base < Decimal::ZERO {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "manual base amount cannot be negative"
                )));
            }
        }
        if let Some(rate) = input.manual_withholding_rate {
            if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "withholding rate must be between 0 and 100"
                )));
            }
        }

        let now = Utc::now();
        Ok(Self {
            payment_id: Uuid::new_v4(),
            freelancer_id: input.freelancer_id,
            contract_id: input.contract_id,
            milestone_ids: Vec::new(),
            posting_date: input.posting_date,
            status: PaymentStatus::Draft,
            items: input
                .items
                .iter()
                .map(|i| PaymentItem::new(i.description.clone(), i.quantity, i.rate))
                .collect(),
            expenses: input
                .expenses
                .iter()
                .map(|e| ExpenseReimbursement {
                    expense_id: Uuid::new_v4(),
                    description: e.description.clone(),
                    amount: e.amount,
                    approved: e.approved,
                })
                .collect(),
            base_amount: input.base_amount.unwrap_or(Decimal::ZERO),
            total_expenses: Decimal::ZERO,
            service_category: input.service_category,
            vat_rate: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            apply_reverse_charge: false,
            withholding_rate: Decimal::ZERO,
            withholding_tax_amount: Decimal::ZERO,
            treaty_applied: false,
            net_payable: Decimal::ZERO,
            currency: input.currency.to_uppercase(),
            exchange_rate: Decimal::ONE,
            net_amount_company_currency: Decimal::ZERO,
            approved_by: None,
            approved_utc: None,
            rejection_reason: None,
            payment_date: None,
            payment_reference: None,
            invoice_id: None,
            withholding_entry_id: None,
            metadata: input.metadata.clone(),
            created_utc: now,
            updated_utc: now,
            version: 0,
        })
    }

    /// Whether the payment carries anything to pay out.
    pub fn has_payable_content(&self) -> bool {
        !self.items.is_empty() || self.base_amount > Decimal::ZERO
    }

    /// Whether this payment still holds a claim on the given milestone.
    pub fn holds_milestone(&self, milestone_id: Uuid) -> bool {
        self.status != PaymentStatus::Rejected && self.milestone_ids.contains(&milestone_id)
    }
}
