//! Contract and milestone models.

use chrono::{DateTime, NaiveDate, Utc};
use engine_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    FixedTerm,
    OpenEnded,
    ProjectBased,
    Retainer,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::FixedTerm => "fixed_term",
            ContractType::OpenEnded => "open_ended",
            ContractType::ProjectBased => "project_based",
            ContractType::Retainer => "retainer",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed_term" => ContractType::FixedTerm,
            "project_based" => ContractType::ProjectBased,
            "retainer" => ContractType::Retainer,
            _ => ContractType::OpenEnded,
        }
    }

    /// Fixed-term and project-based contracts must carry an end date.
    pub fn requires_end_date(&self) -> bool {
        matches!(self, ContractType::FixedTerm | ContractType::ProjectBased)
    }
}

/// Contract status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Expired,
    Terminated,
    Renewed,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Expired => "expired",
            ContractStatus::Terminated => "terminated",
            ContractStatus::Renewed => "renewed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => ContractStatus::Active,
            "expired" => ContractStatus::Expired,
            "terminated" => ContractStatus::Terminated,
            "renewed" => ContractStatus::Renewed,
            _ => ContractStatus::Draft,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContractStatus::Draft | ContractStatus::Active)
    }
}

/// Payment frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Monthly,
    Milestone,
    Weekly,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Milestone => "milestone",
            PaymentFrequency::Weekly => "weekly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "milestone" => PaymentFrequency::Milestone,
            "weekly" => PaymentFrequency::Weekly,
            _ => PaymentFrequency::Monthly,
        }
    }
}

/// Milestone status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
    Approved,
    Paid,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Approved => "approved",
            MilestoneStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "in_progress" => MilestoneStatus::InProgress,
            "completed" => MilestoneStatus::Completed,
            "approved" => MilestoneStatus::Approved,
            "paid" => MilestoneStatus::Paid,
            _ => MilestoneStatus::Pending,
        }
    }

    fn order(&self) -> u8 {
        match self {
            MilestoneStatus::Pending => 0,
            MilestoneStatus::InProgress => 1,
            MilestoneStatus::Completed => 2,
            MilestoneStatus::Approved => 3,
            MilestoneStatus::Paid => 4,
        }
    }

    /// Milestones advance forward one step at a time.
    pub fn can_advance_to(&self, next: MilestoneStatus) -> bool {
        next.order() == self.order() + 1
    }

    /// Only completed or approved milestones can back a payment.
    pub fn is_payable(&self) -> bool {
        matches!(self, MilestoneStatus::Completed | MilestoneStatus::Approved)
    }
}

/// Contract deliverable with an associated payment amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
    pub status: MilestoneStatus,
    pub planned_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<NaiveDate>,
}

/// Freelancer contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: Uuid,
    pub freelancer_id: Uuid,
    pub contract_type: ContractType,
    pub status: ContractStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_value: Decimal,
    pub currency: String,
    pub payment_frequency: PaymentFrequency,
    /// Reverse-charge treatment for payments under this contract. Defaulted
    /// from the freelancer/company EU relationship, overridable at creation.
    pub reverse_charge: bool,
    pub milestones: Vec<Milestone>,
    pub termination_reason: Option<String>,
    pub termination_date: Option<NaiveDate>,
    pub renewed_from: Option<Uuid>,
    pub renewed_to: Option<Uuid>,
    pub compliance_notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub version: i64,
}

/// Input for a milestone on a new contract.
#[derive(Debug, Clone, Validate)]
pub struct CreateMilestone {
    #[validate(length(min = 1))]
    pub name: String,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
    pub planned_completion_date: Option<NaiveDate>,
}

/// Input for creating a contract.
#[derive(Debug, Clone, Validate)]
pub struct CreateContract {
    pub freelancer_id: Uuid,
    pub contract_type: ContractType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_value: Decimal,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub payment_frequency: PaymentFrequency,
    /// `None` derives the flag from the tax relationship.
    pub reverse_charge: Option<bool>,
    #[validate(nested)]
    pub milestones: Vec<CreateMilestone>,
    pub metadata: Option<serde_json::Value>,
}

impl Contract {
    /// Build a validated draft contract. `derived_reverse_charge` is the
    /// default computed from the freelancer/company EU relationship.
    pub fn try_new(input: CreateContract, derived_reverse_charge: bool) -> Result<Self, AppError> {
        input.validate()?;

        if let Some(end) = input.end_date {
            if end < input.start_date {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "end date cannot be before start date"
                )));
            }
        }
        if input.contract_type.requires_end_date() && input.end_date.is_none() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "end date is required for {} contracts",
                input.contract_type.as_str()
            )));
        }
        if input.total_value < Decimal::ZERO {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "total contract value cannot be negative"
            )));
        }
        for milestone in &input.milestones {
            if milestone.amount <= Decimal::ZERO {
                return Err(AppError::Invalid(anyhow::anyhow!(
                    "milestone '{}' must have a positive amount",
                    milestone.name
                )));
            }
            if let Some(due) = milestone.planned_completion_date {
                if due < input.start_date {
                    return Err(AppError::Invalid(anyhow::anyhow!(
                        "milestone '{}' is planned before the contract starts",
                        milestone.name
                    )));
                }
                if let Some(end) = input.end_date {
                    if due > end {
                        return Err(AppError::Invalid(anyhow::anyhow!(
                            "milestone '{}' is planned after the contract ends",
                            milestone.name
                        )));
                    }
                }
            }
        }

        let now = Utc::now();
        let milestones = input
            .milestones
            .into_iter()
            .map(|m| Milestone {
                milestone_id: Uuid::new_v4(),
                name: m.name,
                amount: m.amount,
                percentage: m.percentage,
                status: MilestoneStatus::Pending,
                planned_completion_date: m.planned_completion_date,
                actual_completion_date: None,
            })
            .collect();

        Ok(Self {
            contract_id: Uuid::new_v4(),
            freelancer_id: input.freelancer_id,
            contract_type: input.contract_type,
            status: ContractStatus::Draft,
            start_date: input.start_date,
            end_date: input.end_date,
            total_value: input.total_value,
            currency: input.currency.to_uppercase(),
            payment_frequency: input.payment_frequency,
            reverse_charge: input.reverse_charge.unwrap_or(derived_reverse_charge),
            milestones,
            termination_reason: None,
            termination_date: None,
            renewed_from: None,
            renewed_to: None,
            compliance_notes: None,
            metadata: input.metadata,
            created_utc: now,
            updated_utc: now,
            version: 0,
        })
    }

    /// Draft -> Active.
    pub fn activate(&mut self) -> Result<(), AppError> {
        if self.status != ContractStatus::Draft {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "only draft contracts can be activated (status: {})",
                self.status.as_str()
            )));
        }
        self.status = ContractStatus::Active;
        Ok(())
    }

    /// Active -> Expired when the end date has passed.
    ///
    /// Returns whether the contract transitioned. Calling this on an
    /// already-expired contract is a no-op, so the external scheduler can
    /// invoke it repeatedly. Open-ended contracts never expire; an end date
    /// set on one is ignored here.
    pub fn expire(&mut self, as_of: NaiveDate) -> Result<bool, AppError> {
        if self.status == ContractStatus::Expired {
            return Ok(false);
        }
        if self.status != ContractStatus::Active {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "only active contracts can expire (status: {})",
                self.status.as_str()
            )));
        }
        if self.contract_type == ContractType::OpenEnded {
            return Ok(false);
        }
        match self.end_date {
            Some(end) if end < as_of => {
                self.status = ContractStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Active -> Terminated. Fatal to future milestone completion.
    pub fn terminate(
        &mut self,
        date: NaiveDate,
        reason: &str,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        if self.status != ContractStatus::Active {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "only active contracts can be terminated (status: {})",
                self.status.as_str()
            )));
        }
        if reason.trim().is_empty() {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "termination reason is required"
            )));
        }
        if date > today {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "termination date cannot be in the future"
            )));
        }
        self.status = ContractStatus::Terminated;
        self.end_date = Some(date);
        self.termination_date = Some(date);
        self.termination_reason = Some(reason.to_string());
        Ok(())
    }

    /// Active -> Renewed, linking to the successor contract.
    pub fn mark_renewed(&mut self, successor_id: Uuid) -> Result<(), AppError> {
        if self.status != ContractStatus::Active {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "only active contracts can be renewed (status: {})",
                self.status.as_str()
            )));
        }
        self.status = ContractStatus::Renewed;
        self.renewed_to = Some(successor_id);
        Ok(())
    }

    /// Advance a milestone one step. Completion requires the contract to
    /// still be active and stamps the actual completion date if absent.
    pub fn advance_milestone(
        &mut self,
        milestone_id: Uuid,
        target: MilestoneStatus,
        today: NaiveDate,
    ) -> Result<&Milestone, AppError> {
        if target == MilestoneStatus::Completed && self.status != ContractStatus::Active {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "milestones cannot be completed on a {} contract",
                self.status.as_str()
            )));
        }
        let milestone = self
            .milestones
            .iter_mut()
            .find(|m| m.milestone_id == milestone_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("milestone {}", milestone_id)))?;

        if !milestone.status.can_advance_to(target) {
            return Err(AppError::Invalid(anyhow::anyhow!(
                "milestone '{}' cannot move from {} to {}",
                milestone.name,
                milestone.status.as_str(),
                target.as_str()
            )));
        }
        milestone.status = target;
        if target == MilestoneStatus::Completed && milestone.actual_completion_date.is_none() {
            milestone.actual_completion_date = Some(today);
        }
        Ok(milestone)
    }

    /// Mark milestones paid once the backing payment settles. Accepts
    /// completed or approved milestones (payment settlement closes them out
    /// regardless of whether an approval step was recorded).
    pub fn mark_milestones_paid(&mut self, milestone_ids: &[Uuid]) {
        for milestone in &mut self.milestones {
            if milestone_ids.contains(&milestone.milestone_id) && milestone.status.is_payable() {
                milestone.status = MilestoneStatus::Paid;
            }
        }
    }

    /// Soft-invariant checks. Violations are warnings, never fatal.
    pub fn reconciliation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.milestones.is_empty() {
            return warnings;
        }
        let tolerance = Decimal::new(1, 2);

        let amount_total: Decimal = self.milestones.iter().map(|m| m.amount).sum();
        if self.total_value > Decimal::ZERO && (amount_total - self.total_value).abs() > tolerance {
            warnings.push(format!(
                "milestone amounts ({}) do not reconcile with contract value ({})",
                amount_total, self.total_value
            ));
        }

        if self.payment_frequency == PaymentFrequency::Milestone {
            let pct_total: Decimal = self.milestones.iter().filter_map(|m| m.percentage).sum();
            if (pct_total - Decimal::ONE_HUNDRED).abs() > tolerance {
                warnings.push(format!(
                    "milestone percentages sum to {} instead of 100",
                    pct_total
                ));
            }
        }
        warnings
    }
}
