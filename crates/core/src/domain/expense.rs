use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::flow::{ApprovalFlow, Decision, FlowId, FlowStatus};
use crate::domain::user::{CompanyId, UserId};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl std::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Append-only audit entry mirrored onto the expense when its flow records a
/// decision or closes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub approver_id: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: UserId,
    pub company_id: CompanyId,
    pub amount: Decimal,
    pub currency: String,
    pub converted_amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub receipt_url: Option<String>,
    pub approval_flow_id: Option<FlowId>,
    pub status: ExpenseStatus,
    pub approval_history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Synchronizer entry point: copy the flow's terminal status onto the
    /// expense and append the closing history entry. Only a terminal flow may
    /// close its expense, and an already-closed expense may not be closed
    /// again with a diverging status.
    pub fn close_from_flow(
        &mut self,
        flow: &ApprovalFlow,
        entry: HistoryEntry,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let target = match flow.status {
            FlowStatus::Approved => ExpenseStatus::Approved,
            FlowStatus::Rejected => ExpenseStatus::Rejected,
            FlowStatus::Pending | FlowStatus::InProgress => {
                return Err(WorkflowError::ConsistencyViolation {
                    flow_id: flow.id.0.clone(),
                    expense_id: self.id.0.clone(),
                });
            }
        };

        if self.is_terminal() && self.status != target {
            return Err(WorkflowError::ConsistencyViolation {
                flow_id: flow.id.0.clone(),
                expense_id: self.id.0.clone(),
            });
        }

        self.status = target;
        self.approval_history.push(entry);
        self.updated_at = now;
        Ok(())
    }

    /// Mirror an intermediate (non-closing) decision into the expense audit
    /// history and mark the expense as under review.
    pub fn record_review(&mut self, entry: HistoryEntry, now: DateTime<Utc>) {
        if !self.is_terminal() {
            self.status = ExpenseStatus::UnderReview;
        }
        self.approval_history.push(entry);
        self.updated_at = now;
    }
}
