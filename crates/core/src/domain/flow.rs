use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::expense::ExpenseId;
use crate::domain::role::Role;
use crate::domain::user::{CompanyId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
}

impl FlowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Descriptive metadata about the pipeline shape. A single step is enough for
/// the default policy; multi-stage pipelines list one entry per stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub step_number: u32,
    pub role: Role,
}

/// One approver's recorded decision. Append-only; an approver appears at most
/// once per flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub approver_id: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The workflow instance for one expense. `revision` is the optimistic
/// concurrency token: every committed mutation bumps it, and a writer holding
/// a stale revision loses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    pub id: FlowId,
    pub expense_id: ExpenseId,
    pub company_id: CompanyId,
    pub steps: Vec<FlowStep>,
    pub sequence: Vec<UserId>,
    pub required_approvers: Vec<UserId>,
    pub percentage: u8,
    pub sequential: bool,
    pub current_step: u32,
    pub approvals: Vec<ApprovalEntry>,
    pub status: FlowStatus,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalFlow {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_member(&self, approver_id: &UserId) -> bool {
        self.sequence.contains(approver_id)
    }

    pub fn decision_of(&self, approver_id: &UserId) -> Option<&ApprovalEntry> {
        self.approvals.iter().find(|entry| &entry.approver_id == approver_id)
    }

    pub fn has_decided(&self, approver_id: &UserId) -> bool {
        self.decision_of(approver_id).is_some()
    }

    pub fn approved_count(&self) -> usize {
        self.approvals.iter().filter(|entry| entry.decision == Decision::Approved).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.approvals.iter().filter(|entry| entry.decision == Decision::Rejected).count()
    }

    /// The approver whose turn it is under sequential mode. `current_step` is
    /// 1-based into `sequence`.
    pub fn current_step_approver(&self) -> Option<&UserId> {
        let index = self.current_step.checked_sub(1)? as usize;
        self.sequence.get(index)
    }
}
