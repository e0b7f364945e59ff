use async_trait::async_trait;
use thiserror::Error;

use outlay_core::domain::expense::{Expense, ExpenseId};
use outlay_core::domain::flow::{ApprovalFlow, FlowId};
use outlay_core::domain::user::UserId;
use outlay_core::workflow::DecisionOutcome;

pub mod expense;
pub mod flow;
pub mod memory;

pub use expense::SqlExpenseRepository;
pub use flow::SqlFlowRepository;
pub use memory::InMemoryWorkflowStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// Optimistic revision check failed: another writer committed first.
    #[error("stale revision for flow `{flow_id}`")]
    Conflict { flow_id: String },
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;

    /// The employee's own expenses, newest first.
    async fn list_for_employee(
        &self,
        employee_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError>;
}

#[async_trait]
pub trait FlowRepository: Send + Sync {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<ApprovalFlow>, RepositoryError>;

    async fn find_by_expense_id(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError>;

    /// Open flows (PENDING or IN_PROGRESS) where the approver is part of the
    /// sequence and has no recorded decision yet.
    async fn list_open_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError>;
}

/// The atomic unit of the workflow engine: every mutating operation writes
/// {flow, expense} together or not at all.
#[async_trait]
pub trait WorkflowStore: ExpenseRepository + FlowRepository {
    /// Persist a newly submitted expense and its resolved flow in a single
    /// transaction.
    async fn create_expense_with_flow(
        &self,
        expense: &Expense,
        flow: &ApprovalFlow,
    ) -> Result<(), RepositoryError>;

    /// Commit an evaluated decision: the flow update (guarded by
    /// `expected_revision`), the approval row, and the expense-side mirror
    /// (status + history entry) as one transaction. Returns the committed
    /// flow with its bumped revision. A stale `expected_revision` fails with
    /// [`RepositoryError::Conflict`] and writes nothing.
    async fn commit_decision(
        &self,
        outcome: &DecisionOutcome,
        expense: &Expense,
        expected_revision: i64,
    ) -> Result<ApprovalFlow, RepositoryError>;
}
