use async_trait::async_trait;

use outlay_core::domain::expense::{Expense, ExpenseId};
use outlay_core::domain::flow::{ApprovalFlow, FlowId};
use outlay_core::domain::user::UserId;
use outlay_core::workflow::DecisionOutcome;

use crate::repositories::expense::{decision_as_str, expense_status_as_str, SqlExpenseRepository};
use crate::repositories::flow::{flow_status_as_str, SqlFlowRepository};
use crate::repositories::{
    ExpenseRepository, FlowRepository, RepositoryError, WorkflowStore,
};
use crate::DbPool;

/// SQLite-backed workflow store. Reads delegate to the plain repositories;
/// mutations run inside a single transaction so the flow and its expense
/// always land together.
pub struct SqlWorkflowStore {
    pool: DbPool,
    expenses: SqlExpenseRepository,
    flows: SqlFlowRepository,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            expenses: SqlExpenseRepository::new(pool.clone()),
            flows: SqlFlowRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ExpenseRepository for SqlWorkflowStore {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        self.expenses.find_by_id(id).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        self.expenses.list_for_employee(employee_id).await
    }
}

#[async_trait]
impl FlowRepository for SqlWorkflowStore {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<ApprovalFlow>, RepositoryError> {
        self.flows.find_by_id(id).await
    }

    async fn find_by_expense_id(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        self.flows.find_by_expense_id(expense_id).await
    }

    async fn list_open_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        self.flows.list_open_for_approver(approver_id).await
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn create_expense_with_flow(
        &self,
        expense: &Expense,
        flow: &ApprovalFlow,
    ) -> Result<(), RepositoryError> {
        let steps = serde_json::to_string(&flow.steps)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let sequence = serde_json::to_string(&flow.sequence)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let required_approvers = serde_json::to_string(&flow.required_approvers)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO expense (id, employee_id, company_id, amount, currency,
                                  converted_amount, category, description, expense_date,
                                  receipt_url, approval_flow_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(&expense.employee_id.0)
        .bind(&expense.company_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(expense.converted_amount.to_string())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date.format("%Y-%m-%d").to_string())
        .bind(&expense.receipt_url)
        .bind(expense.approval_flow_id.as_ref().map(|id| id.0.as_str()))
        .bind(expense_status_as_str(expense.status))
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO approval_flow (id, expense_id, company_id, steps, sequence,
                                        required_approvers, percentage, sequential,
                                        current_step, status, revision, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&flow.id.0)
        .bind(&flow.expense_id.0)
        .bind(&flow.company_id.0)
        .bind(steps)
        .bind(sequence)
        .bind(required_approvers)
        .bind(i64::from(flow.percentage))
        .bind(flow.sequential)
        .bind(i64::from(flow.current_step))
        .bind(flow_status_as_str(flow.status))
        .bind(flow.revision)
        .bind(flow.created_at.to_rfc3339())
        .bind(flow.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_decision(
        &self,
        outcome: &DecisionOutcome,
        expense: &Expense,
        expected_revision: i64,
    ) -> Result<ApprovalFlow, RepositoryError> {
        let flow = &outcome.flow;
        let entry = &outcome.entry;

        let mut tx = self.pool.begin().await?;

        // The revision guard serializes racing writers; the loser sees zero
        // affected rows and nothing in this transaction is kept.
        let updated = sqlx::query(
            "UPDATE approval_flow
             SET status = ?, current_step = ?, revision = revision + 1, updated_at = ?
             WHERE id = ? AND revision = ?",
        )
        .bind(flow_status_as_str(flow.status))
        .bind(i64::from(flow.current_step))
        .bind(flow.updated_at.to_rfc3339())
        .bind(&flow.id.0)
        .bind(expected_revision)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict { flow_id: flow.id.0.clone() });
        }

        sqlx::query(
            "INSERT INTO flow_approval (flow_id, approver_id, decision, comment, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&flow.id.0)
        .bind(&entry.approver_id.0)
        .bind(decision_as_str(entry.decision))
        .bind(&entry.comment)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE expense SET status = ?, updated_at = ? WHERE id = ?")
            .bind(expense_status_as_str(expense.status))
            .bind(expense.updated_at.to_rfc3339())
            .bind(&expense.id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO expense_history (expense_id, approver_id, decision, comment, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(&entry.approver_id.0)
        .bind(decision_as_str(entry.decision))
        .bind(&entry.comment)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut committed = flow.clone();
        committed.revision = expected_revision + 1;
        Ok(committed)
    }
}
