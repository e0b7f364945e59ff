use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use outlay_core::domain::expense::{Expense, ExpenseId};
use outlay_core::domain::flow::{ApprovalFlow, FlowId, FlowStatus};
use outlay_core::domain::user::UserId;
use outlay_core::workflow::DecisionOutcome;

use super::{ExpenseRepository, FlowRepository, RepositoryError, WorkflowStore};

/// In-memory store with the same optimistic-revision semantics as the SQL
/// implementation. Lets the service layer be exercised without a database.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    expenses: RwLock<HashMap<String, Expense>>,
    flows: RwLock<HashMap<String, ApprovalFlow>>,
}

#[async_trait]
impl ExpenseRepository for InMemoryWorkflowStore {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn list_for_employee(
        &self,
        employee_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        let mut mine: Vec<Expense> =
            expenses.values().filter(|e| &e.employee_id == employee_id).cloned().collect();
        mine.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(mine)
    }
}

#[async_trait]
impl FlowRepository for InMemoryWorkflowStore {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        Ok(flows.get(&id.0).cloned())
    }

    async fn find_by_expense_id(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        Ok(flows.values().find(|flow| &flow.expense_id == expense_id).cloned())
    }

    async fn list_open_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        let mut open: Vec<ApprovalFlow> = flows
            .values()
            .filter(|flow| {
                matches!(flow.status, FlowStatus::Pending | FlowStatus::InProgress)
                    && flow.is_member(approver_id)
                    && !flow.has_decided(approver_id)
            })
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_expense_with_flow(
        &self,
        expense: &Expense,
        flow: &ApprovalFlow,
    ) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let mut flows = self.flows.write().await;
        expenses.insert(expense.id.0.clone(), expense.clone());
        flows.insert(flow.id.0.clone(), flow.clone());
        Ok(())
    }

    async fn commit_decision(
        &self,
        outcome: &DecisionOutcome,
        expense: &Expense,
        expected_revision: i64,
    ) -> Result<ApprovalFlow, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let mut flows = self.flows.write().await;

        let stored = flows
            .get(&outcome.flow.id.0)
            .ok_or_else(|| RepositoryError::Conflict { flow_id: outcome.flow.id.0.clone() })?;
        if stored.revision != expected_revision {
            return Err(RepositoryError::Conflict { flow_id: outcome.flow.id.0.clone() });
        }

        let mut committed = outcome.flow.clone();
        committed.revision = expected_revision + 1;
        flows.insert(committed.id.0.clone(), committed.clone());
        expenses.insert(expense.id.0.clone(), expense.clone());
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use outlay_core::domain::flow::{ApprovalFlow, Decision, FlowId, FlowStatus};
    use outlay_core::domain::user::{CompanyId, UserId};
    use outlay_core::resolver::WorkflowPolicy;
    use outlay_core::workflow::WorkflowEngine;

    use crate::repositories::{
        ExpenseRepository, FlowRepository, RepositoryError, WorkflowStore,
    };

    use super::InMemoryWorkflowStore;

    fn fixture(sequence: &[&str]) -> (Expense, ApprovalFlow) {
        let now = Utc::now();
        let expense = Expense {
            id: ExpenseId("exp-1".to_string()),
            employee_id: UserId("u-emp".to_string()),
            company_id: CompanyId("co-1".to_string()),
            amount: Decimal::new(5_000, 2),
            currency: "USD".to_string(),
            converted_amount: Decimal::new(5_000, 2),
            category: "meals".to_string(),
            description: "team lunch".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date"),
            receipt_url: None,
            approval_flow_id: Some(FlowId("flow-1".to_string())),
            status: ExpenseStatus::Pending,
            approval_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let flow = ApprovalFlow {
            id: FlowId("flow-1".to_string()),
            expense_id: ExpenseId("exp-1".to_string()),
            company_id: CompanyId("co-1".to_string()),
            steps: Vec::new(),
            sequence: sequence.iter().map(|id| UserId(id.to_string())).collect(),
            required_approvers: Vec::new(),
            percentage: WorkflowPolicy::default().percentage,
            sequential: false,
            current_step: 1,
            approvals: Vec::new(),
            status: FlowStatus::Pending,
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        (expense, flow)
    }

    #[tokio::test]
    async fn stale_revision_loses_and_writes_nothing() {
        let store = InMemoryWorkflowStore::default();
        let (expense, flow) = fixture(&["u-mgr", "u-cfo"]);
        store.create_expense_with_flow(&expense, &flow).await.expect("create");

        let engine = WorkflowEngine::new();
        // Two writers load the same revision.
        let first = engine
            .submit_decision(&flow, &UserId("u-mgr".to_string()), Decision::Approved, None, Utc::now())
            .expect("first decision");
        let second = engine
            .submit_decision(&flow, &UserId("u-cfo".to_string()), Decision::Approved, None, Utc::now())
            .expect("second decision");

        store.commit_decision(&first, &expense, 1).await.expect("winner commits");
        let error = store
            .commit_decision(&second, &expense, 1)
            .await
            .expect_err("stale revision must lose");
        assert!(matches!(error, RepositoryError::Conflict { .. }));

        let stored = FlowRepository::find_by_id(&store, &flow.id)
            .await
            .expect("read")
            .expect("flow exists");
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.approvals.len(), 1);
    }

    #[tokio::test]
    async fn open_flows_filter_by_membership_and_prior_decision() {
        let store = InMemoryWorkflowStore::default();
        let (expense, flow) = fixture(&["u-mgr", "u-cfo"]);
        store.create_expense_with_flow(&expense, &flow).await.expect("create");

        let pending =
            store.list_open_for_approver(&UserId("u-mgr".to_string())).await.expect("list");
        assert_eq!(pending.len(), 1);

        let outsider =
            store.list_open_for_approver(&UserId("u-other".to_string())).await.expect("list");
        assert!(outsider.is_empty());

        let engine = WorkflowEngine::new();
        let outcome = engine
            .submit_decision(&flow, &UserId("u-mgr".to_string()), Decision::Approved, None, Utc::now())
            .expect("decision");
        store.commit_decision(&outcome, &expense, 1).await.expect("commit");

        let after =
            store.list_open_for_approver(&UserId("u-mgr".to_string())).await.expect("list");
        assert!(after.is_empty(), "an approver with a recorded decision has nothing pending");
    }

    #[tokio::test]
    async fn expenses_list_newest_first() {
        let store = InMemoryWorkflowStore::default();
        let (mut older, mut flow_a) = fixture(&["u-mgr"]);
        older.id = ExpenseId("exp-old".to_string());
        older.date = NaiveDate::from_ymd_opt(2026, 1, 10).expect("valid date");
        flow_a.id = FlowId("flow-old".to_string());
        flow_a.expense_id = older.id.clone();
        store.create_expense_with_flow(&older, &flow_a).await.expect("create older");

        let (newer, flow_b) = fixture(&["u-mgr"]);
        store.create_expense_with_flow(&newer, &flow_b).await.expect("create newer");

        let mine =
            store.list_for_employee(&UserId("u-emp".to_string())).await.expect("list");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id.0, "exp-1");
        assert_eq!(mine[1].id.0, "exp-old");
    }

    #[tokio::test]
    async fn find_by_expense_id_returns_the_one_flow() {
        let store = InMemoryWorkflowStore::default();
        let (expense, flow) = fixture(&["u-mgr"]);
        store.create_expense_with_flow(&expense, &flow).await.expect("create");

        let found = store
            .find_by_expense_id(&expense.id)
            .await
            .expect("read")
            .expect("flow exists");
        assert_eq!(found.id, flow.id);

        let missing = store
            .find_by_expense_id(&ExpenseId("exp-missing".to_string()))
            .await
            .expect("read");
        assert!(missing.is_none());
    }
}
