//! End-to-end workflow scenarios against a real SQLite database: atomic
//! {flow, expense} writes, the optimistic-revision race, and the pending
//! queue projection.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, HistoryEntry};
use outlay_core::domain::flow::{ApprovalFlow, Decision, FlowId, FlowStatus, FlowStep};
use outlay_core::domain::role::Role;
use outlay_core::domain::user::{CompanyId, UserId};
use outlay_core::resolver::WorkflowPolicy;
use outlay_core::workflow::WorkflowEngine;
use outlay_db::fixtures::{seed_demo_directory, SeedDataset};
use outlay_db::repositories::{
    ExpenseRepository, FlowRepository, RepositoryError, WorkflowStore,
};
use outlay_db::{connect_with_settings, migrations, SqlWorkflowStore};

async fn setup() -> (sqlx::SqlitePool, SeedDataset) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let dataset = seed_demo_directory(&pool).await.expect("seed");
    (pool, dataset)
}

fn fixture(dataset: &SeedDataset, expense_id: &str, flow_id: &str) -> (Expense, ApprovalFlow) {
    let now = Utc::now();
    let expense = Expense {
        id: ExpenseId(expense_id.to_string()),
        employee_id: UserId(dataset.employee_id.clone()),
        company_id: CompanyId(dataset.company_id.clone()),
        amount: Decimal::new(14_250, 2),
        currency: "USD".to_string(),
        converted_amount: Decimal::new(14_250, 2),
        category: "travel".to_string(),
        description: "airport transfer".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 4, 18).expect("valid date"),
        receipt_url: Some("receipts/transfer.pdf".to_string()),
        approval_flow_id: Some(FlowId(flow_id.to_string())),
        status: ExpenseStatus::Pending,
        approval_history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let flow = ApprovalFlow {
        id: FlowId(flow_id.to_string()),
        expense_id: ExpenseId(expense_id.to_string()),
        company_id: CompanyId(dataset.company_id.clone()),
        steps: vec![
            FlowStep { step_number: 1, role: Role::Manager },
            FlowStep { step_number: 2, role: Role::Admin },
        ],
        sequence: vec![UserId(dataset.manager_id.clone()), UserId(dataset.cfo_id.clone())],
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

fn history_entry(outcome: &outlay_core::workflow::DecisionOutcome) -> HistoryEntry {
    HistoryEntry {
        approver_id: outcome.entry.approver_id.clone(),
        decision: outcome.entry.decision,
        comment: outcome.entry.comment.clone(),
        timestamp: outcome.entry.timestamp,
    }
}

#[tokio::test]
async fn created_pair_round_trips_through_sql() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool);
    let (expense, flow) = fixture(&dataset, "exp-rt", "flow-rt");

    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let loaded_expense = ExpenseRepository::find_by_id(&store, &expense.id)
        .await
        .expect("read expense")
        .expect("expense exists");
    assert_eq!(loaded_expense.amount, expense.amount);
    assert_eq!(loaded_expense.status, ExpenseStatus::Pending);
    assert_eq!(loaded_expense.approval_flow_id, Some(flow.id.clone()));

    let loaded_flow = store
        .find_by_expense_id(&expense.id)
        .await
        .expect("read flow")
        .expect("flow exists");
    assert_eq!(loaded_flow.sequence, flow.sequence);
    assert_eq!(loaded_flow.steps, flow.steps);
    assert_eq!(loaded_flow.percentage, 100);
    assert_eq!(loaded_flow.revision, 1);
}

#[tokio::test]
async fn manager_and_cfo_approvals_close_flow_and_expense_together() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool);
    let (expense, flow) = fixture(&dataset, "exp-a", "flow-a");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let engine = WorkflowEngine::new();
    let manager = UserId(dataset.manager_id.clone());
    let cfo = UserId(dataset.cfo_id.clone());

    let first = engine
        .submit_decision(&flow, &manager, Decision::Approved, None, Utc::now())
        .expect("manager decision");
    let mut reviewed = expense.clone();
    reviewed.record_review(history_entry(&first), Utc::now());
    let committed = store.commit_decision(&first, &reviewed, 1).await.expect("first commit");
    assert_eq!(committed.status, FlowStatus::InProgress);
    assert_eq!(committed.revision, 2);

    let loaded = store
        .find_by_expense_id(&expense.id)
        .await
        .expect("reload")
        .expect("flow exists");
    let second = engine
        .submit_decision(&loaded, &cfo, Decision::Approved, None, Utc::now())
        .expect("cfo decision");
    assert!(second.closed());

    let mut closed = ExpenseRepository::find_by_id(&store, &expense.id)
        .await
        .expect("reload expense")
        .expect("expense exists");
    closed
        .close_from_flow(&second.flow, history_entry(&second), Utc::now())
        .expect("synchronize");
    store.commit_decision(&second, &closed, loaded.revision).await.expect("closing commit");

    // Closed flow and expense must agree after the atomic commit.
    let final_flow = store
        .find_by_expense_id(&expense.id)
        .await
        .expect("final flow")
        .expect("flow exists");
    let final_expense = ExpenseRepository::find_by_id(&store, &expense.id)
        .await
        .expect("final expense")
        .expect("expense exists");
    assert_eq!(final_flow.status, FlowStatus::Approved);
    assert_eq!(final_expense.status, ExpenseStatus::Approved);
    assert_eq!(final_flow.approvals.len(), 2);
    assert_eq!(final_expense.approval_history.len(), 2);
}

#[tokio::test]
async fn rejection_closes_both_records_in_one_transaction() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool);
    let (expense, flow) = fixture(&dataset, "exp-b", "flow-b");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let engine = WorkflowEngine::new();
    let outcome = engine
        .submit_decision(
            &flow,
            &UserId(dataset.manager_id.clone()),
            Decision::Rejected,
            Some("no receipt attached".to_string()),
            Utc::now(),
        )
        .expect("rejection");
    assert!(outcome.closed());

    let mut closed = expense.clone();
    closed.close_from_flow(&outcome.flow, history_entry(&outcome), Utc::now()).expect("sync");
    store.commit_decision(&outcome, &closed, 1).await.expect("commit");

    let final_flow = store
        .find_by_expense_id(&expense.id)
        .await
        .expect("flow")
        .expect("flow exists");
    let final_expense = ExpenseRepository::find_by_id(&store, &expense.id)
        .await
        .expect("expense")
        .expect("expense exists");
    assert_eq!(final_flow.status, FlowStatus::Rejected);
    assert_eq!(final_expense.status, ExpenseStatus::Rejected);
    assert_eq!(final_expense.approval_history[0].comment.as_deref(), Some("no receipt attached"));
}

#[tokio::test]
async fn racing_closers_produce_exactly_one_winner() {
    let (pool, dataset) = setup().await;
    let store = std::sync::Arc::new(SqlWorkflowStore::new(pool));
    let (expense, flow) = fixture(&dataset, "exp-e", "flow-e");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    // Both writers evaluate against the same revision-1 snapshot.
    let engine = WorkflowEngine::new();
    let left = engine
        .submit_decision(
            &flow,
            &UserId(dataset.manager_id.clone()),
            Decision::Approved,
            None,
            Utc::now(),
        )
        .expect("left decision");
    let right = engine
        .submit_decision(
            &flow,
            &UserId(dataset.cfo_id.clone()),
            Decision::Approved,
            None,
            Utc::now(),
        )
        .expect("right decision");

    let mut left_expense = expense.clone();
    left_expense.record_review(history_entry(&left), Utc::now());
    let mut right_expense = expense.clone();
    right_expense.record_review(history_entry(&right), Utc::now());

    let (left_result, right_result) = tokio::join!(
        store.commit_decision(&left, &left_expense, 1),
        store.commit_decision(&right, &right_expense, 1),
    );

    let winners =
        usize::from(left_result.is_ok()) + usize::from(right_result.is_ok());
    assert_eq!(winners, 1, "exactly one racing writer may commit");

    let loser = if left_result.is_ok() { right_result } else { left_result };
    assert!(matches!(loser, Err(RepositoryError::Conflict { .. })));

    // No lost updates: the committed approvals match the single winner.
    let stored = store
        .find_by_expense_id(&expense.id)
        .await
        .expect("reload")
        .expect("flow exists");
    assert_eq!(stored.approvals.len(), 1);
    assert_eq!(stored.revision, 2);
}

#[tokio::test]
async fn pending_queue_respects_membership_and_prior_decisions() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool);
    let (expense, flow) = fixture(&dataset, "exp-p", "flow-p");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let manager = UserId(dataset.manager_id.clone());
    let cfo = UserId(dataset.cfo_id.clone());
    let admin = UserId(dataset.admin_id.clone());

    let manager_pending = store.list_open_for_approver(&manager).await.expect("list");
    assert_eq!(manager_pending.len(), 1);

    // The admin is elevated but not part of this flow's sequence.
    let admin_pending = store.list_open_for_approver(&admin).await.expect("list");
    assert!(admin_pending.is_empty());

    let engine = WorkflowEngine::new();
    let outcome = engine
        .submit_decision(&flow, &manager, Decision::Approved, None, Utc::now())
        .expect("decision");
    let mut reviewed = expense.clone();
    reviewed.record_review(history_entry(&outcome), Utc::now());
    store.commit_decision(&outcome, &reviewed, 1).await.expect("commit");

    let manager_after = store.list_open_for_approver(&manager).await.expect("list");
    assert!(manager_after.is_empty(), "deciders drop out of their own pending queue");

    let cfo_after = store.list_open_for_approver(&cfo).await.expect("list");
    assert_eq!(cfo_after.len(), 1, "undecided members still see the open flow");
}

#[tokio::test]
async fn storage_enforces_one_flow_per_expense() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool.clone());
    let (expense, flow) = fixture(&dataset, "exp-u", "flow-u1");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let error = sqlx::query(
        "INSERT INTO approval_flow (id, expense_id, company_id, steps, sequence,
                                    required_approvers, percentage, sequential, current_step,
                                    status, revision, created_at, updated_at)
         VALUES ('flow-u2', ?, ?, '[]', '[]', '[]', 100, 0, 1, 'PENDING', 1, ?, ?)",
    )
    .bind(&expense.id.0)
    .bind(&expense.company_id.0)
    .bind(Utc::now().to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .execute(&pool)
    .await;

    assert!(error.is_err(), "second flow for the same expense must violate the unique index");
}

#[tokio::test]
async fn storage_enforces_one_decision_per_approver() {
    let (pool, dataset) = setup().await;
    let store = SqlWorkflowStore::new(pool.clone());
    let (expense, flow) = fixture(&dataset, "exp-d", "flow-d");
    store.create_expense_with_flow(&expense, &flow).await.expect("create");

    let insert = |pool: sqlx::SqlitePool| async move {
        sqlx::query(
            "INSERT INTO flow_approval (flow_id, approver_id, decision, comment, recorded_at)
             VALUES ('flow-d', 'u-demo-manager', 'APPROVED', NULL, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
    };

    insert(pool.clone()).await.expect("first decision row");
    let duplicate = insert(pool).await;
    assert!(duplicate.is_err(), "duplicate approver row must violate the unique constraint");
}
