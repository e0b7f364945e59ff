use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use outlay_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use outlay_core::currency::CurrencyConverter;
use outlay_core::directory::Directory;
use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, HistoryEntry};
use outlay_core::domain::flow::{ApprovalFlow, Decision, FlowId};
use outlay_core::domain::role::ELEVATED_ROLES;
use outlay_core::domain::user::UserId;
use outlay_core::errors::{ApplicationError, WorkflowError};
use outlay_core::resolver::{build_sequence, WorkflowPolicy};
use outlay_core::workflow::WorkflowEngine;
use outlay_db::repositories::{
    ExpenseRepository, FlowRepository, RepositoryError, WorkflowStore,
};

/// Audit sink that forwards events to the structured log stream.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %format!("audit.{}", event.event_type),
            correlation_id = %event.correlation_id,
            expense_id = event.expense_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            flow_id = event.flow_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            actor = %event.actor,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<WorkflowError> for ServiceError {
    fn from(error: WorkflowError) -> Self {
        Self::Application(ApplicationError::Workflow(error))
    }
}

fn persistence_error(error: RepositoryError) -> ServiceError {
    match error {
        RepositoryError::Conflict { flow_id } => {
            WorkflowError::ConcurrentModification { flow_id }.into()
        }
        other => ServiceError::Application(ApplicationError::Persistence(other.to_string())),
    }
}

#[derive(Clone, Debug)]
pub struct SubmitExpenseCommand {
    pub employee_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub receipt_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PendingApproval {
    pub expense: Expense,
    pub flow: ApprovalFlow,
}

/// Orchestrates the workflow engine against its collaborators: directory and
/// currency lookups feed the resolver, the pure state machine evaluates
/// decisions, and every mutation goes through the store's atomic boundary.
pub struct ExpenseWorkflowService {
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn Directory>,
    converter: Arc<dyn CurrencyConverter>,
    audit: Arc<dyn AuditSink>,
    engine: WorkflowEngine,
    policy: WorkflowPolicy,
}

impl ExpenseWorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn Directory>,
        converter: Arc<dyn CurrencyConverter>,
        audit: Arc<dyn AuditSink>,
        policy: WorkflowPolicy,
    ) -> Self {
        Self { store, directory, converter, audit, engine: WorkflowEngine::new(), policy }
    }

    /// Submit a new expense: convert into the company base currency, resolve
    /// the approver sequence, and persist {expense, flow} atomically. Nothing
    /// is persisted when resolution fails.
    pub async fn submit_expense(
        &self,
        command: SubmitExpenseCommand,
        correlation_id: &str,
    ) -> Result<(Expense, ApprovalFlow), ServiceError> {
        let employee = self
            .directory
            .find_employee(&command.employee_id)
            .await
            .map_err(|e| ServiceError::Application(ApplicationError::Integration(e.to_string())))?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "employee",
                id: command.employee_id.0.clone(),
            })?;

        let company = self
            .directory
            .company(&employee.company_id)
            .await
            .map_err(|e| ServiceError::Application(ApplicationError::Integration(e.to_string())))?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "company",
                id: employee.company_id.0.clone(),
            })?;

        let converted_amount = self
            .converter
            .convert(&command.currency, &company.currency, command.amount)
            .await
            .map_err(|e| ServiceError::Application(ApplicationError::Integration(e.to_string())))?;

        let manager_id = self
            .directory
            .manager_of(&employee.id)
            .await
            .map_err(|e| ServiceError::Application(ApplicationError::Integration(e.to_string())))?;

        let pool = self
            .directory
            .approver_pool(&employee.company_id, &ELEVATED_ROLES)
            .await
            .map_err(|e| ServiceError::Application(ApplicationError::Integration(e.to_string())))?;

        let plan = build_sequence(&employee, manager_id.as_ref(), &pool, &self.policy)?;

        let now = Utc::now();
        let flow_id = FlowId(Uuid::new_v4().to_string());
        let expense_id = ExpenseId(Uuid::new_v4().to_string());

        let expense = Expense {
            id: expense_id.clone(),
            employee_id: employee.id.clone(),
            company_id: employee.company_id.clone(),
            amount: command.amount,
            currency: command.currency.trim().to_ascii_uppercase(),
            converted_amount,
            category: command.category,
            description: command.description,
            date: command.date,
            receipt_url: command.receipt_url,
            approval_flow_id: Some(flow_id.clone()),
            status: ExpenseStatus::Pending,
            approval_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let flow = ApprovalFlow::from_plan(
            flow_id,
            expense_id,
            employee.company_id.clone(),
            plan,
            &self.policy,
            now,
        );

        self.store
            .create_expense_with_flow(&expense, &flow)
            .await
            .map_err(persistence_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                Some(flow.id.clone()),
                correlation_id,
                "flow.created",
                AuditCategory::Ingress,
                employee.id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("sequence_len", flow.sequence.len().to_string())
            .with_metadata("percentage", flow.percentage.to_string()),
        );

        info!(
            event_name = "workflow.expense_submitted",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            flow_id = %flow.id,
            approvers = flow.sequence.len(),
            "expense submitted and approval flow initiated"
        );

        Ok((expense, flow))
    }

    /// Record one approver's decision and commit it atomically with the
    /// expense-side mirror. A lost optimistic-revision race is retried once
    /// against fresh state before surfacing `ConcurrentModificationError`.
    pub async fn submit_decision(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<(Expense, ApprovalFlow), ServiceError> {
        let mut retried = false;
        loop {
            match self
                .try_submit_decision(expense_id, approver_id, decision, comment.clone(), correlation_id)
                .await
            {
                Err(ServiceError::Application(ApplicationError::Workflow(
                    WorkflowError::ConcurrentModification { flow_id },
                ))) if !retried => {
                    retried = true;
                    warn!(
                        event_name = "workflow.decision_conflict_retry",
                        correlation_id = %correlation_id,
                        expense_id = %expense_id,
                        flow_id = %flow_id,
                        "concurrent decision detected, retrying against fresh state"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_submit_decision(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<(Expense, ApprovalFlow), ServiceError> {
        let flow = self
            .store
            .find_by_expense_id(expense_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "approval flow",
                id: expense_id.0.clone(),
            })?;

        let mut expense = ExpenseRepository::find_by_id(self.store.as_ref(), expense_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "expense",
                id: expense_id.0.clone(),
            })?;

        let now = Utc::now();
        let audit_context = AuditContext::new(
            Some(expense.id.clone()),
            Some(flow.id.clone()),
            correlation_id,
            approver_id.0.clone(),
        );

        let outcome = self.engine.submit_decision_with_audit(
            &flow,
            approver_id,
            decision,
            comment,
            now,
            self.audit.as_ref(),
            &audit_context,
        )?;

        let history_entry = HistoryEntry {
            approver_id: outcome.entry.approver_id.clone(),
            decision: outcome.entry.decision,
            comment: outcome.entry.comment.clone(),
            timestamp: outcome.entry.timestamp,
        };

        // Synchronizer: the expense mirrors the flow's terminal state inside
        // the same commit, or records the intermediate review.
        if outcome.closed() {
            expense.close_from_flow(&outcome.flow, history_entry, now)?;
        } else {
            expense.record_review(history_entry, now);
        }

        let committed = self
            .store
            .commit_decision(&outcome, &expense, flow.revision)
            .await
            .map_err(persistence_error)?;

        if committed.is_terminal() {
            self.audit.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    Some(committed.id.clone()),
                    correlation_id,
                    "flow.closed",
                    AuditCategory::Sync,
                    approver_id.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("status", format!("{:?}", committed.status)),
            );
        }

        info!(
            event_name = "workflow.decision_committed",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            flow_id = %committed.id,
            closed = committed.is_terminal(),
            "approval decision committed"
        );

        Ok((expense, committed))
    }

    pub async fn expense_detail(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<(Expense, Option<ApprovalFlow>), ServiceError> {
        let expense = ExpenseRepository::find_by_id(self.store.as_ref(), expense_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "expense",
                id: expense_id.0.clone(),
            })?;
        let flow = self.store.find_by_expense_id(expense_id).await.map_err(persistence_error)?;
        Ok((expense, flow))
    }

    pub async fn flow_projection(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<ApprovalFlow, ServiceError> {
        self.store
            .find_by_expense_id(expense_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "approval flow",
                id: expense_id.0.clone(),
            })
    }

    pub async fn my_expenses(&self, employee_id: &UserId) -> Result<Vec<Expense>, ServiceError> {
        self.store.list_for_employee(employee_id).await.map_err(persistence_error)
    }

    /// Flows where the approver is in sequence, has not decided, and the flow
    /// is still open, paired with their owning expenses.
    pub async fn pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<PendingApproval>, ServiceError> {
        let flows =
            self.store.list_open_for_approver(approver_id).await.map_err(persistence_error)?;

        let mut pending = Vec::with_capacity(flows.len());
        for flow in flows {
            let expense = ExpenseRepository::find_by_id(self.store.as_ref(), &flow.expense_id)
                .await
                .map_err(persistence_error)?
                .ok_or_else(|| ServiceError::NotFound {
                    entity: "expense",
                    id: flow.expense_id.0.clone(),
                })?;
            pending.push(PendingApproval { expense, flow });
        }
        Ok(pending)
    }
}
