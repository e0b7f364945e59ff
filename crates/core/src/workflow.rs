use chrono::{DateTime, Utc};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::flow::{ApprovalEntry, ApprovalFlow, Decision, FlowStatus};
use crate::domain::user::UserId;
use crate::errors::WorkflowError;
use crate::evaluator;

/// State change produced by a recorded decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowTransition {
    pub from: FlowStatus,
    pub to: FlowStatus,
}

/// A validated, evaluated decision ready to be committed atomically together
/// with its expense-side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// The flow with the decision appended and status/cursor re-evaluated.
    /// `revision` is untouched here; the store bumps it on commit.
    pub flow: ApprovalFlow,
    pub entry: ApprovalEntry,
    pub transition: FlowTransition,
}

impl DecisionOutcome {
    pub fn closed(&self) -> bool {
        self.transition.to.is_terminal()
    }
}

/// The approval-flow state machine. Pure over flow values: validation,
/// append, evaluation. Persistence and the atomic expense synchronization
/// happen in the store that commits the outcome.
#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    /// Record one approver's decision.
    ///
    /// Failure order: a closed flow rejects everything first, then
    /// authorization (sequence membership, and turn order under sequential
    /// mode), then the one-decision-per-approver rule.
    pub fn submit_decision(
        &self,
        flow: &ApprovalFlow,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        if flow.is_terminal() {
            return Err(WorkflowError::FlowClosed {
                flow_id: flow.id.0.clone(),
                status: flow.status,
            });
        }

        if !flow.is_member(approver_id) {
            return Err(WorkflowError::NotAuthorized {
                flow_id: flow.id.0.clone(),
                approver_id: approver_id.0.clone(),
            });
        }

        if flow.sequential && flow.current_step_approver() != Some(approver_id) {
            return Err(WorkflowError::NotAuthorized {
                flow_id: flow.id.0.clone(),
                approver_id: approver_id.0.clone(),
            });
        }

        if flow.has_decided(approver_id) {
            return Err(WorkflowError::DuplicateDecision {
                flow_id: flow.id.0.clone(),
                approver_id: approver_id.0.clone(),
            });
        }

        let entry =
            ApprovalEntry { approver_id: approver_id.clone(), decision, comment, timestamp: now };

        let mut updated = flow.clone();
        updated.approvals.push(entry.clone());

        let evaluation = evaluator::evaluate(&updated);
        let transition = FlowTransition { from: flow.status, to: evaluation.status };
        updated.status = evaluation.status;
        updated.current_step = evaluation.current_step;
        updated.updated_at = now;

        Ok(DecisionOutcome { flow: updated, entry, transition })
    }

    /// Same as [`submit_decision`], emitting an audit event for the applied
    /// or rejected transition.
    pub fn submit_decision_with_audit<S>(
        &self,
        flow: &ApprovalFlow,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<DecisionOutcome, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.submit_decision(flow, approver_id, decision, comment, now);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.expense_id.clone(),
                        audit.flow_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.decision_recorded",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.transition.from))
                    .with_metadata("to", format!("{:?}", outcome.transition.to))
                    .with_metadata("decision", format!("{decision:?}")),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.expense_id.clone(),
                        audit.flow_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.decision_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
