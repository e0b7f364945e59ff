use chrono::{DateTime, Utc};

use crate::domain::expense::ExpenseId;
use crate::domain::flow::{ApprovalFlow, FlowId, FlowStatus, FlowStep};
use crate::domain::role::Role;
use crate::domain::user::{CompanyId, EmployeeRecord, UserId};
use crate::errors::WorkflowError;

/// Closure policy applied to a new flow. Both knobs the source left ambiguous
/// (`percentage` default, `required_approvers` strategy) are explicit inputs
/// here rather than constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowPolicy {
    /// Approval threshold applied to non-required approvers, 0..=100.
    pub percentage: u8,
    /// When true, the employee's direct manager (if any) becomes a required
    /// approver whose decision is mandatory for closure.
    pub require_manager_approval: bool,
    /// Sequential mode: approvers decide in sequence order.
    pub sequential: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self { percentage: 100, require_manager_approval: false, sequential: false }
    }
}

/// Output of the approver resolver: the ordered approver identities plus the
/// descriptive step metadata that seeds a new flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePlan {
    pub steps: Vec<FlowStep>,
    pub sequence: Vec<UserId>,
    pub required_approvers: Vec<UserId>,
}

/// Build the approver sequence for a submission: manager first when present,
/// then every elevated-role pool member that is not the manager, duplicates
/// removed, pool order preserved.
///
/// An empty result is a deadlock by construction (the flow could never
/// close), so both inputs empty fails with a configuration error instead of
/// producing a flow.
pub fn build_sequence(
    employee: &EmployeeRecord,
    manager_id: Option<&UserId>,
    approver_pool: &[EmployeeRecord],
    policy: &WorkflowPolicy,
) -> Result<SequencePlan, WorkflowError> {
    let mut sequence: Vec<UserId> = Vec::with_capacity(approver_pool.len() + 1);

    if let Some(manager) = manager_id {
        sequence.push(manager.clone());
    }

    for member in approver_pool {
        // The submitter never approves their own expense.
        if member.id == employee.id {
            continue;
        }
        if !sequence.contains(&member.id) {
            sequence.push(member.id.clone());
        }
    }

    if sequence.is_empty() {
        return Err(WorkflowError::Configuration {
            employee_id: employee.id.0.clone(),
            company_id: employee.company_id.0.clone(),
        });
    }

    let first_role = if manager_id.is_some() {
        Role::Manager
    } else {
        approver_pool
            .iter()
            .map(|member| member.role)
            .find(|role| role.is_elevated())
            .unwrap_or(Role::Admin)
    };

    let steps =
        vec![FlowStep { step_number: 1, role: first_role }, FlowStep { step_number: 2, role: Role::Admin }];

    let required_approvers = match (policy.require_manager_approval, manager_id) {
        (true, Some(manager)) => vec![manager.clone()],
        _ => Vec::new(),
    };

    Ok(SequencePlan { steps, sequence, required_approvers })
}

impl ApprovalFlow {
    /// Materialize a new flow from a resolved plan. Status starts PENDING and
    /// the step cursor at 1.
    pub fn from_plan(
        id: FlowId,
        expense_id: ExpenseId,
        company_id: CompanyId,
        plan: SequencePlan,
        policy: &WorkflowPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            expense_id,
            company_id,
            steps: plan.steps,
            sequence: plan.sequence,
            required_approvers: plan.required_approvers,
            percentage: policy.percentage,
            sequential: policy.sequential,
            current_step: 1,
            approvals: Vec::new(),
            status: FlowStatus::Pending,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
