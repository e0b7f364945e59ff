use crate::domain::flow::{ApprovalFlow, Decision, FlowStatus};

/// Result of re-evaluating a flow after a recorded decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub status: FlowStatus,
    pub current_step: u32,
}

/// Pure closure rule. Given the flow's current approvals, sequence, required
/// approvers, percentage and mode, decide whether it closes, advances, or
/// stays open.
///
/// Policy (recorded in DESIGN.md):
/// - a rejection by any required approver closes the flow REJECTED;
/// - with no required approvers configured, any rejection closes it REJECTED;
/// - approval closure needs every required approver approved and
///   `approved * 100 >= percentage * sequence_len` (integer arithmetic, no
///   floats);
/// - a threshold that has become arithmetically unreachable closes the flow
///   REJECTED instead of leaving it open forever;
/// - under sequential mode the step cursor advances past every approver with
///   a recorded decision while the flow stays open.
pub fn evaluate(flow: &ApprovalFlow) -> Evaluation {
    let sequence_len = flow.sequence.len();
    let approved = flow.approved_count();
    let rejected = flow.rejected_count();

    let required_rejected = flow
        .required_approvers
        .iter()
        .any(|approver| matches!(flow.decision_of(approver).map(|e| e.decision), Some(Decision::Rejected)));
    if required_rejected {
        return Evaluation { status: FlowStatus::Rejected, current_step: flow.current_step };
    }

    if flow.required_approvers.is_empty() && rejected > 0 {
        return Evaluation { status: FlowStatus::Rejected, current_step: flow.current_step };
    }

    let all_required_approved = flow
        .required_approvers
        .iter()
        .all(|approver| matches!(flow.decision_of(approver).map(|e| e.decision), Some(Decision::Approved)));
    let threshold_met = approved * 100 >= usize::from(flow.percentage) * sequence_len;
    if all_required_approved && threshold_met {
        return Evaluation { status: FlowStatus::Approved, current_step: flow.current_step };
    }

    // Too many non-required rejections: even if every remaining approver
    // approves, the threshold can no longer be met. Close instead of
    // deadlocking IN_PROGRESS.
    let reachable =
        (sequence_len - rejected) * 100 >= usize::from(flow.percentage) * sequence_len;
    if !reachable {
        return Evaluation { status: FlowStatus::Rejected, current_step: flow.current_step };
    }

    let status =
        if flow.approvals.is_empty() { FlowStatus::Pending } else { FlowStatus::InProgress };

    let mut current_step = flow.current_step;
    if flow.sequential && status == FlowStatus::InProgress {
        // Advance past any approver who already decided. Rejections that
        // leave the flow open (possible with required approvers configured)
        // must not pin the cursor on an approver who can never decide again.
        while (current_step as usize) < sequence_len {
            let index = (current_step - 1) as usize;
            let step_decided = flow
                .sequence
                .get(index)
                .map(|approver| flow.has_decided(approver))
                .unwrap_or(false);
            if !step_decided {
                break;
            }
            current_step += 1;
        }
    }

    Evaluation { status, current_step }
}
