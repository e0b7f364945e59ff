use thiserror::Error;

use crate::domain::flow::FlowStatus;

/// The workflow engine's error taxonomy. Every variant is returned as a typed
/// result; the surrounding layer translates to response codes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// No eligible approvers exist at flow-creation time. Fatal to the
    /// submission; surfaced to the submitter, never retried automatically.
    #[error("no eligible approvers for employee `{employee_id}` in company `{company_id}`")]
    Configuration { employee_id: String, company_id: String },
    /// A decision arrived from someone outside the flow's sequence, or out of
    /// turn under sequential mode.
    #[error("approver `{approver_id}` is not authorized to decide on flow `{flow_id}`")]
    NotAuthorized { flow_id: String, approver_id: String },
    /// The approver already has a recorded decision on this flow.
    #[error("approver `{approver_id}` already recorded a decision on flow `{flow_id}`")]
    DuplicateDecision { flow_id: String, approver_id: String },
    /// The flow is already terminal; no further decisions are accepted.
    #[error("flow `{flow_id}` is closed as {status:?}")]
    FlowClosed { flow_id: String, status: FlowStatus },
    /// A competing writer committed first. Safe to retry with backoff.
    #[error("flow `{flow_id}` was modified concurrently; reload and retry")]
    ConcurrentModification { flow_id: String },
    /// Flow and expense terminal states diverge. Indicates a bug; never
    /// user-visible.
    #[error("flow `{flow_id}` and expense `{expense_id}` terminal states diverge")]
    ConsistencyViolation { flow_id: String, expense_id: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not authorized to perform this action.",
            Self::Conflict { .. } => {
                "The record changed while processing your request. Please retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(WorkflowError::NotAuthorized { .. }) => Self::Forbidden {
                message: "approver is not part of the approval sequence".to_owned(),
                correlation_id: unassigned,
            },
            ApplicationError::Workflow(WorkflowError::ConcurrentModification { .. }) => {
                Self::Conflict {
                    message: "concurrent decision submission".to_owned(),
                    correlation_id: unassigned,
                }
            }
            ApplicationError::Workflow(WorkflowError::ConsistencyViolation { .. }) => {
                Self::Internal {
                    message: "flow/expense terminal states diverged".to_owned(),
                    correlation_id: unassigned,
                }
            }
            ApplicationError::Workflow(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}
