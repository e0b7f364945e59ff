//! JSON API for the expense approval workflow.
//!
//! Endpoints:
//! - `POST /api/v1/expenses`                         — submit an expense, creating its approval flow
//! - `GET  /api/v1/expenses/mine`                    — the submitting employee's expenses
//! - `GET  /api/v1/expenses/{expense_id}`            — expense detail with flow summary
//! - `GET  /api/v1/approvalflow/{expense_id}`        — read-only flow projection
//! - `GET  /api/v1/approvals/pending`                — per-approver pending queue
//! - `POST /api/v1/approvals/{expense_id}/decision`  — record an approval decision
//!
//! Authentication is handled upstream; the acting user travels in the request
//! payload or query string.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, HistoryEntry};
use outlay_core::domain::flow::{ApprovalFlow, Decision, FlowStatus};
use outlay_core::domain::user::UserId;
use outlay_core::errors::InterfaceError;

use crate::service::{ExpenseWorkflowService, ServiceError, SubmitExpenseCommand};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<ExpenseWorkflowService>,
}

pub fn router(service: Arc<ExpenseWorkflowService>) -> Router {
    Router::new()
        .route("/api/v1/expenses", post(submit_expense))
        .route("/api/v1/expenses/mine", get(my_expenses))
        .route("/api/v1/expenses/{expense_id}", get(expense_detail))
        .route("/api/v1/approvalflow/{expense_id}", get(approval_flow))
        .route("/api/v1/approvals/pending", get(pending_approvals))
        .route("/api/v1/approvals/{expense_id}/decision", post(submit_decision))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub employee_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approver_id: String,
    pub decision: Decision,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MineQuery {
    pub employee_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub approver_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryDto {
    #[serde(rename = "approverId")]
    pub approver_id: String,
    pub decision: Decision,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseDto {
    pub id: String,
    #[serde(rename = "employeeId")]
    pub employee_id: String,
    #[serde(rename = "companyId")]
    pub company_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "convertedAmount")]
    pub converted_amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    #[serde(rename = "receiptUrl")]
    pub receipt_url: Option<String>,
    #[serde(rename = "approvalFlowId")]
    pub approval_flow_id: Option<String>,
    pub status: ExpenseStatus,
    #[serde(rename = "approvalHistory")]
    pub approval_history: Vec<HistoryDto>,
}

#[derive(Debug, Serialize)]
pub struct StepDto {
    #[serde(rename = "stepNumber")]
    pub step_number: u32,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct ApprovalDto {
    #[serde(rename = "approverId")]
    pub approver_id: String,
    pub decision: Decision,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only projection of a flow; field naming matches the wire contract the
/// UI already consumes.
#[derive(Debug, Serialize)]
pub struct FlowProjection {
    pub workflow_id: String,
    pub expense_id: String,
    pub steps: Vec<StepDto>,
    pub sequence: Vec<String>,
    pub required_approvers: Vec<String>,
    pub percentage: u8,
    #[serde(rename = "currentStep")]
    pub current_step: u32,
    pub status: FlowStatus,
    pub approvals: Vec<ApprovalDto>,
}

#[derive(Debug, Serialize)]
pub struct SubmitExpenseResponse {
    pub success: bool,
    pub message: String,
    pub expense: ExpenseDto,
    #[serde(rename = "approvalFlow")]
    pub approval_flow: FlowProjection,
}

#[derive(Debug, Serialize)]
pub struct ExpenseDetailResponse {
    pub success: bool,
    pub expense: ExpenseDto,
    #[serde(rename = "approvalFlow")]
    pub approval_flow: Option<FlowProjection>,
}

#[derive(Debug, Serialize)]
pub struct MyExpensesResponse {
    pub success: bool,
    pub count: usize,
    pub expenses: Vec<ExpenseDto>,
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub expense: ExpenseDto,
    #[serde(rename = "approvalFlow")]
    pub approval_flow: FlowProjection,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub expenses: Vec<PendingItem>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "expenseStatus")]
    pub expense_status: ExpenseStatus,
    #[serde(rename = "approvalFlow")]
    pub approval_flow: FlowProjection,
}

impl From<&HistoryEntry> for HistoryDto {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            approver_id: entry.approver_id.0.clone(),
            decision: entry.decision,
            comment: entry.comment.clone(),
            timestamp: entry.timestamp,
        }
    }
}

impl From<&Expense> for ExpenseDto {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id.0.clone(),
            employee_id: expense.employee_id.0.clone(),
            company_id: expense.company_id.0.clone(),
            amount: expense.amount,
            currency: expense.currency.clone(),
            converted_amount: expense.converted_amount,
            category: expense.category.clone(),
            description: expense.description.clone(),
            date: expense.date,
            receipt_url: expense.receipt_url.clone(),
            approval_flow_id: expense.approval_flow_id.as_ref().map(|id| id.0.clone()),
            status: expense.status,
            approval_history: expense.approval_history.iter().map(HistoryDto::from).collect(),
        }
    }
}

impl From<&ApprovalFlow> for FlowProjection {
    fn from(flow: &ApprovalFlow) -> Self {
        Self {
            workflow_id: flow.id.0.clone(),
            expense_id: flow.expense_id.0.clone(),
            steps: flow
                .steps
                .iter()
                .map(|step| StepDto {
                    step_number: step.step_number,
                    role: step.role.as_str().to_string(),
                })
                .collect(),
            sequence: flow.sequence.iter().map(|id| id.0.clone()).collect(),
            required_approvers: flow.required_approvers.iter().map(|id| id.0.clone()).collect(),
            percentage: flow.percentage,
            current_step: flow.current_step,
            status: flow.status,
            approvals: flow
                .approvals
                .iter()
                .map(|entry| ApprovalDto {
                    approver_id: entry.approver_id.0.clone(),
                    decision: entry.decision,
                    comment: entry.comment.clone(),
                    timestamp: entry.timestamp,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(error: ServiceError, correlation_id: &str) -> (StatusCode, Json<ErrorBody>) {
    let (status, message) = match error {
        ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, error.to_string()),
        ServiceError::Application(application) => {
            let interface = application.into_interface(correlation_id);
            let status = match &interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
                InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let message = match &interface {
                // Internal details stay in the logs.
                InterfaceError::Internal { .. } => interface.user_message().to_string(),
                InterfaceError::BadRequest { message, .. }
                | InterfaceError::Forbidden { message, .. }
                | InterfaceError::Conflict { message, .. }
                | InterfaceError::ServiceUnavailable { message, .. } => message.clone(),
            };
            if status.is_server_error() {
                warn!(
                    event_name = "api.request_failed",
                    correlation_id = %correlation_id,
                    error = %interface,
                    "request failed with server error"
                );
            }
            (status, message)
        }
    };

    (
        status,
        Json(ErrorBody { success: false, message, correlation_id: correlation_id.to_string() }),
    )
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn submit_expense(
    State(state): State<ApiState>,
    Json(request): Json<SubmitExpenseRequest>,
) -> Result<(StatusCode, Json<SubmitExpenseResponse>), (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let command = SubmitExpenseCommand {
        employee_id: UserId(request.employee_id),
        amount: request.amount,
        currency: request.currency,
        category: request.category,
        description: request.description,
        date: request.date,
        receipt_url: request.receipt_url,
    };

    let (expense, flow) = state
        .service
        .submit_expense(command, &correlation_id)
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitExpenseResponse {
            success: true,
            message: "Expense submitted and approval flow initiated successfully".to_string(),
            expense: ExpenseDto::from(&expense),
            approval_flow: FlowProjection::from(&flow),
        }),
    ))
}

pub async fn my_expenses(
    State(state): State<ApiState>,
    Query(query): Query<MineQuery>,
) -> Result<Json<MyExpensesResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let expenses = state
        .service
        .my_expenses(&UserId(query.employee_id))
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok(Json(MyExpensesResponse {
        success: true,
        count: expenses.len(),
        expenses: expenses.iter().map(ExpenseDto::from).collect(),
    }))
}

pub async fn expense_detail(
    State(state): State<ApiState>,
    Path(expense_id): Path<String>,
) -> Result<Json<ExpenseDetailResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let (expense, flow) = state
        .service
        .expense_detail(&ExpenseId(expense_id))
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok(Json(ExpenseDetailResponse {
        success: true,
        expense: ExpenseDto::from(&expense),
        approval_flow: flow.as_ref().map(FlowProjection::from),
    }))
}

pub async fn approval_flow(
    State(state): State<ApiState>,
    Path(expense_id): Path<String>,
) -> Result<Json<FlowProjection>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let flow = state
        .service
        .flow_projection(&ExpenseId(expense_id))
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok(Json(FlowProjection::from(&flow)))
}

pub async fn pending_approvals(
    State(state): State<ApiState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let pending = state
        .service
        .pending_for_approver(&UserId(query.approver_id))
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok(Json(PendingResponse {
        success: true,
        message: "Pending approvals retrieved successfully".to_string(),
        count: pending.len(),
        expenses: pending
            .iter()
            .map(|item| PendingItem {
                expense: ExpenseDto::from(&item.expense),
                approval_flow: FlowProjection::from(&item.flow),
            })
            .collect(),
    }))
}

pub async fn submit_decision(
    State(state): State<ApiState>,
    Path(expense_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = correlation_id();

    let (expense, flow) = state
        .service
        .submit_decision(
            &ExpenseId(expense_id),
            &UserId(request.approver_id),
            request.decision,
            request.comment,
            &correlation_id,
        )
        .await
        .map_err(|error| error_response(error, &correlation_id))?;

    Ok(Json(DecisionResponse {
        success: true,
        message: "Decision recorded successfully".to_string(),
        expense_status: expense.status,
        approval_flow: FlowProjection::from(&flow),
    }))
}
