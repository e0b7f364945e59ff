use async_trait::async_trait;
use sqlx::Row;

use outlay_core::domain::expense::ExpenseId;
use outlay_core::domain::flow::{ApprovalEntry, ApprovalFlow, FlowId, FlowStatus, FlowStep};
use outlay_core::domain::user::{CompanyId, UserId};

use super::expense::{parse_decision, parse_timestamp};
use super::{FlowRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFlowRepository {
    pool: DbPool,
}

impl SqlFlowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn flow_status_as_str(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::Pending => "PENDING",
        FlowStatus::InProgress => "IN_PROGRESS",
        FlowStatus::Approved => "APPROVED",
        FlowStatus::Rejected => "REJECTED",
    }
}

pub(crate) fn parse_flow_status(raw: &str) -> FlowStatus {
    match raw {
        "IN_PROGRESS" => FlowStatus::InProgress,
        "APPROVED" => FlowStatus::Approved,
        "REJECTED" => FlowStatus::Rejected,
        _ => FlowStatus::Pending,
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("bad json in `{column}`: {e}")))
}

pub(crate) fn row_to_flow(
    row: &sqlx::sqlite::SqliteRow,
    approvals: Vec<ApprovalEntry>,
) -> Result<ApprovalFlow, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let expense_id: String = row.try_get("expense_id").map_err(decode)?;
    let company_id: String = row.try_get("company_id").map_err(decode)?;
    let steps: String = row.try_get("steps").map_err(decode)?;
    let sequence: String = row.try_get("sequence").map_err(decode)?;
    let required_approvers: String = row.try_get("required_approvers").map_err(decode)?;
    let percentage: i64 = row.try_get("percentage").map_err(decode)?;
    let sequential: bool = row.try_get("sequential").map_err(decode)?;
    let current_step: i64 = row.try_get("current_step").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let revision: i64 = row.try_get("revision").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(ApprovalFlow {
        id: FlowId(id),
        expense_id: ExpenseId(expense_id),
        company_id: CompanyId(company_id),
        steps: decode_json::<Vec<FlowStep>>("steps", &steps)?,
        sequence: decode_json::<Vec<UserId>>("sequence", &sequence)?,
        required_approvers: decode_json::<Vec<UserId>>("required_approvers", &required_approvers)?,
        percentage: u8::try_from(percentage)
            .map_err(|_| RepositoryError::Decode(format!("percentage {percentage} out of range")))?,
        sequential,
        current_step: u32::try_from(current_step).map_err(|_| {
            RepositoryError::Decode(format!("current_step {current_step} out of range"))
        })?,
        approvals,
        status: parse_flow_status(&status),
        revision,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(crate) async fn load_approvals<'e, E>(
    executor: E,
    flow_id: &FlowId,
) -> Result<Vec<ApprovalEntry>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows = sqlx::query(
        "SELECT approver_id, decision, comment, recorded_at
         FROM flow_approval WHERE flow_id = ? ORDER BY id ASC",
    )
    .bind(&flow_id.0)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
            let approver_id: String = row.try_get("approver_id").map_err(decode)?;
            let decision: String = row.try_get("decision").map_err(decode)?;
            let comment: Option<String> = row.try_get("comment").map_err(decode)?;
            let recorded_at: String = row.try_get("recorded_at").map_err(decode)?;
            Ok(ApprovalEntry {
                approver_id: UserId(approver_id),
                decision: parse_decision(&decision)?,
                comment,
                timestamp: parse_timestamp(&recorded_at)?,
            })
        })
        .collect()
}

pub(crate) const FLOW_COLUMNS: &str = "id, expense_id, company_id, steps, sequence,
        required_approvers, percentage, sequential, current_step, status, revision,
        created_at, updated_at";

#[async_trait]
impl FlowRepository for SqlFlowRepository {
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {FLOW_COLUMNS} FROM approval_flow WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => {
                let approvals = load_approvals(&self.pool, id).await?;
                Ok(Some(row_to_flow(row, approvals)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_expense_id(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow WHERE expense_id = ?"
        ))
        .bind(&expense_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => {
                let id: String =
                    row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let approvals = load_approvals(&self.pool, &FlowId(id)).await?;
                Ok(Some(row_to_flow(row, approvals)?))
            }
            None => Ok(None),
        }
    }

    async fn list_open_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        // json_each walks the sequence column; the NOT EXISTS clause drops
        // flows the approver already decided on.
        let rows = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow
             WHERE status IN ('PENDING', 'IN_PROGRESS')
               AND EXISTS (
                   SELECT 1 FROM json_each(approval_flow.sequence)
                   WHERE json_each.value = ?
               )
               AND NOT EXISTS (
                   SELECT 1 FROM flow_approval
                   WHERE flow_approval.flow_id = approval_flow.id
                     AND flow_approval.approver_id = ?
               )
             ORDER BY created_at ASC"
        ))
        .bind(&approver_id.0)
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut flows = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let approvals = load_approvals(&self.pool, &FlowId(id)).await?;
            flows.push(row_to_flow(row, approvals)?);
        }
        Ok(flows)
    }
}
