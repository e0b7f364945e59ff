use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use outlay_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, HistoryEntry};
use outlay_core::domain::flow::{Decision, FlowId};
use outlay_core::domain::user::{CompanyId, UserId};

use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn expense_status_as_str(status: ExpenseStatus) -> &'static str {
    match status {
        ExpenseStatus::Pending => "PENDING",
        ExpenseStatus::UnderReview => "UNDER_REVIEW",
        ExpenseStatus::Approved => "APPROVED",
        ExpenseStatus::Rejected => "REJECTED",
    }
}

pub(crate) fn parse_expense_status(raw: &str) -> ExpenseStatus {
    match raw {
        "UNDER_REVIEW" => ExpenseStatus::UnderReview,
        "APPROVED" => ExpenseStatus::Approved,
        "REJECTED" => ExpenseStatus::Rejected,
        _ => ExpenseStatus::Pending,
    }
}

pub(crate) fn decision_as_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Approved => "APPROVED",
        Decision::Rejected => "REJECTED",
    }
}

pub(crate) fn parse_decision(raw: &str) -> Result<Decision, RepositoryError> {
    match raw {
        "APPROVED" => Ok(Decision::Approved),
        "REJECTED" => Ok(Decision::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown decision `{other}`"))),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|e| RepositoryError::Decode(format!("bad amount `{raw}`: {e}")))
}

fn row_to_expense(
    row: &sqlx::sqlite::SqliteRow,
    history: Vec<HistoryEntry>,
) -> Result<Expense, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let employee_id: String = row.try_get("employee_id").map_err(decode)?;
    let company_id: String = row.try_get("company_id").map_err(decode)?;
    let amount: String = row.try_get("amount").map_err(decode)?;
    let currency: String = row.try_get("currency").map_err(decode)?;
    let converted_amount: String = row.try_get("converted_amount").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let description: String = row.try_get("description").map_err(decode)?;
    let expense_date: String = row.try_get("expense_date").map_err(decode)?;
    let receipt_url: Option<String> = row.try_get("receipt_url").map_err(decode)?;
    let approval_flow_id: Option<String> = row.try_get("approval_flow_id").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(Expense {
        id: ExpenseId(id),
        employee_id: UserId(employee_id),
        company_id: CompanyId(company_id),
        amount: parse_amount(&amount)?,
        currency,
        converted_amount: parse_amount(&converted_amount)?,
        category,
        description,
        date: NaiveDate::parse_from_str(&expense_date, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("bad date `{expense_date}`: {e}")))?,
        receipt_url,
        approval_flow_id: approval_flow_id.map(FlowId),
        status: parse_expense_status(&status),
        approval_history: history,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(crate) async fn load_history<'e, E>(
    executor: E,
    expense_id: &ExpenseId,
) -> Result<Vec<HistoryEntry>, RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows = sqlx::query(
        "SELECT approver_id, decision, comment, recorded_at
         FROM expense_history WHERE expense_id = ? ORDER BY id ASC",
    )
    .bind(&expense_id.0)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
            let approver_id: String = row.try_get("approver_id").map_err(decode)?;
            let decision: String = row.try_get("decision").map_err(decode)?;
            let comment: Option<String> = row.try_get("comment").map_err(decode)?;
            let recorded_at: String = row.try_get("recorded_at").map_err(decode)?;
            Ok(HistoryEntry {
                approver_id: UserId(approver_id),
                decision: parse_decision(&decision)?,
                comment,
                timestamp: parse_timestamp(&recorded_at)?,
            })
        })
        .collect()
}

const EXPENSE_COLUMNS: &str = "id, employee_id, company_id, amount, currency, converted_amount,
        category, description, expense_date, receipt_url, approval_flow_id, status,
        created_at, updated_at";

#[async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => {
                let history = load_history(&self.pool, id).await?;
                Ok(Some(row_to_expense(row, history)?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_employee(
        &self,
        employee_id: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE employee_id = ? ORDER BY expense_date DESC, created_at DESC"
        ))
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut expenses = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let history = load_history(&self.pool, &ExpenseId(id)).await?;
            expenses.push(row_to_expense(row, history)?);
        }
        Ok(expenses)
    }
}
