use async_trait::async_trait;
use sqlx::Row;

use outlay_core::directory::{Directory, DirectoryError};
use outlay_core::domain::role::Role;
use outlay_core::domain::user::{CompanyId, CompanyRecord, EmployeeRecord, UserId};

use crate::DbPool;

/// Directory view over the seeded `company` / `company_user` read model.
/// Strictly read-only from the workflow engine's perspective.
pub struct SqlDirectory {
    pool: DbPool,
}

impl SqlDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<EmployeeRecord, DirectoryError> {
    let decode = |e: sqlx::Error| DirectoryError::Lookup(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let company_id: String = row.try_get("company_id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let email: String = row.try_get("email").map_err(decode)?;
    let role: String = row.try_get("role").map_err(decode)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(decode)?;

    Ok(EmployeeRecord {
        id: UserId(id),
        company_id: CompanyId(company_id),
        name,
        email,
        role: Role::parse(&role)
            .ok_or_else(|| DirectoryError::Lookup(format!("unknown role `{role}`")))?,
        manager_id: manager_id.map(UserId),
    })
}

#[async_trait]
impl Directory for SqlDirectory {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, email, role, manager_id
             FROM company_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryError::Lookup(e.to_string()))?;

        match row {
            Some(ref row) => Ok(Some(row_to_employee(row)?)),
            None => Ok(None),
        }
    }

    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, DirectoryError> {
        let employee = self
            .find_employee(id)
            .await?
            .ok_or_else(|| DirectoryError::UserNotFound(id.0.clone()))?;
        Ok(employee.manager_id)
    }

    async fn approver_pool(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
    ) -> Result<Vec<EmployeeRecord>, DirectoryError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        // Role list is small and closed; an IN clause over bound names keeps
        // the query planner on the (company_id, role) index.
        let placeholders = vec!["?"; roles.len()].join(", ");
        let sql = format!(
            "SELECT id, company_id, name, email, role, manager_id
             FROM company_user
             WHERE company_id = ? AND role IN ({placeholders})
             ORDER BY rowid ASC"
        );
        let mut query = sqlx::query(&sql).bind(&company_id.0);
        for role in roles {
            query = query.bind(role.as_str());
        }

        let rows =
            query.fetch_all(&self.pool).await.map_err(|e| DirectoryError::Lookup(e.to_string()))?;
        rows.iter().map(row_to_employee).collect()
    }

    async fn company(&self, id: &CompanyId) -> Result<Option<CompanyRecord>, DirectoryError> {
        let row = sqlx::query("SELECT id, name, country, currency FROM company WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Lookup(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| DirectoryError::Lookup(e.to_string());
        Ok(Some(CompanyRecord {
            id: CompanyId(row.try_get("id").map_err(decode)?),
            name: row.try_get("name").map_err(decode)?,
            country: row.try_get("country").map_err(decode)?,
            currency: row.try_get("currency").map_err(decode)?,
        }))
    }
}
