use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::role::Role;
use crate::domain::user::{CompanyId, CompanyRecord, EmployeeRecord, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("company `{0}` not found")]
    CompanyNotFound(String),
    #[error("directory lookup failed: {0}")]
    Lookup(String),
}

/// Read-only view of the user/company directory. The workflow engine only
/// ever reads: employee→manager mapping, elevated-role membership, and the
/// company base currency.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, DirectoryError>;

    async fn manager_of(&self, id: &UserId) -> Result<Option<UserId>, DirectoryError>;

    /// Pool members holding any of `roles` within the company, in a stable
    /// directory order.
    async fn approver_pool(
        &self,
        company_id: &CompanyId,
        roles: &[Role],
    ) -> Result<Vec<EmployeeRecord>, DirectoryError>;

    async fn company(&self, id: &CompanyId) -> Result<Option<CompanyRecord>, DirectoryError>;
}

/// Directory double backed by plain maps; insertion order of users is the
/// pool order.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    companies: HashMap<String, CompanyRecord>,
    users: Vec<EmployeeRecord>,
}

impl InMemoryDirectory {
    pub fn with_company(mut self, company: CompanyRecord) -> Self {
        self.companies.insert(company.id.0.clone(), company);
        self
    }

    pub fn with_user(mut self, user: EmployeeRecord) -> Self {
        self.users.push(user);
        self
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_employee(&self, id: &UserId) -> Result<Option<EmployeeRecord>, DirectoryError> {
        Ok(self.users.iter().find(|user| &user.id == id).cloned())
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
        Ok(self
            .users
            .iter()
            .filter(|user| &user.company_id == company_id && roles.contains(&user.role))
            .cloned()
            .collect())
    }

    async fn company(&self, id: &CompanyId) -> Result<Option<CompanyRecord>, DirectoryError> {
        Ok(self.companies.get(&id.0).cloned())
    }
}
