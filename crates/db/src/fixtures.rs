use sqlx::Row;

use crate::DbPool;

/// Identifiers of the seeded demo dataset: one company, an admin, a manager
/// with one report, and a CFO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedDataset {
    pub company_id: String,
    pub admin_id: String,
    pub manager_id: String,
    pub cfo_id: String,
    pub employee_id: String,
}

impl Default for SeedDataset {
    fn default() -> Self {
        Self {
            company_id: "co-demo".to_string(),
            admin_id: "u-demo-admin".to_string(),
            manager_id: "u-demo-manager".to_string(),
            cfo_id: "u-demo-cfo".to_string(),
            employee_id: "u-demo-employee".to_string(),
        }
    }
}

/// Seed the directory read model for local runs and tests. Idempotent:
/// existing rows are left untouched.
pub async fn seed_demo_directory(pool: &DbPool) -> Result<SeedDataset, sqlx::Error> {
    let dataset = SeedDataset::default();

    sqlx::query(
        "INSERT INTO company (id, name, country, currency)
         VALUES (?, 'Demo Manufacturing', 'US', 'USD')
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&dataset.company_id)
    .execute(pool)
    .await?;

    let users: [(&str, &str, &str, Option<&str>); 4] = [
        (dataset.admin_id.as_str(), "Dana Admin", "Admin", None),
        (dataset.manager_id.as_str(), "Morgan Manager", "Manager", None),
        (dataset.cfo_id.as_str(), "Casey Finance", "CFO", None),
        (dataset.employee_id.as_str(), "Evan Employee", "Employee", Some(dataset.manager_id.as_str())),
    ];

    for (id, name, role, manager_id) in users {
        sqlx::query(
            "INSERT INTO company_user (id, company_id, name, email, role, manager_id)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(&dataset.company_id)
        .bind(name)
        .bind(format!("{id}@demo.test"))
        .bind(role)
        .bind(manager_id)
        .execute(pool)
        .await?;
    }

    Ok(dataset)
}

/// Count the seeded users; used by smoke checks after bootstrap.
pub async fn verify_seed(pool: &DbPool, dataset: &SeedDataset) -> Result<bool, sqlx::Error> {
    let count = sqlx::query("SELECT COUNT(*) AS count FROM company_user WHERE company_id = ?")
        .bind(&dataset.company_id)
        .fetch_one(pool)
        .await?
        .get::<i64, _>("count");
    Ok(count >= 4)
}
