pub mod connection;
pub mod directory;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod workflow_store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use directory::SqlDirectory;
pub use fixtures::{seed_demo_directory, SeedDataset};
pub use repositories::{
    ExpenseRepository, FlowRepository, InMemoryWorkflowStore, RepositoryError, WorkflowStore,
};
pub use workflow_store::SqlWorkflowStore;
