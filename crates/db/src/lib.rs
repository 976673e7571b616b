pub mod connection;
pub mod executor;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod rows;
pub mod schema;
pub mod targets;

pub use connection::{connect, connect_target, connect_with_settings, DbPool};
pub use executor::SqliteExecutionAdapter;
pub use fixtures::{SeedResult, TableSeedInfo, UniversityDataset, VerificationResult};
pub use repositories::{
    InMemoryPromptRepository, PromptRepository, RepositoryError, SqlPromptRepository,
};
pub use schema::{SchemaCache, SqliteSchemaDescriptor};
pub use targets::TargetRegistry;
