//! Domain model, SQL heuristics, configuration and port traits shared by the
//! text-to-SQL pipeline crates. Nothing in here performs I/O.

pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod sql;

pub use domain::candidate::{Candidate, CandidateSource};
pub use domain::diagnostic::{DiagnosticEntry, DiagnosticEvent, DiagnosticHistory};
pub use domain::execution::{ExecutionError, ExecutionErrorClass, ExecutionOutcome, ResultSet};
pub use domain::prompt::{CustomerId, PromptKind, PromptTemplate};
pub use domain::schema::{
    ColumnInfo, ConnectionRef, ForeignKey, KnownIdentifiers, SchemaDescription, TableInfo,
};
pub use domain::verdict::{Rejection, RejectionReason, ValidationVerdict};
pub use errors::{
    ApplicationError, ConnectivityError, DomainError, InterfaceError, PromptStoreError,
};
pub use ports::{ExecutionAdapter, PromptStore, SchemaDescriptor};
pub use sql::{HeuristicRepairer, Repair};
