pub mod candidate;
pub mod diagnostic;
pub mod execution;
pub mod prompt;
pub mod schema;
pub mod verdict;
