use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("unknown prompt kind `{0}`")]
    UnknownPromptKind(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Schema or connection unavailable before the repair loop starts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("no target database is registered under `{0}`")]
    UnknownConnection(String),
    #[error("target database `{connection}` is unreachable: {message}")]
    Unreachable { connection: String, message: String },
    #[error("schema introspection failed for `{connection}`: {message}")]
    Introspection { connection: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PromptStoreError {
    #[error("prompt store unavailable: {0}")]
    Unavailable(String),
    #[error("stored prompt is malformed: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("no safe, executable SQL was produced within {rounds} round(s)")]
    BudgetExhausted { rounds: u32 },
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unprocessable { .. } => {
                "No safe, executable SQL could be produced for this question. Try rephrasing it."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Unprocessable { .. } => "unprocessable",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            error @ ApplicationError::BudgetExhausted { .. } => {
                Self::Unprocessable { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Connectivity(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, ConnectivityError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::EmptyQuestion).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn exhausted_budget_maps_to_unprocessable() {
        let interface = ApplicationError::BudgetExhausted { rounds: 3 }.into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Unprocessable { ref message, .. } if message.contains("3 round")));
        assert_eq!(interface.kind(), "unprocessable");
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn connectivity_error_maps_to_service_unavailable() {
        let interface = ApplicationError::from(ConnectivityError::UnknownConnection("warehouse".into()))
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing llm api key".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
