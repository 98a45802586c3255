use thiserror::Error;

pub const ACCESS_DENIED_MESSAGE: &str = "access denied or not found";
pub const CONFIGURATION_UNAVAILABLE_MESSAGE: &str = "configuration unavailable";

/// Outcomes that abort a request. Model-call failures are not represented
/// here: they degrade to a soft reply inside the runtime.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration unavailable: {0}")]
    ConfigurationUnavailable(String),
    /// Wrong bot type and missing permission are deliberately the same variant.
    #[error("access denied or not found")]
    AccessDenied,
    #[error("internal failure: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text placed in the `error` field of the response body.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
            Self::Forbidden { .. } => ACCESS_DENIED_MESSAGE,
            Self::ServiceUnavailable { .. } => CONFIGURATION_UNAVAILABLE_MESSAGE,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::InvalidInput(message) => Self::BadRequest { message, correlation_id },
            ApplicationError::ConfigurationUnavailable(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::AccessDenied => {
                Self::Forbidden { message: ACCESS_DENIED_MESSAGE.to_owned(), correlation_id }
            }
            ApplicationError::Internal(message) => Self::Internal { message, correlation_id },
        }
    }
}
