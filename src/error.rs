use thiserror::Error;

/// Errors from calls against the Allscreenshots REST API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode API response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status of the vendor response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

#[derive(Error, Debug)]
#[error("webhook registration failed: {0}")]
pub struct RegistrationFailed(pub String);

/// A delivery the receiver could not interpret. Returned to the caller, never queued.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("payload is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unknown operation '{operation}' for resource '{resource}'")]
    UnknownOperation { resource: String, operation: String },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("job {job_id} is not completed. Current status: {status}")]
    JobNotCompleted { job_id: String, status: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize subscriptions: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting: {0}")]
    Invalid(String),
}
