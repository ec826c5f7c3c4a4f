use thiserror::Error;

/// Unified error type for the Bakery daemon.
#[derive(Error, Debug)]
pub enum BakeryError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ExhaustedRange(String),

    #[error("Upstream connection failed: {0}")]
    UpstreamUnavailable(String),

    #[error("Slice is not active")]
    SliceNotRunning,

    #[error("{0}")]
    Internal(String),
}

impl BakeryError {
    /// Map to an HTTP status code, per the error-handling design table.
    pub fn status_code(&self) -> u16 {
        match self {
            BakeryError::InvalidArgument(_) => 400,
            BakeryError::NotFound(_) => 404,
            BakeryError::Conflict(msg) => {
                // Slug conflicts are reported as 409; all other uniqueness
                // violations (host, port, route host, key) as 400.
                if msg.to_lowercase().contains("slug") {
                    409
                } else {
                    400
                }
            }
            BakeryError::ExhaustedRange(_) => 400,
            BakeryError::UpstreamUnavailable(_) => 502,
            BakeryError::SliceNotRunning => 503,
            BakeryError::Internal(_) => 400,
        }
    }

    /// `{"error": string}` body, as mandated for every failure response.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
