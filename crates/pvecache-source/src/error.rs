use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("HTTP request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("invalid response from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Reported by non-HTTP sources (and the test mock).
    #[error("{0}")]
    Unavailable(String),
}
