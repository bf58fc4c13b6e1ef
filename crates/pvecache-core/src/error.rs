use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Failure kinds surfaced by cache rebuilds and lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A source fetch failed; the host or instance is likely down.
    #[error("error retrieving {target}: {reason}, possibly down?")]
    UpstreamUnreachable { target: String, reason: String },

    /// Node, instance, or device key absent from the cache or raw config.
    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to parse {what} '{input}': {reason}")]
    Parse {
        what: &'static str,
        input: String,
        reason: String,
    },

    /// Sub-function PCI assignment. Deliberately left unimplemented.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CacheError {
    pub fn upstream(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnreachable {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(what: &'static str, input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what,
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
