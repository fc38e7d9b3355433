//! Error taxonomy for the CalDAV core.
//!
//! Four leaf kinds plus a `Conflict`: parse errors, HTTP errors (4xx/5xx other
//! than 412/404, which are modeled as domain outcomes), network errors, and
//! ETag conflicts. An invalid sync token is deliberately *not* an error
//! variant here — it is a control signal, see [`crate::caldav::types::SyncOutcome`].

use thiserror::Error;

/// The public result type for every protocol-machine operation.
pub type CalDavResult<T> = Result<T, CalDavError>;

#[derive(Debug, Error)]
pub enum CalDavError {
    /// Malformed iCalendar or WebDAV multistatus XML.
    #[error("parse error{}: {message}", property.as_deref().map(|p| format!(" in {p}")).unwrap_or_default())]
    Parse {
        message: String,
        property: Option<String>,
    },

    /// Any 4xx/5xx response other than 412 (conflict) or 404 (modeled as a
    /// domain outcome by the caller, e.g. "already deleted").
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure: DNS, TCP, TLS, or timeout.
    #[error("network error: {source}")]
    Network {
        #[source]
        source: anyhow::Error,
    },

    /// A mutation was rejected with 412 Precondition Failed.
    #[error("conflict: resource changed on the server")]
    Conflict { current_etag: Option<String> },
}

impl CalDavError {
    pub fn parse(message: impl Into<String>) -> Self {
        CalDavError::Parse {
            message: message.into(),
            property: None,
        }
    }

    pub fn parse_at(property: impl Into<String>, message: impl Into<String>) -> Self {
        CalDavError::Parse {
            message: message.into(),
            property: Some(property.into()),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        CalDavError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(source: anyhow::Error) -> Self {
        CalDavError::Network { source }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CalDavError::Conflict { .. })
    }
}

impl From<anyhow::Error> for CalDavError {
    fn from(source: anyhow::Error) -> Self {
        CalDavError::Network { source }
    }
}
