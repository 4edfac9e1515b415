//! Network collaborator seam.
//!
//! The cache core never speaks HTTP itself; it fetches resources and sends
//! writes through a [`Transport`]. `infra::http::HttpTransport` is the
//! production implementation, tests plug in scripted fakes.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::keys::CacheKey;
use super::mutation::MutationRequest;

/// Failure reported by the transport, surfaced unchanged to cache entries and
/// mutation callers.
///
/// `Clone` so a single in-flight failure can be handed to every caller that
/// attached to the same request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("server responded with status {status}: {detail}")]
    Status { status: u16, detail: String },
    /// The request never produced a response.
    #[error("network failure: {detail}")]
    Network { detail: String },
    /// The response body could not be decoded.
    #[error("undecodable response: {detail}")]
    Decode { detail: String },
    /// No request could be built for the key or mutation.
    #[error("invalid request: {detail}")]
    Request { detail: String },
}

impl TransportError {
    pub fn status(status: u16, detail: impl Into<String>) -> Self {
        Self::Status {
            status,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }

    pub fn request(detail: impl Into<String>) -> Self {
        Self::Request {
            detail: detail.into(),
        }
    }

    /// HTTP status, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } | Self::Request { .. } => None,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Status { detail, .. }
            | Self::Network { detail }
            | Self::Decode { detail }
            | Self::Request { detail } => detail,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status_code(), Some(401 | 403))
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch the resource identified by `key`.
    async fn fetch_resource(&self, key: &CacheKey) -> Result<Value, TransportError>;

    /// Perform one write against the backend.
    async fn send_mutation(&self, request: &MutationRequest) -> Result<Value, TransportError>;
}
