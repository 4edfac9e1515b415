//! REST transport for the query cache.
//!
//! Maps cache keys and mutations onto the Agromart backend routes and turns
//! responses into JSON values or [`TransportError`]s.

use std::sync::Arc;
use std::time::Instant;

use agromart_api_types::ErrorBody;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheKey, MutationKind, MutationRequest, ResourceKind, Transport, TransportError};
use crate::config::ApiSettings;

use super::error::InfraError;
use super::session::Session;

pub struct HttpTransport {
    client: Client,
    base: Url,
    session: Arc<Session>,
}

impl HttpTransport {
    pub fn new(settings: &ApiSettings, session: Arc<Session>) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;
        if settings.base_url.cannot_be_a_base() {
            return Err(InfraError::configuration(format!(
                "api base url `{}` cannot carry a path",
                settings.base_url
            )));
        }
        Ok(Self {
            client,
            base: settings.base_url.clone(),
            session,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("agromart/", env!("CARGO_PKG_VERSION"))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Append `segments` to the base path, escaping each one.
    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::request(format!("base url `{}` has no path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resource_url(&self, key: &CacheKey) -> Result<Url, TransportError> {
        let user = || {
            key.user_id()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| TransportError::request(format!("{key} requires a user id")))
        };

        match key.kind() {
            ResourceKind::Lands => self.url(&["lands"]),
            ResourceKind::UserLands => self.url(&["lands", "user", user()?]),
            ResourceKind::Products => {
                let mut url = self.url(&["store", "products"])?;
                if let Some(category) = key.category() {
                    url.query_pairs_mut()
                        .append_pair("category", category.as_str());
                }
                Ok(url)
            }
            ResourceKind::UserOrders => self.url(&["store", "orders", "user"]),
            ResourceKind::AllOrders => self.url(&["store", "orders", "all"]),
            ResourceKind::Profile => self.url(&["profile", user()?]),
        }
    }

    fn mutation_route(&self, request: &MutationRequest) -> Result<(Method, Url), TransportError> {
        let target = || {
            request
                .target
                .as_deref()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    TransportError::request(format!("{} requires a target id", request.kind))
                })
        };

        let route = match request.kind {
            MutationKind::CreateLand => (Method::POST, self.url(&["lands"])?),
            MutationKind::UpdateLand => (Method::PUT, self.url(&["lands", target()?])?),
            MutationKind::DeleteLand => (Method::DELETE, self.url(&["lands", target()?])?),
            MutationKind::CreateProduct => {
                (Method::POST, self.url(&["store", "products", "admin"])?)
            }
            MutationKind::UpdateProduct => (
                Method::PUT,
                self.url(&["store", "products", "admin", target()?])?,
            ),
            MutationKind::DeleteProduct => (
                Method::DELETE,
                self.url(&["store", "products", "admin", target()?])?,
            ),
            MutationKind::PlaceOrder => (Method::POST, self.url(&["store", "orders"])?),
            MutationKind::UpdateProfile => (Method::PUT, self.url(&["profile", target()?])?),
            MutationKind::Login => (Method::POST, self.url(&["auth", "login"])?),
            MutationKind::Signup => (Method::POST, self.url(&["auth", "signup"])?),
        };
        Ok(route)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Value, TransportError> {
        let request = builder
            .build()
            .map_err(|err| TransportError::request(err.to_string()))?;
        let method = request.method().clone();
        let url = request.url().clone();
        let started_at = Instant::now();

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| network_error(&err))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|err| network_error(&err))?;

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Backend request completed"
        );

        handle(status, &bytes)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_resource(&self, key: &CacheKey) -> Result<Value, TransportError> {
        let url = self.resource_url(key)?;
        self.execute(self.request(Method::GET, url)).await
    }

    async fn send_mutation(&self, request: &MutationRequest) -> Result<Value, TransportError> {
        let (method, url) = self.mutation_route(request)?;
        let mut builder = self.request(method, url);
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }
}

fn network_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::network(format!("request timed out: {err}"))
    } else {
        TransportError::network(err.to_string())
    }
}

/// Decode a response body; empty success bodies (including 204) yield `null`.
fn handle(status: StatusCode, bytes: &[u8]) -> Result<Value, TransportError> {
    if !status.is_success() {
        return Err(TransportError::status(status.as_u16(), error_detail(status, bytes)));
    }
    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|err| TransportError::decode(format!("failed to parse body: {err}")))
}

/// Prefer the backend's `{"detail": ...}`, then the raw text, then the
/// status reason.
fn error_detail(status: StatusCode, bytes: &[u8]) -> String {
    if let Ok(body) = serde_json::from_slice::<ErrorBody>(bytes) {
        return body.detail;
    }
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if !text.is_empty() {
        return text;
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
