//! Authenticated session state.
//!
//! Holds the bearer token and identity issued by `auth/login` or
//! `auth/signup`. The HTTP transport reads the token on every request, so a
//! login takes effect for requests started after it.

use std::sync::RwLock;

use agromart_api_types::{AuthResponse, AuthUser, Role};
use tracing::info;

use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    /// Unknown when the token was supplied from configuration.
    pub user: Option<AuthUser>,
}

impl From<&AuthResponse> for Credentials {
    fn from(response: &AuthResponse) -> Self {
        Self {
            token: response.token.clone(),
            user: Some(response.user()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    credentials: RwLock<Option<Credentials>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session pre-authenticated with a configured token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            credentials: RwLock::new(Some(Credentials {
                token: token.into(),
                user: None,
            })),
        }
    }

    pub fn token(&self) -> Option<String> {
        rw_read(&self.credentials, SOURCE, "token")
            .as_ref()
            .map(|credentials| credentials.token.clone())
    }

    pub fn user(&self) -> Option<AuthUser> {
        rw_read(&self.credentials, SOURCE, "user")
            .as_ref()
            .and_then(|credentials| credentials.user.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|user| user.role)
    }

    pub fn is_authenticated(&self) -> bool {
        rw_read(&self.credentials, SOURCE, "is_authenticated").is_some()
    }

    pub fn set(&self, credentials: Credentials) {
        info!(
            user_id = credentials.user.as_ref().map(|user| user.id.as_str()),
            "Session credentials set"
        );
        *rw_write(&self.credentials, SOURCE, "set") = Some(credentials);
    }

    /// Forget the credentials; returns whether any were held.
    pub fn logout(&self) -> bool {
        let previous = rw_write(&self.credentials, SOURCE, "logout").take();
        if previous.is_some() {
            info!("Session cleared");
        }
        previous.is_some()
    }
}
