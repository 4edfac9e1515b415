use std::sync::Arc;

use agromart_api_types::{AuthResponse, AuthUser, LoginRequest, SignupRequest};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::cache::{Mutation, MutationError, QueryClient};
use crate::infra::session::{Credentials, Session};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("failed to decode auth response")]
    Decode(#[source] serde_json::Error),
}

/// Login, signup and logout against the shared session.
#[derive(Clone)]
pub struct AuthService {
    client: QueryClient,
    session: Arc<Session>,
}

impl AuthService {
    pub fn new(client: QueryClient, session: Arc<Session>) -> Self {
        Self { client, session }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        self.authenticate(Mutation::Login(request)).await
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, AuthError> {
        self.authenticate(Mutation::Signup(request)).await
    }

    /// Clear credentials and every cached resource fetched with them.
    pub fn logout(&self) -> bool {
        let cleared = self.session.logout();
        self.client.reset();
        cleared
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.session.user()
    }

    async fn authenticate(&self, mutation: Mutation) -> Result<AuthResponse, AuthError> {
        let response = self.client.mutate_value(&mutation).await?;
        let auth = AuthResponse::deserialize(&response).map_err(AuthError::Decode)?;

        self.session.set(Credentials::from(&auth));
        info!(user_id = %auth.user_id, role = ?auth.role, "Authenticated");
        Ok(auth)
    }
}
