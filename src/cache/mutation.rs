//! Mutation executor.
//!
//! Performs one write through the transport and, only on success, publishes
//! the invalidation computed from the mutation and its response.

use std::fmt;
use std::sync::Arc;

use agromart_api_types::{
    LandUpdate, LoginRequest, NewLand, NewOrder, ProductUpdate, ProfileUpdate, SignupRequest,
};
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::consumer::InvalidationReport;
use super::endpoints;
use super::transport::{Transport, TransportError};
use super::trigger::InvalidationTrigger;

pub(crate) const METRIC_MUTATION_TOTAL: &str = "agromart_mutation_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateLand,
    UpdateLand,
    DeleteLand,
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    PlaceOrder,
    UpdateProfile,
    Login,
    Signup,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateLand => "createLand",
            Self::UpdateLand => "updateLand",
            Self::DeleteLand => "deleteLand",
            Self::CreateProduct => "createProduct",
            Self::UpdateProduct => "updateProduct",
            Self::DeleteProduct => "deleteProduct",
            Self::PlaceOrder => "placeOrder",
            Self::UpdateProfile => "updateProfile",
            Self::Login => "login",
            Self::Signup => "signup",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write against the backend, with the identifiers its invalidation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateLand {
        owner_id: String,
        land: NewLand,
    },
    UpdateLand {
        land_id: String,
        owner_id: String,
        updates: LandUpdate,
    },
    DeleteLand {
        land_id: String,
        owner_id: String,
    },
    CreateProduct(ProductUpdate),
    UpdateProduct {
        product_id: String,
        updates: ProductUpdate,
    },
    DeleteProduct {
        product_id: String,
    },
    PlaceOrder(NewOrder),
    UpdateProfile {
        user_id: String,
        updates: ProfileUpdate,
    },
    Login(LoginRequest),
    Signup(SignupRequest),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::CreateLand { .. } => MutationKind::CreateLand,
            Self::UpdateLand { .. } => MutationKind::UpdateLand,
            Self::DeleteLand { .. } => MutationKind::DeleteLand,
            Self::CreateProduct(_) => MutationKind::CreateProduct,
            Self::UpdateProduct { .. } => MutationKind::UpdateProduct,
            Self::DeleteProduct { .. } => MutationKind::DeleteProduct,
            Self::PlaceOrder(_) => MutationKind::PlaceOrder,
            Self::UpdateProfile { .. } => MutationKind::UpdateProfile,
            Self::Login(_) => MutationKind::Login,
            Self::Signup(_) => MutationKind::Signup,
        }
    }

    /// Transport-level form: kind, path target and JSON body.
    pub fn to_request(&self) -> Result<MutationRequest, MutationError> {
        let kind = self.kind();
        let (target, body) = match self {
            Self::CreateLand { land, .. } => (None, Some(encode(kind, land)?)),
            Self::UpdateLand {
                land_id, updates, ..
            } => (Some(land_id.clone()), Some(encode(kind, updates)?)),
            Self::DeleteLand { land_id, .. } => (Some(land_id.clone()), None),
            Self::CreateProduct(product) => (None, Some(encode(kind, product)?)),
            Self::UpdateProduct {
                product_id,
                updates,
            } => (Some(product_id.clone()), Some(encode(kind, updates)?)),
            Self::DeleteProduct { product_id } => (Some(product_id.clone()), None),
            Self::PlaceOrder(order) => (None, Some(encode(kind, order)?)),
            Self::UpdateProfile { user_id, updates } => {
                (Some(user_id.clone()), Some(encode(kind, updates)?))
            }
            Self::Login(request) => (None, Some(encode(kind, request)?)),
            Self::Signup(request) => (None, Some(encode(kind, request)?)),
        };

        Ok(MutationRequest { kind, target, body })
    }
}

fn encode<T: Serialize>(kind: MutationKind, body: &T) -> Result<Value, MutationError> {
    serde_json::to_value(body).map_err(|source| MutationError::Encode { kind, source })
}

/// What the transport sends for one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub kind: MutationKind,
    /// Identifier appended to the route (`lands/{target}`), when the route
    /// addresses one resource.
    pub target: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("failed to encode {kind} request body")]
    Encode {
        kind: MutationKind,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MutationError {
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(error) => Some(error),
            Self::Encode { .. } => None,
        }
    }
}

/// Successful mutation: the server response plus what it invalidated.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub response: Value,
    pub invalidation: Option<InvalidationReport>,
}

#[derive(Clone)]
pub struct MutationExecutor {
    transport: Arc<dyn Transport>,
    trigger: Arc<InvalidationTrigger>,
}

impl MutationExecutor {
    pub fn new(transport: Arc<dyn Transport>, trigger: Arc<InvalidationTrigger>) -> Self {
        Self { transport, trigger }
    }

    /// Send `mutation` once. Failures are returned unchanged and invalidate
    /// nothing; success invalidates before this returns, refetches run after.
    #[instrument(skip(self, mutation), fields(kind = %mutation.kind()))]
    pub async fn mutate(&self, mutation: &Mutation) -> Result<MutationOutcome, MutationError> {
        let kind = mutation.kind();
        let request = mutation.to_request()?;

        let response = match self.transport.send_mutation(&request).await {
            Ok(response) => response,
            Err(error) => {
                counter!(METRIC_MUTATION_TOTAL, "kind" => kind.as_str(), "result" => "error")
                    .increment(1);
                warn!(
                    status = ?error.status_code(),
                    error = %error,
                    "Mutation failed; nothing invalidated"
                );
                return Err(error.into());
            }
        };
        counter!(METRIC_MUTATION_TOTAL, "kind" => kind.as_str(), "result" => "ok").increment(1);

        let tags = endpoints::invalidated_tags(mutation, &response);
        let invalidation = self.trigger.mutation_succeeded(kind, tags);
        if let Some(report) = &invalidation {
            info!(
                invalidated = report.invalidated.len(),
                refetching = report.refetching.len(),
                "Mutation applied"
            );
        }

        Ok(MutationOutcome {
            response,
            invalidation,
        })
    }
}
