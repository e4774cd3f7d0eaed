//! Grafana Cloud (grafana.com) stack lookup.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;

use super::{decode, RestClient};
use crate::error::{ApiError, RequestError};

const API_NAME: &str = "Grafana Cloud API";

/// The parts of a Grafana Cloud stack the provider needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    /// Numeric stack id, used as the tenant id.
    pub id: i64,
    /// Stack slug.
    #[serde(default)]
    pub slug: String,
    /// Region the stack lives in.
    #[serde(default)]
    pub region_slug: String,
    /// Cluster the stack lives in.
    #[serde(default)]
    pub cluster_slug: String,
    /// Creation time; selects the endpoint for regions with a cutover.
    pub created_at: DateTime<Utc>,
}

/// Why a stack lookup failed.
#[derive(Debug, Error)]
pub enum StackLookupError {
    /// The stack does not exist or is not visible to the token.
    #[error("stack {0:?} not found")]
    NotFound(String),

    /// The API answered with a 5xx status.
    #[error("server error")]
    Server,

    /// Any other failure.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Client for the Grafana Cloud instances API.
#[derive(Clone)]
pub struct GcomClient {
    rest: RestClient,
    api_url: String,
    token: String,
}

impl fmt::Debug for GcomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcomClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl GcomClient {
    /// Create a client for `api_url`, e.g. `https://grafana.com`.
    pub fn new(rest: RestClient, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rest,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    /// Look up a stack by slug or numeric id.
    pub async fn get_stack(&self, stack: &str) -> Result<Stack, StackLookupError> {
        let auth = [("Authorization".to_string(), format!("Bearer {}", self.token))];
        let response = self
            .rest
            .execute(
                API_NAME,
                Method::GET,
                &self.api_url,
                &["api", "instances", stack],
                &auth,
                None,
            )
            .await;

        let response = match response {
            Ok(response) => response,
            Err(ApiError::NotFound) => return Err(StackLookupError::NotFound(stack.to_string())),
            Err(ApiError::Status { status, .. }) if status >= 500 => {
                return Err(StackLookupError::Server)
            }
            Err(err) => return Err(RequestError::new("failed to get stack", err).into()),
        };

        decode(&response)
            .map_err(|e| {
                RequestError::new("failed to get stack", e)
                    .with_response(&response.body)
                    .into()
            })
    }
}
