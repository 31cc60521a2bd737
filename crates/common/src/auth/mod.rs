//! Tenant context extraction
//!
//! Authentication and organization resolution live outside this system.
//! By the time a request reaches the API, the upstream layer has already
//! resolved the caller's organization and forwarded it in the
//! `X-Organization-ID` header. This module turns that header into a typed
//! [`TenantContext`] and rejects requests that arrive without one.

use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the resolved organization id
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Tenant identity available to handlers
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Organization that owns every resource touched by the request
    pub organization_id: String,

    /// Request ID for tracing
    pub request_id: String,
}

impl TenantContext {
    /// Build a context directly (background jobs, tests)
    pub fn new(organization_id: impl Into<String>) -> Result<Self> {
        let organization_id = organization_id.into();
        if organization_id.trim().is_empty() {
            return Err(AppError::Unauthorized {
                message: "Organization id must not be empty".to_string(),
            });
        }

        Ok(Self {
            organization_id,
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let organization_id = parts
            .headers
            .get(ORGANIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing or empty X-Organization-ID header".to_string(),
            })?;

        Ok(Self {
            organization_id,
            request_id,
        })
    }
}
