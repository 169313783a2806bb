//! Per-request caller context.
//!
//! Identity is established by the upstream auth layer, which forwards the
//! authenticated user as `x-user-id` / `x-user-role` headers together with the
//! browser session in `x-session-id`. Core operations take a [`RequestContext`]
//! explicitly instead of reading ambient request state.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::tracing::RequestId;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UserRole {
    Customer,
    Influencer,
    Admin,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub user_id: Uuid,
    pub role: UserRole,
    /// Browser session; scopes the buy-now staging slot
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            request_id: crate::tracing::current_request_id().unwrap_or_default(),
            user_id,
            role,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }

    pub fn require_influencer(&self) -> Result<(), ServiceError> {
        if self.role == UserRole::Influencer {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Influencer access required".to_string(),
            ))
        }
    }

    pub fn session_id(&self) -> Result<&str, ServiceError> {
        self.session_id
            .as_deref()
            .ok_or_else(|| ServiceError::MissingParameters("session id".to_string()))
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing user identity".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ServiceError::Unauthorized("Malformed user identity".to_string()))?;

        let role = match header_str(parts, USER_ROLE_HEADER) {
            Some(raw) => raw
                .parse::<UserRole>()
                .map_err(|_| ServiceError::Unauthorized(format!("Unknown role: {}", raw)))?,
            None => UserRole::Customer,
        };

        let request_id = parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .or_else(crate::tracing::current_request_id)
            .unwrap_or_default();

        Ok(RequestContext {
            request_id,
            user_id,
            role,
            session_id: header_str(parts, SESSION_ID_HEADER).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<RequestContext, ServiceError> {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_identity_role_and_session() {
        let user_id = Uuid::new_v4();
        let ctx = extract(
            Request::builder()
                .header(USER_ID_HEADER, user_id.to_string())
                .header(USER_ROLE_HEADER, "Influencer")
                .header(SESSION_ID_HEADER, "sess-1")
                .body(())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.role, UserRole::Influencer);
        assert_eq!(ctx.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn role_defaults_to_customer() {
        let ctx = extract(
            Request::builder()
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .body(())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(ctx.role, UserRole::Customer);
        assert!(ctx.session_id.is_none());
    }

    #[tokio::test]
    async fn missing_or_malformed_user_is_unauthorized() {
        let missing = extract(Request::builder().body(()).unwrap()).await;
        assert_matches!(missing, Err(ServiceError::Unauthorized(_)));

        let malformed = extract(
            Request::builder()
                .header(USER_ID_HEADER, "not-a-uuid")
                .body(())
                .unwrap(),
        )
        .await;
        assert_matches!(malformed, Err(ServiceError::Unauthorized(_)));
    }

    #[test]
    fn role_guards() {
        let admin = RequestContext::new(Uuid::new_v4(), UserRole::Admin);
        assert!(admin.require_admin().is_ok());
        assert_matches!(admin.require_influencer(), Err(ServiceError::Forbidden(_)));

        let customer = RequestContext::new(Uuid::new_v4(), UserRole::Customer);
        assert_matches!(customer.require_admin(), Err(ServiceError::Forbidden(_)));
        assert_matches!(customer.session_id(), Err(ServiceError::MissingParameters(_)));
    }
}
