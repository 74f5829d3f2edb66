//! Bearer-token authentication.
//!
//! Tokens are issued elsewhere; the service only maps them to user emails via
//! `[auth.tokens]` and looks the email up in the user directory.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::{ApiError, SharedState};
use crate::directory::User;
use crate::fields::{Module, Permission};

/// The authenticated, active caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    /// Fail with 403 unless the caller holds `perm` on `module`.
    pub fn require(&self, module: Module, perm: Permission) -> Result<(), ApiError> {
        if self.0.can(module, perm) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "{} lacks {} permission on {}",
                self.0.email,
                perm.as_str(),
                module.as_str()
            )))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        let email = state
            .config
            .email_for_token(token)
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?
            .to_string();
        let user = state
            .read(|db| db.user_by_email(&email).cloned())?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::unauthorized("No active account for this token"))?;
        Ok(CurrentUser(user))
    }
}
