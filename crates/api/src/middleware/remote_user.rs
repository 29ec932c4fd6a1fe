//! Identity extractor for requests that arrive through the auth proxy.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the authenticated user name, set by the trusted proxy.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

/// The acting user of a mutating request.
///
/// ```ignore
/// async fn my_handler(user: RemoteUser) -> AppResult<Json<()>> {
///     tracing::info!(user = %user.name, admin = user.is_admin, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteUser {
    pub name: String,
    /// Member of `ADMIN_USERS`.
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for RemoteUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(REMOTE_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing X-Remote-User header".into()))?;

        Ok(RemoteUser {
            is_admin: state.config.is_admin(name),
            name: name.to_string(),
        })
    }
}

/// Rejects non-admin users with 403.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub RemoteUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = RemoteUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden(format!(
                "User '{}' not an admin",
                user.name
            )));
        }
        Ok(RequireAdmin(user))
    }
}
