use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{authenticate, extract_token, AuthError, AuthUser, Capability};
use crate::response::json_error;
use crate::state::AppState;

/// Verifies the caller's token and stores the resolved `AuthUser` in the
/// request extensions.
pub async fn require_auth(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing authentication token").into_response();
    };

    let config = state.config();
    let store = state.store();
    match authenticate(store.as_ref(), config.jwt_secret.as_deref(), &token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AuthError::MissingSecret) => {
            tracing::error!("JWT_SECRET not configured, rejecting authenticated request");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Authentication is not configured",
            )
            .into_response()
        }
        Err(AuthError::Store(e)) => {
            tracing::warn!(error = %e, "profile lookup failed during authentication");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Could not verify your account, please retry",
            )
            .into_response()
        }
        Err(_) => json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication failed, please sign in again")
            .into_response(),
    }
}

/// Rejects the request with 403 unless the authenticated caller holds
/// `capability`. Runs after `require_auth`.
pub async fn require_capability(capability: Capability, req: Request<Body>, next: Next) -> Response {
    let Some(user) = req.extensions().get::<AuthUser>() else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing authentication token").into_response();
    };

    if !user.can(capability) {
        tracing::info!(user_id = %user.id, ?capability, "access denied");
        return json_error(StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied").into_response();
    }

    next.run(req).await
}

pub async fn require_tutor_access(req: Request<Body>, next: Next) -> Response {
    require_capability(Capability::UseTutor, req, next).await
}

pub async fn require_admin_view(req: Request<Body>, next: Next) -> Response {
    require_capability(Capability::ViewAdminDashboard, req, next).await
}

pub async fn require_alert_resolution(req: Request<Body>, next: Next) -> Response {
    require_capability(Capability::ResolveAlerts, req, next).await
}
