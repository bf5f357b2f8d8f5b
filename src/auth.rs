use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::operations::get_profile;
use crate::db::DataStore;

const AUTH_COOKIE_NAME: &str = "auth_token";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// Things a caller may be allowed to do. Granted by role, never by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    UseTutor,
    ViewAdminDashboard,
    ResolveAlerts,
}

impl Role {
    pub fn grants(self, capability: Capability) -> bool {
        match capability {
            Capability::UseTutor => true,
            Capability::ViewAdminDashboard | Capability::ResolveAlerts => self == Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.grants(capability)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("missing JWT_SECRET")]
    MissingSecret,
    #[error("profile lookup failed: {0}")]
    Store(#[from] crate::db::StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub user_id: String,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Verifies the token and resolves the caller's identity record. A user with
/// no profile row yet is treated as a plain user.
pub async fn authenticate(
    store: &dyn DataStore,
    secret: Option<&str>,
    token: &str,
) -> Result<AuthUser, AuthError> {
    let secret = secret.ok_or(AuthError::MissingSecret)?;
    let claims = verify_jwt_hs256(token, secret)?;

    let profile = get_profile(store, &claims.user_id).await?;
    Ok(match profile {
        Some(profile) => AuthUser {
            id: claims.user_id,
            email: profile.email,
            display_name: profile.display_name,
            role: profile.role,
        },
        None => AuthUser {
            id: claims.user_id,
            email: None,
            display_name: None,
            role: Role::User,
        },
    })
}

pub fn verify_jwt_hs256(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    let alg = header_json
        .get("alg")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?;
    if alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    validate_registered_claims(&payload_json)?;

    let user_id = payload_json
        .get("sub")
        .or_else(|| payload_json.get("userId"))
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::InvalidToken)?
        .to_string();

    Ok(Claims { user_id })
}

fn validate_registered_claims(payload: &serde_json::Value) -> Result<(), AuthError> {
    let now = Utc::now().timestamp();

    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::InvalidToken);
        }
    }

    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    Ok(())
}

pub fn sign_token(user_id: &str, secret: &str, ttl: chrono::Duration) -> Result<String, AuthError> {
    let issued_at = Utc::now();
    let exp = issued_at
        .checked_add_signed(ttl)
        .ok_or(AuthError::InvalidToken)?;

    let header_json = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let payload_json = serde_json::json!({
        "sub": user_id,
        "iat": issued_at.timestamp(),
        "exp": exp.timestamp(),
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header_json).map_err(|_| AuthError::InvalidToken)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload_json).map_err(|_| AuthError::InvalidToken)?);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{sig_b64}"))
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
