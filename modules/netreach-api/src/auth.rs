//! Vestigial auth module (spec §9 Open Questions / component N): a
//! user/session subsystem that exists exactly as far as the original
//! repo's own dead code path did — constructed here, never merged into
//! the live `Router` in `main.rs`.
#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_NAME: &str = "netreach_session";
const SESSION_DURATION_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub tier: String,
    pub expires_at: DateTime<Utc>,
}

/// Authenticated session, extractable in handlers that opt in to it.
/// Nothing in the live router does, per the Open Question resolution.
pub struct AdminSession {
    pub email: String,
}

impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if let Some(value) = parse_cookie(cookie_header, COOKIE_NAME) {
            if let Some(email) = verify_session(value, &state.auth_secret) {
                return Ok(AdminSession { email });
            }
        }

        Err(Redirect::to("/admin/login").into_response())
    }
}

/// `email|expiry|signature`.
pub fn create_session(email: &str, secret: &str) -> String {
    let expiry = Utc::now().timestamp() + SESSION_DURATION_SECS;
    let payload = format!("{email}|{expiry}");
    let sig = sign(&payload, secret);
    format!("{payload}|{sig}")
}

pub fn session_cookie(email: &str, secret: &str) -> String {
    let value = create_session(email, secret);
    let secure = if cfg!(debug_assertions) { "" } else { "; Secure" };
    format!("{COOKIE_NAME}={value}; Path=/admin; HttpOnly; SameSite=Lax; Max-Age={SESSION_DURATION_SECS}{secure}")
}

pub fn clear_session_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/admin; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn verify_session(value: &str, secret: &str) -> Option<String> {
    let parts: Vec<&str> = value.splitn(3, '|').collect();
    if parts.len() != 3 {
        return None;
    }
    let (email, expiry_str, sig) = (parts[0], parts[1], parts[2]);

    let payload = format!("{email}|{expiry_str}");
    let expected_sig = sign(&payload, secret);
    if !constant_time_eq(sig.as_bytes(), expected_sig.as_bytes()) {
        return None;
    }

    let expiry: i64 = expiry_str.parse().ok()?;
    if Utc::now().timestamp() > expiry {
        return None;
    }
    Some(email.to_string())
}

fn sign(payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_session() {
        let secret = "test-secret";
        let cookie_value = create_session("someone@example.com", secret);
        assert_eq!(verify_session(&cookie_value, secret), Some("someone@example.com".to_string()));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let secret = "test-secret";
        let mut cookie_value = create_session("someone@example.com", secret);
        cookie_value.push('x');
        assert_eq!(verify_session(&cookie_value, secret), None);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let cookie_value = create_session("someone@example.com", "secret-a");
        assert_eq!(verify_session(&cookie_value, "secret-b"), None);
    }
}
