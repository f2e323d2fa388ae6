//! Request extractors
//!
//! `ValidatedJson` parses a JSON body and runs `validator` rules, turning every
//! rejection into a `400 Bad Request` in the application's error format.
//! `ClientDevice` captures the user agent and client address for session records.
//! Forwarding headers only count when the socket peer is a configured proxy.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{header::USER_AGENT, request::Parts, Extensions, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::error::AppError;
use crate::models::DeviceMetadata;
use crate::AppState;

/// Longest user agent kept on a session record
const MAX_USER_AGENT_LEN: usize = 512;

/// JSON body that has passed its `Validate` rules
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Client address used for throttling and session records.
///
/// The socket peer is the client unless it is one of `trusted_proxies`. Behind a
/// trusted proxy, `x-forwarded-for` is walked from the right, skipping trusted hops,
/// and the first other address wins. Hops left of it were written by the caller
/// and are never believed.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };

    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    for hop in hops.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return ip.to_string(),
            Err(_) => break,
        }
    }

    peer.to_string()
}

/// Device details of the caller
#[derive(Debug, Clone, Default)]
pub struct ClientDevice(pub DeviceMetadata);

impl FromRequestParts<AppState> for ClientDevice {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());
        let ip = client_ip(
            &parts.headers,
            &parts.extensions,
            &state.config.server.trusted_proxies,
        );

        Ok(ClientDevice(DeviceMetadata {
            user_agent,
            ip: Some(ip),
        }))
    }
}
