//! Extracts [`RequestContext`] from request headers.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::context::RequestContext;

/// Header carrying client-supplied device metadata as JSON.
pub const DEVICE_INFO_HEADER: &str = "x-device-info";

/// [`RequestContext`] of the current request.
///
/// The client address is taken from the first `x-forwarded-for` entry, then
/// `x-real-ip`, then the socket peer address when the server was started
/// with connect info.
#[derive(Debug, Clone)]
pub struct ClientContext(pub RequestContext);

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientContext(context_from_parts(parts)))
    }
}

/// Build a [`RequestContext`] from request parts.
pub fn context_from_parts(parts: &Parts) -> RequestContext {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestContext {
        ip_address: client_ip(&parts.headers).or(peer),
        user_agent: header_str(&parts.headers, "user-agent").map(str::to_string),
        request_path: Some(parts.uri.path().to_string()),
        request_method: Some(parts.method.to_string()),
        device_info: header_str(&parts.headers, DEVICE_INFO_HEADER)
            .and_then(|raw| serde_json::from_str(raw).ok()),
    }
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use serde_json::json;

    use super::*;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let parts = parts(
            Request::post("/api/v1/auth/refresh")
                .header("x-forwarded-for", "203.0.113.5, 10.0.0.1")
                .header("x-real-ip", "10.0.0.2")
                .header("user-agent", "haven-ios/2.1"),
        );
        let ctx = context_from_parts(&parts);

        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.5"));
        assert_eq!(ctx.user_agent.as_deref(), Some("haven-ios/2.1"));
        assert_eq!(ctx.request_path.as_deref(), Some("/api/v1/auth/refresh"));
        assert_eq!(ctx.request_method.as_deref(), Some("POST"));
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let parts = parts(Request::get("/").header("x-real-ip", "10.0.0.2"));
        assert_eq!(context_from_parts(&parts).ip_address.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn device_info_header_is_parsed_as_json() {
        let parts = parts(
            Request::get("/").header(DEVICE_INFO_HEADER, r#"{"platform":"android","model":"Pixel"}"#),
        );
        assert_eq!(
            context_from_parts(&parts).device_info,
            Some(json!({ "platform": "android", "model": "Pixel" }))
        );

        let garbage = parts_with_device("not json");
        assert_eq!(context_from_parts(&garbage).device_info, None);
    }

    fn parts_with_device(value: &str) -> Parts {
        parts(Request::get("/").header(DEVICE_INFO_HEADER, value))
    }
}
