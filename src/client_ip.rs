//! Optional client IP address extractor
//!
//! `axum_client_ip` only rejects when the address is unknown, callers without one still
//! resolve to the fallback country.

use std::convert::Infallible;
use std::net::IpAddr;

use axum::extract::FromRequestParts as _;
use axum::extract::OptionalFromRequestParts;
use axum::http::request::Parts;

/// Client IP address, from the source configured with `axum_client_ip::ClientIpSource`
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

impl<S> OptionalFromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let ip_address = axum_client_ip::ClientIp::from_request_parts(parts, state).await;

        Ok(ip_address
            .ok()
            .map(|axum_client_ip::ClientIp(ip_address)| Self(ip_address)))
    }
}
