//! The proxy's single fallback handler (spec §4.5).

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bakery_core::error::BakeryError;
use bakery_core::model::SliceStatus;

use crate::forwarded;
use crate::server::ProxyState;

fn error_response(err: BakeryError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_json_body())).into_response()
}

/// Routes every inbound request by `Host` header to the matching slice's
/// upstream on loopback.
pub async fn proxy(
    State(state): State<ProxyState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    match proxy_inner(state, peer, req).await {
        Ok(resp) => resp,
        Err(e) => error_response(e),
    }
}

async fn proxy_inner(state: ProxyState, peer: SocketAddr, req: Request<Body>) -> Result<Response, BakeryError> {
    let host_header = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();

    if host_header.trim().is_empty() {
        return Err(BakeryError::InvalidArgument("Missing Host header".to_string()));
    }

    let lookup_host = forwarded::normalize_host_for_lookup(&host_header);
    let route = state
        .store
        .get_host_route(&lookup_host)
        .await?
        .ok_or_else(|| BakeryError::NotFound(format!("No route for host {lookup_host}")))?;

    if route.slice_status != SliceStatus::Running {
        return Err(BakeryError::SliceNotRunning);
    }

    let (parts, body) = req.into_parts();
    let method = reqwest_method(&parts.method);
    let upstream_url = format!("http://127.0.0.1:{}{}", route.allocated_port, parts.uri);

    let headers = build_forwarded_headers(&parts.headers, &host_header, &peer);
    let upstream_body = reqwest::Body::wrap_stream(body.into_data_stream());

    let upstream_resp = state
        .http_client
        .request(method, &upstream_url)
        .headers(headers)
        .body(upstream_body)
        .send()
        .await
        .map_err(|e| BakeryError::UpstreamUnavailable(e.to_string()))?;

    let status = StatusCode::from_u16(upstream_resp.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_resp.headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(name, value);
        }
    }

    let stream = upstream_resp.bytes_stream();
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn reqwest_method(method: &http::Method) -> reqwest::Method {
    reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET)
}

/// Copies the incoming headers, drops `Connection`, and sets the
/// `X-Forwarded-*` chain per spec §4.5 step 5.
fn build_forwarded_headers(incoming: &HeaderMap, host_header: &str, peer: &SocketAddr) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in incoming {
        if name == http::header::CONNECTION || name == http::header::HOST {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let incoming_proto = incoming
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok());
    let proto = forwarded::forwarded_proto(incoming_proto);
    let port = forwarded::forwarded_port(host_header, &proto);
    let existing_for = incoming.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let for_value = forwarded::forwarded_for(existing_for, &peer.ip().to_string());

    set_header(&mut headers, "x-forwarded-host", host_header);
    set_header(&mut headers, "x-forwarded-proto", &proto);
    set_header(&mut headers, "x-forwarded-port", &port);
    set_header(&mut headers, "x-forwarded-for", &for_value);
    headers
}

fn set_header(headers: &mut reqwest::header::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = reqwest::header::HeaderValue::from_str(value) {
        headers.insert(reqwest::header::HeaderName::from_static(name), value);
    }
}
