//! Visit counting middleware
//!
//! Counts page views before the request reaches the router. Only GET requests
//! for paths without a file extension are counted, so static assets do not
//! inflate the numbers.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{net::SocketAddr, sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};

use crate::visitors::{VisitorCounter, VisitorInfo};

const UNKNOWN: &str = "unknown";

/// Whether a request counts as a page view
pub fn should_count(method: &Method, path: &str) -> bool {
    *method == Method::GET && !path.contains('.')
}

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    // Try X-Real-IP first (set by Caddy/nginx)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    // X-Forwarded-For may hold a chain; the first entry is the client
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    fallback_ip.to_string()
}

fn visitor_info(request: &Request<Body>) -> VisitorInfo {
    let fallback_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let headers = request.headers();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN);

    VisitorInfo::new(get_real_ip(headers, &fallback_ip), user_agent)
}

/// Layer for visit counting
#[derive(Clone)]
pub struct VisitCountingLayer {
    visitors: Arc<VisitorCounter>,
}

impl VisitCountingLayer {
    pub fn new(visitors: Arc<VisitorCounter>) -> Self {
        Self { visitors }
    }
}

impl<S> Layer<S> for VisitCountingLayer {
    type Service = VisitCountingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VisitCountingMiddleware {
            inner,
            visitors: self.visitors.clone(),
        }
    }
}

/// Middleware service for visit counting
#[derive(Clone)]
pub struct VisitCountingMiddleware<S> {
    inner: S,
    visitors: Arc<VisitorCounter>,
}

impl<S> Service<Request<Body>> for VisitCountingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let visitors = self.visitors.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if should_count(request.method(), request.uri().path()) {
                let visitor = visitor_info(&request);
                let path = request.uri().path().to_string();
                // Counted before the handler runs; the counter never fails
                visitors.record_visit(&visitor, &path).await;
            }

            inner.call(request).await
        })
    }
}
