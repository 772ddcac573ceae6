//! Web server module

mod error;
mod middleware;
mod routes;
mod sse;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use std::{future::Future, net::SocketAddr, path::Path, sync::Arc};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

use crate::archive::PostArchive;
use crate::config::Config;
use crate::events::EventBus;
use crate::visitors::VisitorCounter;
use middleware::VisitCountingLayer;

pub struct AppState {
    pub visitors: Arc<VisitorCounter>,
    pub archive: Arc<PostArchive>,
    pub event_bus: EventBus,
    pub ingest_token: Option<String>,
}

pub fn router(state: Arc<AppState>, public_dir: &Path) -> Router {
    let api = Router::new()
        .route("/visitor-stats", get(routes::api_visitor_stats))
        .route("/posts", get(routes::api_posts).post(routes::api_ingest_post))
        .route("/posts/stats", get(routes::api_posts_stats))
        .route("/posts/events", get(sse::events_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .nest("/api", api)
        // Everything else is the site's static content
        .fallback_service(ServeDir::new(public_dir))
        .layer(VisitCountingLayer::new(state.visitors.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    config: &Config,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state, &config.server.public_dir);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
