//! BOMLink API Library
//!
//! Procurement workflow backend: parts catalog, bills of materials with an
//! import reconciliation pipeline, and supplier RFQ management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod export;
pub mod handlers;
pub mod mailer;
pub mod ocr;
pub mod services;

use axum::{extract::DefaultBodyLimit, Router};
use http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let configured: Option<Vec<HeaderValue>> = cfg.cors_allowed_origins.as_ref().map(|raw| {
        raw.split(',')
            .filter_map(|origin| {
                let trimmed = origin.trim();
                if trimmed.is_empty() {
                    return None;
                }
                HeaderValue::from_str(trimmed).ok()
            })
            .collect()
    });

    match configured {
        Some(origins) if !origins.is_empty() => CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
        _ => {
            if cfg.is_production() {
                warn!("No CORS origins configured in production; falling back to permissive CORS");
            }
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// Builds the application router with all resource routes and middleware.
pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/customers", handlers::customers::customer_routes())
        .nest("/jobs", handlers::jobs::job_routes())
        .nest(
            "/manufacturers",
            handlers::manufacturers::manufacturer_routes(),
        )
        .nest("/suppliers", handlers::suppliers::supplier_routes())
        .nest("/parts", handlers::parts::part_routes())
        .nest("/boms", handlers::boms::bom_routes())
        .nest("/rfqs", handlers::rfqs::rfq_routes());

    Router::new()
        .nest("/api/v1", api)
        .nest("/health", handlers::health::health_routes())
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
