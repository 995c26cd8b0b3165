//! Lokapasar API Library
//!
//! Marketplace backend whose core is the cart pricing and checkout
//! pipeline: a per-buyer cart with totals recomputed on every access, an
//! atomic cart-to-order checkout, and payment-webhook-driven order state.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// The versioned API surface. The webhook route is public; everything else
/// requires a bearer identity, enforced by the extractor on each handler.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest(
            "/payments",
            handlers::payment_webhooks::payment_webhook_routes(),
        )
}
