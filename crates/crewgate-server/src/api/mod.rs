pub mod chat;
pub mod error;
pub mod models;
pub mod research;

pub use error::ApiError;

use axum::Router;

/// Build the main API router with all resource routes
pub fn router() -> Router {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/research", research::router())
        .nest("/models", models::router())
}
