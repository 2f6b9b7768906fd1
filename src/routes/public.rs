use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any
/// client. These are the discovery surfaces of the marketplace: filtered
/// search, location suggestions, and the single-listing detail view.
///
/// Note that the public search deliberately applies no status restriction;
/// sold and pending listings stay visible as market history.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load
        // balancer checks. Returns "ok" immediately.
        .route("/health", get(|| async { "ok" }))
        // GET /properties?location=...&minPrice=...&search=...
        // The main search endpoint. Supports every filter dimension plus
        // pagination, sorting, full-text search and a geospatial radius.
        .route("/properties", get(handlers::search_properties))
        // GET /properties/locations?search=...
        // Distinct location strings for autocomplete, optionally narrowed by
        // substring. Registered before /{id} so the static segment wins.
        .route("/properties/locations", get(handlers::get_locations))
        // GET /properties/{id}
        // Single-listing detail. Increments the listing's view counter
        // atomically before responding.
        .route("/properties/{id}", get(handlers::get_property))
}
