use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Moderation and oversight endpoints, nested under /admin. The router is
/// wrapped in the same authentication layer as the authenticated routes; each
/// handler then explicitly checks for `role='admin'` before proceeding.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Dashboard counters: total listings, active listings, distinct
        // agents and accumulated views.
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/properties
        // Lists ALL listings regardless of owner, with the full filter set
        // plus `status`. Used for moderation review.
        .route("/properties", get(handlers::get_admin_properties))
}
