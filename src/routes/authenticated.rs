use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Routes for logged-in agents: listing submission and management. Every
/// handler here relies on the `AuthUser` extractor middleware being layered
/// above this module, which guarantees a validated user id and role.
/// Ownership checks (owner-or-admin) are enforced inside the handlers.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /properties/user
        // Lists the authenticated agent's own listings with the full filter
        // set plus `status`. The static segment takes precedence over the
        // public /properties/{id} matcher.
        .route("/properties/user", get(handlers::get_my_properties))
        // POST /properties
        // Submits a new listing as multipart form data with up to 5 images.
        // Restricted to the agent and admin roles.
        .route("/properties", post(handlers::create_property))
        // PUT/DELETE /properties/{id}
        // Partial update or removal of a listing. Strict owner-or-admin
        // check is enforced within the handler logic.
        .route(
            "/properties/{id}",
            put(handlers::update_property).delete(handlers::delete_property),
        )
        // PATCH /properties/{id}/status
        // Lifecycle transitions (active, sold, pending, rented). Uses PATCH
        // for the single-field update.
        .route(
            "/properties/{id}/status",
            patch(handlers::update_property_status),
        )
}
