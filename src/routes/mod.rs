/// Router Module Index
///
/// Splits the routing surface into security-segregated modules so that access
/// control is applied explicitly at the module level via Axum layers rather
/// than per-handler.
///
/// The three modules map directly to the access tiers of the API.

/// Routes accessible to any client, anonymous included. Read-only listing
/// discovery plus the view-counting detail endpoint.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware. Requires a valid
/// bearer token; role checks happen inside the handlers.
pub mod authenticated;

/// Routes restricted to users with the 'admin' role. Handlers additionally
/// verify the role themselves.
pub mod admin;
