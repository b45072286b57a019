/// Router Module Index
///
/// Splits the API into security-segregated routers. Access control is attached at
/// the router level (via Axum layers), so a handler cannot be exposed without it
/// by accident.

/// Routes accessible to anyone: read-only content plus the credential exchange.
pub mod public;

/// Routes restricted to the admin. Every route in this module sits behind the
/// bearer-token layer installed in `create_router`.
pub mod admin;
