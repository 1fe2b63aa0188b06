/// Router Module Index
///
/// Splits the course API by the authentication it requires. Authorization beyond
/// "is there a principal" lives in `policy`, never in the routers.

/// Routes reachable without credentials. Course reads accept an optional principal
/// and pass it through the enrollment gate.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// User administration. Authenticated here; the admin role is checked per action.
pub mod admin;
