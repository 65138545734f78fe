/// Router Module Index
///
/// Routes are split by what they require from the caller. Access control is
/// attached per module as a router layer, never left to individual handlers.

/// Read endpoints. Open to everyone; the optional `Requester` extractor
/// decides what each caller sees.
pub mod public;

/// Mutations and `/api/users/me`, wrapped in the `AuthUser` middleware.
pub mod authenticated;
