//! HTTP surface: router, handlers, and bearer-token parsing.

pub mod auth;
pub mod routes;

pub use routes::build_router;
