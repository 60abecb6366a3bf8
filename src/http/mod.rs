//! HTTP layer: history API, health and static assets

pub mod routes;

pub use routes::build_router;
