//! HTTP API: routing, request/response mapping and bridge wiring.

pub mod app;
pub mod middleware;
