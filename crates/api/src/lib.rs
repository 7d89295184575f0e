//! HTTP API: routing, actor resolution and request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;
