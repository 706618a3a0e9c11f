//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `GET /get/:key`, `DELETE /del/:key`, `GET /exists/:key`
//! - `GET|PUT /ttl/:key`, `POST /ttl/:key/refresh`
//! - `GET /stats`, `GET /health`
//! - `POST /cache/{clean,compact,repair,maintenance,backup,restore}`
//! - `GET /offline`, `POST /offline/{enable,disable,sync}`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
