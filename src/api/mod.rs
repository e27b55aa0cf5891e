//! API Module
//!
//! HTTP handlers and routing for the content cache REST API.
//!
//! # Endpoints
//! - `PUT /content` - Store generated content
//! - `GET /content/:page_key/:locale` - Raw record lookup
//! - `POST /content/:page_key/:locale/:version/stale` - Force a record stale
//! - `POST /content/:page_key/:locale/claim` - Claim a record for regeneration
//! - `GET /stale` - Records due for regeneration
//! - `GET /render/:page_key/:locale` - Resolve copy for a page render
//! - `POST /gc` - Delete superseded versions
//! - `GET /stats` - Counters
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
