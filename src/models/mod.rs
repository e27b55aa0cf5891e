//! Request and Response models for the content cache API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{PutContentRequest, StaleListParams, VersionQuery};
pub use responses::{
    ClaimResponse, HealthResponse, MarkStaleResponse, PurgeResponse, RenderResponse,
    StaleListResponse, StatsResponse,
};
