//! SEO Content Cache - versioned storage for AI-generated landing page copy
//!
//! Stores generated copy per (page, locale, version), serves stale copy while
//! a background worker regenerates it, and falls back to template copy when
//! nothing is cached.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod resolver;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use resolver::{ContentResolver, ContentSource, Resolved};
pub use tasks::spawn_regeneration_task;
