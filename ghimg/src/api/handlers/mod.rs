//! HTTP request handlers for all API endpoints.

pub mod service;
pub mod static_assets;
pub mod uploads;
