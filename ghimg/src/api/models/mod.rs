//! API request/response models.
//!
//! Field names follow the camelCase JSON the browser upload page already consumes.

pub mod service;
pub mod uploads;
