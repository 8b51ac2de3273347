#![allow(missing_docs)]

//! HTTP handlers that are not part of the webhook pipeline

pub mod status;

pub use status::{status_router, AppState, HealthResponse, StatusResponse};
