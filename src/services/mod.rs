//! Request layer: arming bookkeeping and the HTTP API (feature `web`).
//!
//! All handlers share one [`SharedLauncher`] wrapped in `Arc`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use prl_launcher::services::{build_router, SharedLauncher, WebServerConfig};
//!
//! let state = Arc::new(SharedLauncher::new(launcher, config.device.name.as_str()));
//! let router = build_router(Arc::clone(&state), &WebServerConfig::from_config(&config.web));
//! ```

pub mod api;
pub mod arming;
pub mod shared;
pub mod web;

pub use api::*;
pub use arming::*;
pub use shared::*;
pub use web::*;
