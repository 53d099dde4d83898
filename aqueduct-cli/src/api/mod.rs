//! Platform access layer
//!
//! This module defines the `Instance` seam the migration engine consumes, the
//! generic `Entity` record it exchanges, and the REST implementation used
//! against real instances.

pub mod client;
pub mod error;
pub mod instance;
pub mod models;
pub mod views;

pub use client::{ConnectOptions, Credentials, HttpInstance};
pub use error::{ApiError, ApiResult};
pub use instance::Instance;
pub use models::{Entity, Kind, PackageInstall, SessionIdentity};
pub use views::{ReportView, TaskAction, TaskView};
