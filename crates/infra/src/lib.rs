//! Infrastructure layer: configuration, persistence and the lending service.
//!
//! Domain crates stay free of IO; everything that touches a clock, a lock or
//! a database connection lives here.

pub mod config;
pub mod service;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use service::{LendingService, RequestDetails, ServiceError, ServiceResult, SubmitRequest};
pub use store::{
    InMemoryLendingStore, LendingStore, ListScope, PostgresLendingStore, StoreError, TransitionCommit,
};
