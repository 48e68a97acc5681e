pub mod catalog;
pub mod config;
pub mod detail;
mod error;
pub mod fetch;
pub mod http;
pub mod ledger;
pub mod model;
pub mod paths;
pub mod presentation;
pub mod runlog;
pub mod sync;

pub use error::{Result, SyncError};
