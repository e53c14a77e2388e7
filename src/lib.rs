pub mod cli;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod rewrite;
pub mod ui;

pub use driver::{TagUpdater, UpdateOptions, UpdateSummary};
pub use error::{Result, UpdateTagsError};
