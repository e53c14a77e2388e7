//! User interface module - progress and result output.
//!
//! All printing goes through [formatter]; diagnostics that are only useful
//! when debugging go through `tracing` instead.

pub mod formatter;

pub use formatter::{
    display_error, display_file_path, display_reference_update, display_status,
    display_success, display_summary, format_reference_update, format_summary,
};
