pub mod orchestration;

pub use orchestration::{build_options, run_update_workflow, UpdateWorkflowArgs};
