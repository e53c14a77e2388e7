//! Domain logic - pure rules independent of registries and the filesystem

pub mod constraint;
pub mod reference;
pub mod version;

pub use constraint::VersionConstraint;
pub use reference::{Reference, ReferencePattern};
pub use version::TagVersion;
