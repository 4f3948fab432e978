//! Value types shared between generators, the orchestrator and reporting

mod artifact;
mod result;

pub use artifact::{is_annual_date, Artifact, ArtifactName};
pub use result::{BackupResult, BackupStatus, SkipReason};
