pub mod backup;
pub mod cleanup;
pub mod logging;
pub mod scheduler;
pub mod stats;
