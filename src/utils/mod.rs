pub mod clock;
pub mod command;
pub mod compress;
pub mod locker;

// Trait-based abstraction for testability
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{CommandOutput, CommandSpec, ExecError, StdoutTarget};
pub use executor::{CommandExecutor, RealExecutor};
