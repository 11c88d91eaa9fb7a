//! Small shared utilities: logging setup and the monotonic clock.

pub mod clock;
pub mod logger;

pub use clock::monotonic_ns;
pub use logger::init_logging;
