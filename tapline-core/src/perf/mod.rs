//! Performance utilities: CPU pinning and real-time scheduling.
//!
//! Cache-line concerns live with the data structures themselves
//! (`crossbeam::utils::CachePadded` on every hot counter and ring index).

pub mod cpu;

pub use cpu::{num_cores, optimize_capture_thread, pin_to_core, set_realtime_priority};
