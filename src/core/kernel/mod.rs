//! # Kernel Initialization Module
//!
//! Runs the boot-time bring-up as a series of named phases. Each phase
//! reports its own outcome; the first failure stops the sequence.
//!
//! ## Example
//!
//! ```ignore
//! use trapgate::core::kernel::init_phase;
//!
//! init_phase("Clock", || {
//!     timer::init();
//!     Ok(())
//! })?;
//! ```

pub mod init;

pub use init::init_phase;
#[cfg(target_arch = "x86")]
pub use init::init_kernel;
