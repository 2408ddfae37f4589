//! Device Subsystem
//!
//! - `drivers`: input device decoding, PIC and UART
pub mod drivers;
