//! Foundation module - low-level utilities shared by every subsystem
//!
//! Currently this is the logging facade; the rendering layer itself lives in
//! [`crate::render`].

pub mod logging;
