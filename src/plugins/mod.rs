//! Concrete components shipped with the framework.
//!
//! Each module wraps [`crate::core::component::FileComponent`] with its own
//! file list and permission mode, plus an optional installation check wired
//! up in [`crate::catalog`].

pub mod agents;
pub mod commands;
pub mod hooks;
