//! Core modules: installation layout, persisted state, archives and the
//! component lifecycle.
//!
//! Everything that touches the installation directory lives here. The
//! shipped components in `plugins` are thin wrappers over [`component`].

pub mod backup;
pub mod checksum;
pub mod component;
pub mod config;
pub mod error;
pub mod installer;
pub mod integrity;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod security;
pub mod settings;
pub mod store;
pub mod sync;
pub mod time;
