//! Plugin manager kernel library.
//!
//! Resolves plugin and package dependencies into install, upgrade and
//! uninstall plans and executes them after confirmation. The `mpm` binary
//! is a thin command-line front end over this library.

pub mod config;
pub mod executor;
pub mod plugin;
pub mod session;
pub mod task;
pub mod version;
