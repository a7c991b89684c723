//! kp CLI - relocate buildpacks, stacks, lifecycle images, and source.

pub mod commands;
pub mod credentials;
pub mod session;
