//! Command implementations for the AgriSense CLI.

pub mod models;
pub mod predict;
pub mod predictions;
pub mod render;
pub mod status;
pub mod train;
pub mod upload;
