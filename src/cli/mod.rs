//! CLI module for the cutout server
//!
//! This module is only available when the "server" and "onnx" features are enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli};
