//! Appkeeper Library
//!
//! A declarative process supervisor for long-running applications.
//!
//! This crate provides the core functionality for:
//! - Loading and validating ecosystem configurations
//! - Launching child processes with their declared environment
//! - Restarting processes on crash or watched file changes
//! - Tracking per-app state across supervisor restarts

pub mod config;
pub mod process;
pub mod supervisor;
