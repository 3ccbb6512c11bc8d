//! Execution engine for pvekit
//!
//! The engine orchestrates:
//! 1. Planning - Build update requests from arguments and batch files
//! 2. Diffing - Show the live config against the request
//! 3. Executing - Confirm, apply with conflict handling, report

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, check, execute, execute_batch};
