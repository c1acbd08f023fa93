//! Terminal client for the live shopping agent.

pub mod bridge;
pub mod config;
pub mod console;
