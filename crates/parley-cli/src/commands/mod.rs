//! CLI command implementations.

pub mod compact;
pub mod conversation;
pub mod doctor;
