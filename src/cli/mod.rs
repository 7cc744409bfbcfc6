//! Command implementations for the `chatlog` binary

pub mod history;
pub mod maintenance;
pub mod record;
pub mod session;
