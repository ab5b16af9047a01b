//! CLI command modules.

pub mod blocklist;
pub mod http;
pub mod routing;
pub mod status;
pub mod trigger;
