//! CLI command implementations
//!
//! `flash` and `info` talk to a hub over a transport. `build-image` and the
//! list commands work offline.

pub mod flash;
pub mod image;
pub mod info;
mod list;

pub use list::{list_hubs, list_transports};
