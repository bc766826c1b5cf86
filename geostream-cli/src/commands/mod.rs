//! CLI subcommands.

pub mod ip;
pub mod watch;
