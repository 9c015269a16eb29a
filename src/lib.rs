// kvbench - Library root

pub mod backend;
pub mod bench;
pub mod config;
pub mod error;
pub mod host;
