//! Command implementations

pub mod completions;
pub mod export;
pub mod import;
pub mod init;
pub mod resource;
pub mod stock;
pub mod summary;
