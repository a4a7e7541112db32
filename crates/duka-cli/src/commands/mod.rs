pub mod common;
pub mod config;
pub mod records;
pub mod sync;
