pub mod assets;
pub mod config;
pub mod search;
pub mod types;
