pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod processing;
pub mod render;
pub mod types;
