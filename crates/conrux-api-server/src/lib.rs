pub mod config;
pub mod document;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod utils;
