pub mod agent;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod models;
pub mod pool;
pub mod service;
pub mod utils;
