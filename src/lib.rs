pub mod auth;
pub mod blog;
pub mod config;
pub mod error;
pub mod feed;
pub mod file;
pub mod interaction;
pub mod models;
pub mod notification;
pub mod openapi;
pub mod realtime;
pub mod repo;
pub mod routes;
pub mod security;
pub mod session;
pub mod storage;
pub mod user;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
