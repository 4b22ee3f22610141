pub mod auth;
pub mod captcha;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod moderation;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod scheduler;
pub mod security;
pub mod threads;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
