pub mod auth;
pub mod config;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod server;
pub mod store;
pub mod stream;
