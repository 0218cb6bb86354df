pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod response;
pub mod routes;
pub mod utils;

// Re-export commonly used items for tests and binaries
pub use app::{build_router, create_app_with_config, AppState};
pub use config::AppConfig;
