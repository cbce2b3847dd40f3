pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod models;
pub mod routes;
pub mod sessions;
pub mod storage;
pub mod user_models;
pub mod user_storage;

pub use auth::{AuthGate, Identity, RequestContext, SESSION_COOKIE};
pub use error::AppError;
pub use files::FileManager;
pub use routes::{router, AppState};
