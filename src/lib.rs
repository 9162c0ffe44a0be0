// Library exports for binary tools and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::{AnnouncementRepository, ContactRepository};
use services::uploads::FileStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub announcements: Arc<dyn AnnouncementRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub files: FileStore,
    pub config: Arc<Config>,
}
