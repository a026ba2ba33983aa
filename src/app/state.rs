//! Application state shared across routes

use std::sync::Arc;

use crate::config::rooms::RoomsConfig;
use crate::config::Config;
use crate::lobby::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config, rooms: RoomsConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RoomRegistry::new(rooms)),
        }
    }
}
