//! Spawns room loops and stops them together

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::room::RoomLoop;

/// Owns the shutdown signal shared by every room loop
pub struct Engine {
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Spawn a room loop on the runtime
    pub fn spawn_room(&self, room_loop: RoomLoop) -> JoinHandle<()> {
        tokio::spawn(room_loop.run(self.shutdown_tx.subscribe()))
    }

    /// Signal every room loop to stop after its current tick
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
