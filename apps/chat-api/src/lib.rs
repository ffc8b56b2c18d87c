pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod store;

use std::sync::Arc;

use auth::CredentialVerifier;
use config::Config;
use gateway::dispatcher::EventDispatcher;
use gateway::rooms::RoomRegistry;
use store::MessageStore;

/// Shared application state available to all route handlers.
///
/// Every component is constructed by the bootstrap (or a test harness) and
/// injected here; nothing in this crate is process-global.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub store: Arc<dyn MessageStore>,
    pub rooms: Arc<RoomRegistry>,
    pub dispatcher: Arc<EventDispatcher>,
}
