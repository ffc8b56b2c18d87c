pub mod dispatcher;
pub mod events;
pub mod rooms;
pub mod server;
pub mod session;
