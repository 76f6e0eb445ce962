pub mod auth_routes;
pub mod notifications;
pub mod reminder_routes;
pub mod server;
pub mod session;
pub mod state;
