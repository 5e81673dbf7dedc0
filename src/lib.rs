//! Realtime community chat for a course platform: the shared event
//! protocol, the client-side state machine, and the server-side room,
//! presence, and fan-out logic.

pub mod attachments;
pub mod auth;
pub mod client;
pub mod config;
pub mod events;
pub mod model;
pub mod server;
