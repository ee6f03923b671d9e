pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod content;
pub mod conversations;
pub mod database;
pub mod error;
pub mod identity;
pub mod mailer;
pub mod media;
pub mod node;
pub mod notifications;
pub mod realtime;
pub mod telemetry;
pub mod utils;
