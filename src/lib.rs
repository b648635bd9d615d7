// Public API for clients, the store host and integration tests

pub mod abuse;
pub mod api;
pub mod auth;
pub mod capacity;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod identity;
pub mod jobs;
pub mod moderation;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
