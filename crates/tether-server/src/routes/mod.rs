//! HTTP and WebSocket route handlers.

pub mod auth;
pub mod rest;
pub mod status;
pub mod tmp;
pub mod ws;
