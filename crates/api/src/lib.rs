//! HTTP surface of the inference service

pub mod server;

pub use server::{bind_listener, build_router, serve, start_server, AppState, ModelInfo};
