// =============================================================================
// API Module - REST + WebSocket surface
// =============================================================================

pub mod auth;
pub mod rest;
pub mod ws;
