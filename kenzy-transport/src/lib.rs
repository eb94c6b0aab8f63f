//! HTTP(S) transport: static asset serving with template substitution,
//! bearer auth, the JSON command API, and the outbound `reqwest` client the
//! bus sends through.

mod api;
mod assets;
mod auth;
mod client;
mod error;
mod server;

pub use api::{router, AppState};
pub use auth::{ApiKeyState, BearerAuth};
pub use client::HttpOutboundSender;
pub use error::TransportError;
pub use server::{serve, TlsFiles};
