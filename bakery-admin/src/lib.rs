//! HTTP/JSON control plane for the Bakery daemon (spec §4.4).

pub mod error;
pub mod handlers;
pub mod server;

pub use server::{serve, AppState};
