//! Host-routing reverse proxy for the Bakery daemon (spec §4.5).

pub mod forwarded;
pub mod handler;
pub mod server;

pub use server::{bind_first_free, build_router, serve, ProxyState};
