// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Bakery — local multi-slice dev orchestration daemon
//
//  Store:       sqlx/SQLite, migrated on open
//  Control API: axum on the Tokio runtime
//  Router:      axum on the same runtime, bound before the Control API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::path::PathBuf;
use std::sync::Arc;

use bakery_admin::AppState;
use bakery_core::config::BakeryConfig;
use bakery_orchestrator::{RouterPortHandle, SliceOrchestrator};
use bakery_portalloc::PortAllocator;
use bakery_proxy::ProxyState;
use bakery_store::Store;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bakeryd", version, about = "Bakery — local multi-slice dev orchestration daemon")]
struct Cli {
    /// Log level, used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Bakery starting");

    let config = BakeryConfig::load()?;
    let data_dir = expand_tilde(&config.data_dir);

    let store = Store::open(&data_dir).await?;
    info!(dir = %data_dir.display(), "Store opened");

    let allocator = PortAllocator::new(config.port_range_start, config.port_range_end);
    let router_port = RouterPortHandle::new(0);

    let orchestrator = Arc::new(SliceOrchestrator::new(
        store.clone(),
        allocator,
        router_port.clone(),
        config.host_suffix.clone(),
    ));

    // Router Proxy binds first, on the first free candidate port; the
    // resolved port is fed back to the orchestrator so synthesized route
    // URLs are correct from the very first `createSlice` call.
    let (proxy_listener, bound_router_port) = bakery_proxy::bind_first_free(&config.router_ports).await?;
    router_port.set(bound_router_port);
    info!(port = bound_router_port, "Router proxy bound");

    let proxy_state = ProxyState::new(store.clone());
    let admin_state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        host: config.host.clone(),
        port: config.port,
    };

    let proxy_task = tokio::spawn(bakery_proxy::serve(proxy_listener, proxy_state));
    let admin_task = tokio::spawn(bakery_admin::serve(admin_state));

    info!(
        host = %config.host,
        port = config.port,
        router_port = bound_router_port,
        "Bakery is ready"
    );

    tokio::select! {
        res = proxy_task => {
            res??;
        }
        res = admin_task => {
            res??;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}

/// Waits for SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Expands a leading `~` to `$HOME`, since `BakeryConfig`'s default data
/// directory is `~/.bakery` and the shell isn't around to do it for us.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_leading_tilde_from_home_env() {
        std::env::set_var("HOME", "/home/dev");
        assert_eq!(expand_tilde("~/.bakery"), PathBuf::from("/home/dev/.bakery"));
    }

    #[test]
    fn leaves_absolute_paths_untouched() {
        assert_eq!(expand_tilde("/var/lib/bakery"), PathBuf::from("/var/lib/bakery"));
    }
}
