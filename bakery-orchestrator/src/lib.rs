//! Slice lifecycle orchestration: composes the Store and Port Allocator to
//! implement `createSlice`/`stopSlice`/`removeSlice` (spec §4.3).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bakery_core::error::BakeryError;
use bakery_core::model::{Expose, Pie, Protocol, SliceStatus};
use bakery_core::wire::{OrchestratedSlice, SliceResourceView, SliceView};
use bakery_portalloc::PortAllocator;
use bakery_store::slices::NewResource;
use bakery_store::Store;
use uuid::Uuid;

/// One resource requested in a `createSlice` call.
#[derive(Debug, Clone)]
pub struct CreateSliceResource {
    pub key: String,
    pub protocol: Protocol,
    pub expose: Expose,
}

/// Late-bound handle to the Router Proxy's bound port. The orchestrator is
/// constructed before the proxy has bound a listener (it binds the first
/// free of `{80, 443, 4080}`), so the port is injected here once known
/// rather than passed to the constructor.
#[derive(Clone)]
pub struct RouterPortHandle(Arc<AtomicU16>);

impl RouterPortHandle {
    pub fn new(initial: u16) -> Self {
        Self(Arc::new(AtomicU16::new(initial)))
    }

    pub fn set(&self, port: u16) {
        self.0.store(port, Ordering::SeqCst);
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SliceOrchestrator {
    store: Store,
    allocator: PortAllocator,
    router_port: RouterPortHandle,
    host_suffix: String,
}

impl SliceOrchestrator {
    pub fn new(
        store: Store,
        allocator: PortAllocator,
        router_port: RouterPortHandle,
        host_suffix: String,
    ) -> Self {
        Self {
            store,
            allocator,
            router_port,
            host_suffix,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn router_port(&self) -> u16 {
        self.router_port.get()
    }

    pub fn router_port_handle(&self) -> RouterPortHandle {
        self.router_port.clone()
    }

    /// Create algorithm from spec §4.3: allocate an ordinal and a host,
    /// reserve ports, and persist the slice with its resources as one
    /// logical transaction. On any failure, no partial slice is left
    /// behind — the Store's transaction rolls back.
    pub async fn create_slice(
        &self,
        pie: &Pie,
        resources: Vec<CreateSliceResource>,
    ) -> Result<OrchestratedSlice, BakeryError> {
        if resources.is_empty() {
            return Err(BakeryError::InvalidArgument(
                "resources must be non-empty".to_string(),
            ));
        }

        let mut seen_keys = HashSet::with_capacity(resources.len());
        let mut primary_http_count = 0;
        for r in &resources {
            if !seen_keys.insert(r.key.clone()) {
                return Err(BakeryError::InvalidArgument(format!(
                    "duplicate resource key: {}",
                    r.key
                )));
            }
            if r.protocol == Protocol::Http && r.expose == Expose::Primary {
                primary_http_count += 1;
            }
        }
        if primary_http_count > 1 {
            return Err(BakeryError::InvalidArgument(
                "at most one resource may be protocol=http, expose=primary".to_string(),
            ));
        }

        let ordinal = self.store.next_slice_ordinal(pie.id).await?;
        let host = format!("{}-s{}.{}", pie.slug, ordinal, self.host_suffix);

        let reserved = self.store.allocated_ports().await?;
        let ports = self
            .allocator
            .allocate_many(resources.len(), &reserved)
            .await?;

        let router_port = self.router_port.get();
        let new_resources: Vec<NewResource> = resources
            .iter()
            .zip(ports.iter())
            .map(|(r, &port)| {
                let route_host = match (r.protocol, r.expose) {
                    (Protocol::Http, Expose::Primary) => Some(host.clone()),
                    (Protocol::Http, Expose::Subdomain) => Some(format!("{}.{}", r.key, host)),
                    _ => None,
                };
                NewResource {
                    key: r.key.clone(),
                    allocated_port: port,
                    protocol: r.protocol,
                    expose: r.expose,
                    route_host,
                }
            })
            .collect();

        let persisted = self
            .store
            .create_slice_with_resources(pie.id, ordinal, &host, SliceStatus::Running, new_resources)
            .await?;

        let resource_views = persisted
            .resources
            .iter()
            .map(|res| {
                let route_url = res.route_host.as_ref().map(|rh| route_url(rh, router_port));
                SliceResourceView {
                    key: res.key.clone(),
                    protocol: res.protocol,
                    expose: res.expose,
                    allocated_port: res.allocated_port,
                    route_host: res.route_host.clone(),
                    route_url,
                }
            })
            .collect();

        Ok(OrchestratedSlice {
            slice: SliceView::from(&persisted.slice),
            resources: resource_views,
            pie_slug: pie.slug.clone(),
            router_port,
        })
    }

    /// Idempotently transitions the slice to `stopped`.
    pub async fn stop_slice(&self, slice_id: Uuid) -> Result<(), BakeryError> {
        self.store.update_slice_status(slice_id, SliceStatus::Stopped).await
    }

    /// Deletes the slice and its resources (cascade).
    pub async fn remove_slice(&self, slice_id: Uuid) -> Result<(), BakeryError> {
        self.store.delete_slice(slice_id).await
    }
}

/// `"http://" + routeHost + portSuffix`, where `portSuffix` is omitted for
/// the conventional HTTP/HTTPS ports.
fn route_url(route_host: &str, router_port: u16) -> String {
    if router_port == 80 || router_port == 443 {
        format!("http://{route_host}")
    } else {
        format!("http://{route_host}:{router_port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_store::Store;

    async fn orchestrator(router_port: u16) -> (SliceOrchestrator, Pie) {
        let store = Store::open_in_memory().await.unwrap();
        let pie = store.create_pie("My App", "my-app").await.unwrap();
        let orch = SliceOrchestrator::new(
            store,
            PortAllocator::new(31400, 31500),
            RouterPortHandle::new(router_port),
            "localtest.me".to_string(),
        );
        (orch, pie)
    }

    fn resource(key: &str, protocol: Protocol, expose: Expose) -> CreateSliceResource {
        CreateSliceResource {
            key: key.to_string(),
            protocol,
            expose,
        }
    }

    #[tokio::test]
    async fn create_slice_computes_host_and_primary_route_url() {
        let (orch, pie) = orchestrator(4080).await;
        let slice = orch
            .create_slice(&pie, vec![resource("web", Protocol::Http, Expose::Primary)])
            .await
            .unwrap();

        assert_eq!(slice.slice.host, "my-app-s1.localtest.me");
        assert_eq!(slice.slice.status, SliceStatus::Running);
        assert_eq!(
            slice.resources[0].route_url.as_deref(),
            Some("http://my-app-s1.localtest.me:4080")
        );
    }

    #[tokio::test]
    async fn route_url_omits_port_for_80_and_443() {
        let (orch, pie) = orchestrator(80).await;
        let slice = orch
            .create_slice(&pie, vec![resource("web", Protocol::Http, Expose::Primary)])
            .await
            .unwrap();
        assert_eq!(
            slice.resources[0].route_url.as_deref(),
            Some("http://my-app-s1.localtest.me")
        );
    }

    #[tokio::test]
    async fn subdomain_expose_prefixes_key() {
        let (orch, pie) = orchestrator(4080).await;
        let slice = orch
            .create_slice(&pie, vec![resource("api", Protocol::Http, Expose::Subdomain)])
            .await
            .unwrap();
        assert_eq!(
            slice.resources[0].route_host.as_deref(),
            Some("api.my-app-s1.localtest.me")
        );
    }

    #[tokio::test]
    async fn tcp_resources_have_no_route_host() {
        let (orch, pie) = orchestrator(4080).await;
        let slice = orch
            .create_slice(&pie, vec![resource("db", Protocol::Tcp, Expose::None)])
            .await
            .unwrap();
        assert!(slice.resources[0].route_host.is_none());
        assert!(slice.resources[0].route_url.is_none());
    }

    #[tokio::test]
    async fn empty_resources_is_invalid_argument() {
        let (orch, pie) = orchestrator(4080).await;
        let err = orch.create_slice(&pie, vec![]).await.unwrap_err();
        assert!(matches!(err, BakeryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn duplicate_keys_are_invalid_argument() {
        let (orch, pie) = orchestrator(4080).await;
        let err = orch
            .create_slice(
                &pie,
                vec![
                    resource("web", Protocol::Tcp, Expose::None),
                    resource("web", Protocol::Tcp, Expose::None),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn two_primary_http_resources_is_invalid_argument() {
        let (orch, pie) = orchestrator(4080).await;
        let err = orch
            .create_slice(
                &pie,
                vec![
                    resource("a", Protocol::Http, Expose::Primary),
                    resource("b", Protocol::Http, Expose::Primary),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn second_slice_gets_next_ordinal_and_distinct_host() {
        let (orch, pie) = orchestrator(4080).await;
        orch.create_slice(&pie, vec![resource("a", Protocol::Tcp, Expose::None)])
            .await
            .unwrap();
        let second = orch
            .create_slice(&pie, vec![resource("b", Protocol::Tcp, Expose::None)])
            .await
            .unwrap();
        assert_eq!(second.slice.host, "my-app-s2.localtest.me");
    }

    #[tokio::test]
    async fn stop_slice_is_idempotent() {
        let (orch, pie) = orchestrator(4080).await;
        let slice = orch
            .create_slice(&pie, vec![resource("web", Protocol::Tcp, Expose::None)])
            .await
            .unwrap();

        orch.stop_slice(slice.slice.id).await.unwrap();
        orch.stop_slice(slice.slice.id).await.unwrap();

        let fetched = orch.store().get_slice_by_id(slice.slice.id).await.unwrap().unwrap();
        assert_eq!(fetched.slice.status, SliceStatus::Stopped);
    }

    #[tokio::test]
    async fn remove_slice_deletes_resources() {
        let (orch, pie) = orchestrator(4080).await;
        let slice = orch
            .create_slice(&pie, vec![resource("web", Protocol::Tcp, Expose::None)])
            .await
            .unwrap();

        orch.remove_slice(slice.slice.id).await.unwrap();
        assert!(orch.store().get_slice_by_id(slice.slice.id).await.unwrap().is_none());
    }
}
