//! Wire-protocol request/response shapes for the Control API (spec §6).

use crate::model::{Pie, Protocol, Slice, SliceStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePieRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSliceResource {
    pub key: String,
    pub protocol: Protocol,
    pub expose: crate::model::Expose,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSliceRequest {
    pub pie_id: String,
    pub resources: Vec<CreateSliceResource>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceResourceView {
    pub key: String,
    pub protocol: Protocol,
    pub expose: crate::model::Expose,
    pub allocated_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceView {
    pub id: Uuid,
    pub pie_id: Uuid,
    pub ordinal: u32,
    pub host: String,
    pub status: SliceStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub stopped_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&Slice> for SliceView {
    fn from(s: &Slice) -> Self {
        Self {
            id: s.id,
            pie_id: s.pie_id,
            ordinal: s.ordinal,
            host: s.host.clone(),
            status: s.status,
            created_at: s.created_at,
            stopped_at: s.stopped_at,
        }
    }
}

/// The orchestrator's return value for a successful slice creation:
/// the persisted slice, its resources in input order, and the daemon
/// context needed to synthesize route URLs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratedSlice {
    #[serde(flatten)]
    pub slice: SliceView,
    pub resources: Vec<SliceResourceView>,
    pub pie_slug: String,
    pub router_port: u16,
}

impl OrchestratedSlice {
    /// The derived `toSliceCreateOutput` projection from spec §8: the
    /// route URL of the unique (http, primary) resource if any, and the
    /// list of allocated ports in input order.
    pub fn to_slice_create_output(&self) -> SliceCreateOutput {
        let url = self
            .resources
            .iter()
            .find(|r| r.protocol == Protocol::Http && r.expose == crate::model::Expose::Primary)
            .and_then(|r| r.route_url.clone());
        SliceCreateOutput {
            url,
            allocated_ports: self.resources.iter().map(|r| r.allocated_port).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SliceCreateOutput {
    pub url: Option<String>,
    pub allocated_ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Pie> for PieView {
    fn from(p: &Pie) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            slug: p.slug.clone(),
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub port: u16,
    pub router_port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSlicesByPie {
    pub pie_id: Uuid,
    pub pie_name: String,
    pub pie_slug: String,
    pub total: u64,
    pub running: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSlicesByStatus {
    pub creating: u64,
    pub running: u64,
    pub stopped: u64,
    pub error: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDaemon {
    pub status: &'static str,
    pub host: String,
    pub port: u16,
    pub router_port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPies {
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSlices {
    pub total: u64,
    pub by_status: StatusSlicesByStatus,
    pub by_pie: Vec<StatusSlicesByPie>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub daemon: StatusDaemon,
    pub pies: StatusPies,
    pub slices: StatusSlices,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Expose;

    #[test]
    fn status_response_round_trips_through_json() {
        let resp = StatusResponse {
            daemon: StatusDaemon {
                status: "ok",
                host: "127.0.0.1".into(),
                port: 47123,
                router_port: 4080,
            },
            pies: StatusPies { total: 2 },
            slices: StatusSlices {
                total: 3,
                by_status: StatusSlicesByStatus {
                    creating: 0,
                    running: 2,
                    stopped: 1,
                    error: 0,
                },
                by_pie: vec![StatusSlicesByPie {
                    pie_id: Uuid::new_v4(),
                    pie_name: "My App".into(),
                    pie_slug: "my-app".into(),
                    total: 3,
                    running: 2,
                }],
            },
            generated_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        let reparsed: serde_json::Value = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(json, reparsed);
    }

    #[test]
    fn orchestrated_slice_projects_primary_http_url() {
        let slice = OrchestratedSlice {
            slice: SliceView {
                id: Uuid::new_v4(),
                pie_id: Uuid::new_v4(),
                ordinal: 1,
                host: "my-app-s1.localtest.me".into(),
                status: SliceStatus::Running,
                created_at: chrono::Utc::now(),
                stopped_at: None,
            },
            resources: vec![
                SliceResourceView {
                    key: "r1".into(),
                    protocol: Protocol::Http,
                    expose: Expose::Primary,
                    allocated_port: 30000,
                    route_host: Some("my-app-s1.localtest.me".into()),
                    route_url: Some("http://my-app-s1.localtest.me:4080".into()),
                },
                SliceResourceView {
                    key: "r2".into(),
                    protocol: Protocol::Tcp,
                    expose: Expose::None,
                    allocated_port: 30001,
                    route_host: None,
                    route_url: None,
                },
            ],
            pie_slug: "my-app".into(),
            router_port: 4080,
        };
        let out = slice.to_slice_create_output();
        assert_eq!(out.url.as_deref(), Some("http://my-app-s1.localtest.me:4080"));
        assert_eq!(out.allocated_ports, vec![30000, 30001]);
    }
}
