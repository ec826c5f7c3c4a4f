use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project/workspace grouping. Slices are checkouts of a pie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pie {
    pub id: Uuid,
    pub name: String,
    /// Lowercased, `[a-z0-9-]+`, length <= 32. Globally unique.
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a running slice. Transitions are monotone: creating -> running -> stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    Creating,
    Running,
    Stopped,
    Error,
}

impl SliceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceStatus::Creating => "creating",
            SliceStatus::Running => "running",
            SliceStatus::Stopped => "stopped",
            SliceStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SliceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(SliceStatus::Creating),
            "running" => Ok(SliceStatus::Running),
            "stopped" => Ok(SliceStatus::Stopped),
            "error" => Ok(SliceStatus::Error),
            other => Err(format!("unknown slice status: {other}")),
        }
    }
}

impl std::fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One running checkout of a pie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slice {
    pub id: Uuid,
    pub pie_id: Uuid,
    pub ordinal: u32,
    /// `<pie.slug>-s<ordinal>.<hostSuffix>`; globally unique.
    pub host: String,
    pub status: SliceStatus,
    pub created_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Protocol a slice resource is bound over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// How a resource is exposed through the router proxy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Expose {
    Primary,
    Subdomain,
    None,
}

impl Expose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expose::Primary => "primary",
            Expose::Subdomain => "subdomain",
            Expose::None => "none",
        }
    }
}

impl std::str::FromStr for Expose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Expose::Primary),
            "subdomain" => Ok(Expose::Subdomain),
            "none" => Ok(Expose::None),
            other => Err(format!("unknown expose mode: {other}")),
        }
    }
}

/// One port/route binding on a slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SliceResource {
    pub id: Uuid,
    pub slice_id: Uuid,
    /// `[a-z0-9][a-z0-9-]*`, length <= 64. Unique within the slice.
    pub key: String,
    /// Positive, globally unique across all resources ever active.
    pub allocated_port: u16,
    pub protocol: Protocol,
    pub expose: Expose,
    /// Present iff `protocol = http && expose in {primary, subdomain}`. Globally unique.
    pub route_host: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SliceResource {
    /// Derived: `protocol == http && expose == primary`.
    pub fn is_primary_http(&self) -> bool {
        self.protocol == Protocol::Http && self.expose == Expose::Primary
    }
}

/// Append-only event record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub pie_id: Option<Uuid>,
    pub slice_id: Option<Uuid>,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Derived join used by the router proxy to resolve a `Host` header to an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoute {
    pub route_host: String,
    pub allocated_port: u16,
    pub slice_id: Uuid,
    pub pie_id: Uuid,
    pub slice_status: SliceStatus,
}

/// A slice together with its resources, as returned by listing operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SliceWithResources {
    #[serde(flatten)]
    pub slice: Slice,
    pub resources: Vec<SliceResource>,
}
