use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state reported by the provider for a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Other(s) => s,
        }
    }
}

impl FromStr for InstanceState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Other(other.to_string()),
        })
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role assigned to an instance when it was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<NodeRole> {
        match s {
            "master" => Some(NodeRole::Master),
            "worker" => Some(NodeRole::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRow {
    pub reservation_id: String,
    pub owner_id: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub instance_id: String,
    pub image_id: String,
    pub external_hostname: String,
    pub internal_hostname: String,
    pub state: InstanceState,
    pub launch_time: Option<DateTime<Utc>>,
    /// Role tag attached at launch, if the instance carries one.
    pub role: Option<NodeRole>,
}

/// One row of a describe-instances response. Reservation rows are interleaved
/// with the instance rows they group, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRecord {
    Reservation(ReservationRow),
    Instance(InstanceRow),
}

impl InstanceRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            InstanceRecord::Reservation(_) => "RESERVATION",
            InstanceRecord::Instance(_) => "INSTANCE",
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceRow> {
        match self {
            InstanceRecord::Instance(row) => Some(row),
            InstanceRecord::Reservation(_) => None,
        }
    }
}

impl fmt::Display for InstanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceRecord::Reservation(r) => {
                write!(f, "RESERVATION {} {} {}", r.reservation_id, r.owner_id, r.groups.join(","))
            }
            InstanceRecord::Instance(i) => write!(
                f,
                "INSTANCE {} {} {} {} {}",
                i.instance_id, i.image_id, i.external_hostname, i.internal_hostname, i.state
            ),
        }
    }
}

/// Iterate the instance rows of a response, skipping reservations.
pub fn instance_rows(records: &[InstanceRecord]) -> impl Iterator<Item = &InstanceRow> {
    records.iter().filter_map(InstanceRecord::as_instance)
}
