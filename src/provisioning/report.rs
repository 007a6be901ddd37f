//! Plan, warning and report records produced by one provisioning pass.

use serde::Serialize;
use std::fmt;

use crate::core::error::ProvisionerError;
use crate::core::types::{
    LbVServer, Server, ServerBinding, ServiceGroup, VServerBinding, VServerSettings,
};

/// Non-fatal problem found while planning; the affected unit is skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// The hostname has no address record
    UnresolvedHost {
        #[serde(rename = "serverName")]
        server_name: String,
    },

    /// The resolver kept failing for this hostname
    ResolutionFailed {
        #[serde(rename = "serverName")]
        server_name: String,
        reason: String,
    },

    /// Servers on this server port disagree on protocol
    OverloadedServerPort { port: u16, protocols: Vec<String> },

    /// Servers on this server port disagree on VIP port
    DivergentVipPort {
        #[serde(rename = "serverPort")]
        server_port: u16,
        #[serde(rename = "vipPorts")]
        vip_ports: Vec<u16>,
    },

    /// Servers on this VIP port disagree on protocol
    OverloadedVipPort { port: u16, protocols: Vec<String> },

    /// No address could be obtained for this VIP port
    AddressAllocationFailed {
        #[serde(rename = "vipPort")]
        vip_port: u16,
        reason: String,
    },

    /// No service group exists for this server's port
    UnboundServer {
        #[serde(rename = "serverName")]
        server_name: String,
        #[serde(rename = "serverPort")]
        server_port: u16,
    },

    /// No virtual server exists for this service group's VIP port
    UnboundServiceGroup {
        #[serde(rename = "serviceGroupName")]
        service_group_name: String,
        #[serde(rename = "vipPort")]
        vip_port: u16,
    },
}

impl PlanWarning {
    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedHost { .. } => "unresolved_host",
            Self::ResolutionFailed { .. } => "resolution_failed",
            Self::OverloadedServerPort { .. } => "overloaded_server_port",
            Self::DivergentVipPort { .. } => "divergent_vip_port",
            Self::OverloadedVipPort { .. } => "overloaded_vip_port",
            Self::AddressAllocationFailed { .. } => "address_allocation_failed",
            Self::UnboundServer { .. } => "unbound_server",
            Self::UnboundServiceGroup { .. } => "unbound_service_group",
        }
    }
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedHost { server_name } => {
                write!(f, "Server ({}) does not have a valid IP address", server_name)
            }
            Self::ResolutionFailed { server_name, reason } => {
                write!(f, "Server ({}) could not be resolved: {}", server_name, reason)
            }
            Self::OverloadedServerPort { port, protocols } => write!(
                f,
                "Server port {} is overloaded ({})",
                port,
                protocols.join(", ")
            ),
            Self::DivergentVipPort { server_port, vip_ports } => write!(
                f,
                "Server port {} maps to more than one VIP port ({:?})",
                server_port, vip_ports
            ),
            Self::OverloadedVipPort { port, protocols } => {
                write!(f, "VIP port {} is overloaded ({})", port, protocols.join(", "))
            }
            Self::AddressAllocationFailed { vip_port, reason } => {
                write!(f, "No address for VIP port {}: {}", vip_port, reason)
            }
            Self::UnboundServer { server_name, server_port } => write!(
                f,
                "Server {} has no service group for port {}",
                server_name, server_port
            ),
            Self::UnboundServiceGroup { service_group_name, vip_port } => write!(
                f,
                "Service group {} has no lb vserver for VIP port {}",
                service_group_name, vip_port
            ),
        }
    }
}

/// Resources a stage produced plus the units it skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome<T> {
    pub resources: Vec<T>,
    pub warnings: Vec<PlanWarning>,
}

impl<T> StageOutcome<T> {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<T> Default for StageOutcome<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the planner derived for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningPlan {
    pub request_id: String,
    pub app_name: String,
    pub settings: VServerSettings,
    pub servers: Vec<Server>,
    pub service_groups: Vec<ServiceGroup>,
    pub server_bindings: Vec<ServerBinding>,
    #[serde(rename = "lbVServers")]
    pub lb_vservers: Vec<LbVServer>,
    pub vserver_bindings: Vec<VServerBinding>,
    pub warnings: Vec<PlanWarning>,
}

/// Kind of load-balancer resource a step touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    ServiceGroup,
    ServerBinding,
    LbVServer,
    VServerBinding,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::ServiceGroup => "service_group",
            Self::ServerBinding => "server_binding",
            Self::LbVServer => "lb_vserver",
            Self::VServerBinding => "vserver_binding",
        }
    }
}

/// A step the load balancer did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningFailure {
    pub kind: ResourceKind,
    pub name: String,
    pub error: String,
    pub error_type: String,
    pub retryable: bool,
}

impl ProvisioningFailure {
    pub fn from_error(
        kind: ResourceKind,
        name: impl Into<String>,
        error: &ProvisionerError,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            error: error.to_string(),
            error_type: error.error_type().to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// A binding skipped because one side was never created
    pub fn dependency(kind: ResourceKind, name: impl Into<String>, missing: &str) -> Self {
        Self {
            kind,
            name: name.into(),
            error: format!("dependency {} was not created", missing),
            error_type: "dependency_failed".to_string(),
            retryable: false,
        }
    }

    /// A step not started because the request ran out of time
    pub fn deadline(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            error: "request deadline passed before this step started".to_string(),
            error_type: "deadline_exceeded".to_string(),
            retryable: true,
        }
    }
}

/// Response body of `POST /api/standardLoadBalRequest`
///
/// Lists what was actually created on the load balancer, what was skipped while planning
/// (`warnings`) and which steps the load balancer rejected (`failures`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningReport {
    /// Always `"it"`; older clients only check this key
    pub handled: &'static str,
    pub request_id: String,
    pub app_name: String,
    /// Name of the load balancer client that executed the plan
    pub load_balancer: String,
    /// True when nothing was skipped and nothing failed
    pub complete: bool,
    pub servers: Vec<Server>,
    pub service_groups: Vec<ServiceGroup>,
    pub server_bindings: Vec<ServerBinding>,
    #[serde(rename = "lbVServers")]
    pub lb_vservers: Vec<LbVServer>,
    pub vserver_bindings: Vec<VServerBinding>,
    pub warnings: Vec<PlanWarning>,
    pub failures: Vec<ProvisioningFailure>,
}
