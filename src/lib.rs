//! # LB Provisioner Library
//!
//! Provisions NetScaler load-balancing resources from a hostname table: servers, service
//! groups, load-balancing virtual servers and the bindings between them.
//!
//! A request flows through three layers:
//! - the HTTP front end (`gateway`) parses and validates the submitted JSON
//! - the planner (`provisioning`) resolves hostnames, groups servers by port, allocates
//!   virtual server addresses and reports every unit it had to skip
//! - the executor (`provisioning`) applies the plan through a load balancer client
//!
//! External systems sit behind traits so they can be swapped for test doubles:
//! [`Resolver`] for DNS, [`AddressAllocator`] for IPAM and [`LoadBalancerClient`] for the
//! appliance.

/// Error types, configuration, retry policy and request/resource records
pub mod core;

/// DNS resolution of backend hostnames
pub mod discovery;

/// Virtual server address allocation (fixed address or Infoblox)
pub mod ipam;

/// Load balancer control plane clients (dry run or NITRO)
pub mod load_balancing;

/// Resource planning and execution
pub mod provisioning;

/// HTTP server, handlers and static file serving
pub mod gateway;

/// Logging and metrics setup
pub mod observability;

pub use core::config::ProvisionerConfig;
pub use core::error::{ProvisionerError, ProvisionerResult};
pub use core::retry::RetryPolicy;
pub use core::types::{
    HostnameEntry, LbVServer, LoadBalancerRequest, Server, ServerBinding, ServiceGroup,
    VServerBinding, VServerSettings,
};
pub use discovery::{Resolution, Resolver};
pub use gateway::{create_app, AppState, ProvisionerServer};
pub use ipam::AddressAllocator;
pub use load_balancing::LoadBalancerClient;
pub use provisioning::{PlanWarning, ProvisioningReport, ProvisioningService, ResourcePlanner};
