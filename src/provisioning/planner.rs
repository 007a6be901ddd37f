//! # Resource Planner
//!
//! Turns a validated [`LoadBalancerRequest`] into the load-balancer resources it implies:
//!
//! 1. one [`Server`] per resolvable hostname entry
//! 2. one [`ServiceGroup`] per server port with a single protocol and VIP port
//! 3. one [`ServerBinding`] per server whose port has a service group
//! 4. one [`LbVServer`] per VIP port with a single protocol and an allocated address
//! 5. one [`VServerBinding`] per service group whose VIP port has a virtual server
//!
//! Every stage runs even when earlier ones skipped units. Skipped units are reported as
//! [`PlanWarning`]s; planning itself never fails.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use crate::core::retry::RetryPolicy;
use crate::core::types::{
    AllocationScope, HostnameEntry, LbVServer, LoadBalancerRequest, Server, ServerBinding,
    ServiceGroup, VServerBinding,
};
use crate::discovery::{Resolution, Resolver};
use crate::ipam::AddressAllocator;
use crate::provisioning::report::{PlanWarning, ProvisioningPlan, StageOutcome};

/// Plans resources using the injected resolver and allocator
pub struct ResourcePlanner {
    resolver: Arc<dyn Resolver>,
    allocator: Arc<dyn AddressAllocator>,
    retry: RetryPolicy,
}

impl ResourcePlanner {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        allocator: Arc<dyn AddressAllocator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            resolver,
            allocator,
            retry,
        }
    }

    /// Run every stage for `request`
    #[instrument(
        skip(self, request),
        fields(app_name = %request.app_name, request_id = tracing::field::Empty)
    )]
    pub async fn plan(&self, request: &LoadBalancerRequest) -> ProvisioningPlan {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());

        let app_name = request.app_name.trim();
        let mut warnings = Vec::new();

        let servers = self
            .create_servers(app_name, &request.hostname_table_entries)
            .await;
        warnings.extend(servers.warnings);

        let service_groups = create_service_groups(app_name, &servers.resources);
        warnings.extend(service_groups.warnings);

        let server_bindings =
            bind_servers_to_service_groups(&servers.resources, &service_groups.resources);
        warnings.extend(server_bindings.warnings);

        let lb_vservers = self
            .create_lb_vservers(
                app_name,
                &servers.resources,
                &request.data_center,
                &request.network_zone,
            )
            .await;
        warnings.extend(lb_vservers.warnings);

        let vserver_bindings =
            bind_service_groups_to_vservers(&service_groups.resources, &lb_vservers.resources);
        warnings.extend(vserver_bindings.warnings);

        info!(
            servers = servers.resources.len(),
            service_groups = service_groups.resources.len(),
            lb_vservers = lb_vservers.resources.len(),
            warnings = warnings.len(),
            "Plan complete"
        );

        ProvisioningPlan {
            request_id,
            app_name: app_name.to_string(),
            settings: request.vserver_settings(),
            servers: servers.resources,
            service_groups: service_groups.resources,
            server_bindings: server_bindings.resources,
            lb_vservers: lb_vservers.resources,
            vserver_bindings: vserver_bindings.resources,
            warnings,
        }
    }

    /// Resolve each hostname entry into a [`Server`], preserving input order
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn create_servers(
        &self,
        app_name: &str,
        entries: &[HostnameEntry],
    ) -> StageOutcome<Server> {
        let mut outcome = StageOutcome::new();

        for entry in entries {
            let hostname = entry.server_name.trim();
            let resolution = self
                .retry
                .run("resolve_hostname", || self.resolver.resolve(hostname))
                .await;

            match resolution {
                Ok(Resolution::Found(address)) => {
                    debug!(hostname, %address, "Resolved server");
                    outcome.resources.push(Server {
                        server_name: Server::derive_name(hostname, entry.server_port),
                        hostname: hostname.to_string(),
                        address,
                        protocol: entry.protocol.clone(),
                        server_port: entry.server_port,
                        vip_port: entry.vip_port,
                    });
                }
                Ok(Resolution::NotFound) => skip(
                    &mut outcome.warnings,
                    PlanWarning::UnresolvedHost {
                        server_name: hostname.to_string(),
                    },
                ),
                Err(err) => skip(
                    &mut outcome.warnings,
                    PlanWarning::ResolutionFailed {
                        server_name: hostname.to_string(),
                        reason: err.to_string(),
                    },
                ),
            }
        }

        outcome
    }

    /// One virtual server per VIP port, addressed by the allocator
    #[instrument(skip(self, servers), fields(servers = servers.len()))]
    pub async fn create_lb_vservers(
        &self,
        app_name: &str,
        servers: &[Server],
        data_center: &str,
        network_zone: &str,
    ) -> StageOutcome<LbVServer> {
        let mut outcome = StageOutcome::new();

        for group in group_by_port(servers, |server| server.vip_port) {
            let Some(protocol) = group.sole_protocol() else {
                skip(
                    &mut outcome.warnings,
                    PlanWarning::OverloadedVipPort {
                        port: group.port,
                        protocols: group.protocol_list(),
                    },
                );
                continue;
            };

            let scope = AllocationScope {
                app_name: app_name.to_string(),
                vip_port: group.port,
                data_center: data_center.to_string(),
                network_zone: network_zone.to_string(),
            };

            match self
                .retry
                .run("allocate_address", || self.allocator.allocate(&scope))
                .await
            {
                Ok(ipv46) => outcome.resources.push(LbVServer {
                    lb_vserver_name: LbVServer::derive_name(app_name, group.port),
                    service_type: protocol.to_string(),
                    ipv46,
                    vip_port: group.port,
                }),
                Err(err) => skip(
                    &mut outcome.warnings,
                    PlanWarning::AddressAllocationFailed {
                        vip_port: group.port,
                        reason: err.to_string(),
                    },
                ),
            }
        }

        outcome
    }
}

/// One service group per server port
///
/// A port whose servers disagree on protocol or on VIP port gets no group.
pub fn create_service_groups(app_name: &str, servers: &[Server]) -> StageOutcome<ServiceGroup> {
    let mut outcome = StageOutcome::new();

    for group in group_by_port(servers, |server| server.server_port) {
        let Some(protocol) = group.sole_protocol() else {
            skip(
                &mut outcome.warnings,
                PlanWarning::OverloadedServerPort {
                    port: group.port,
                    protocols: group.protocol_list(),
                },
            );
            continue;
        };

        let Some(vip_port) = group.sole_vip_port() else {
            skip(
                &mut outcome.warnings,
                PlanWarning::DivergentVipPort {
                    server_port: group.port,
                    vip_ports: group.vip_ports.iter().copied().collect(),
                },
            );
            continue;
        };

        outcome.resources.push(ServiceGroup {
            service_group_name: ServiceGroup::derive_name(app_name, group.port),
            service_type: protocol.to_string(),
            server_port: group.port,
            vip_port,
        });
    }

    outcome
}

/// Bind each server to the first service group on its port
pub fn bind_servers_to_service_groups(
    servers: &[Server],
    service_groups: &[ServiceGroup],
) -> StageOutcome<ServerBinding> {
    let mut outcome = StageOutcome::new();

    for server in servers {
        match service_groups
            .iter()
            .find(|group| group.server_port == server.server_port)
        {
            Some(group) => outcome.resources.push(ServerBinding {
                service_group_name: group.service_group_name.clone(),
                server_name: server.server_name.clone(),
                server_port: server.server_port,
            }),
            None => skip(
                &mut outcome.warnings,
                PlanWarning::UnboundServer {
                    server_name: server.server_name.clone(),
                    server_port: server.server_port,
                },
            ),
        }
    }

    outcome
}

/// Bind each service group to the first virtual server on its VIP port
pub fn bind_service_groups_to_vservers(
    service_groups: &[ServiceGroup],
    lb_vservers: &[LbVServer],
) -> StageOutcome<VServerBinding> {
    let mut outcome = StageOutcome::new();

    for group in service_groups {
        match lb_vservers
            .iter()
            .find(|vserver| vserver.vip_port == group.vip_port)
        {
            Some(vserver) => outcome.resources.push(VServerBinding {
                lb_vserver_name: vserver.lb_vserver_name.clone(),
                service_group_name: group.service_group_name.clone(),
                vip_port: group.vip_port,
            }),
            None => skip(
                &mut outcome.warnings,
                PlanWarning::UnboundServiceGroup {
                    service_group_name: group.service_group_name.clone(),
                    vip_port: group.vip_port,
                },
            ),
        }
    }

    outcome
}

fn skip(warnings: &mut Vec<PlanWarning>, warning: PlanWarning) {
    warn!(kind = warning.kind(), "{}", warning);
    warnings.push(warning);
}

/// Servers sharing one port, with the distinct protocols and VIP ports among them
struct PortGroup<'a> {
    port: u16,
    protocols: BTreeSet<&'a str>,
    vip_ports: BTreeSet<u16>,
}

impl<'a> PortGroup<'a> {
    fn sole_protocol(&self) -> Option<&'a str> {
        match self.protocols.len() {
            1 => self.protocols.first().copied(),
            _ => None,
        }
    }

    fn sole_vip_port(&self) -> Option<u16> {
        match self.vip_ports.len() {
            1 => self.vip_ports.first().copied(),
            _ => None,
        }
    }

    fn protocol_list(&self) -> Vec<String> {
        self.protocols.iter().map(|p| p.to_string()).collect()
    }
}

/// Group servers by `port_of`, in order of first appearance
fn group_by_port<'a>(
    servers: &'a [Server],
    port_of: impl Fn(&Server) -> u16,
) -> Vec<PortGroup<'a>> {
    let mut groups: Vec<PortGroup<'a>> = Vec::new();

    for server in servers {
        let port = port_of(server);
        let index = match groups.iter().position(|group| group.port == port) {
            Some(index) => index,
            None => {
                groups.push(PortGroup {
                    port,
                    protocols: BTreeSet::new(),
                    vip_ports: BTreeSet::new(),
                });
                groups.len() - 1
            }
        };

        groups[index].protocols.insert(server.protocol.as_str());
        groups[index].vip_ports.insert(server.vip_port);
    }

    groups
}
