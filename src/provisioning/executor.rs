//! Applies a [`ProvisioningPlan`] to the load balancer.
//!
//! Steps run in dependency order. A failed step is recorded and the walk continues; bindings
//! whose server, service group or virtual server was not created are skipped as
//! `dependency_failed`. Once the deadline passes no further step is started; the remaining
//! ones are listed as `deadline_exceeded` so the caller learns what was left undone.

use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{instrument, warn};

use crate::core::error::ProvisionerResult;
use crate::core::retry::RetryPolicy;
use crate::load_balancing::LoadBalancerClient;
use crate::provisioning::report::{
    ProvisioningFailure, ProvisioningPlan, ProvisioningReport, ResourceKind,
};

pub struct ProvisioningExecutor {
    client: Arc<dyn LoadBalancerClient>,
    retry: RetryPolicy,
}

impl ProvisioningExecutor {
    pub fn new(client: Arc<dyn LoadBalancerClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    pub async fn execute(&self, plan: ProvisioningPlan) -> ProvisioningReport {
        self.execute_until(plan, None).await
    }

    /// Apply `plan`, starting no step after `deadline`
    #[instrument(
        skip(self, plan, deadline),
        fields(request_id = %plan.request_id, client = self.client.name())
    )]
    pub async fn execute_until(
        &self,
        plan: ProvisioningPlan,
        deadline: Option<Instant>,
    ) -> ProvisioningReport {
        let client = &self.client;
        let mut failures = Vec::new();
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);

        let mut servers = Vec::new();
        for server in plan.servers {
            if expired() {
                failures.push(ProvisioningFailure::deadline(
                    ResourceKind::Server,
                    &server.server_name,
                ));
                continue;
            }
            let result = self
                .retry
                .run("create_server", || client.create_server(&server))
                .await;
            if record(result, ResourceKind::Server, &server.server_name, &mut failures) {
                servers.push(server);
            }
        }

        let mut service_groups = Vec::new();
        for group in plan.service_groups {
            if expired() {
                failures.push(ProvisioningFailure::deadline(
                    ResourceKind::ServiceGroup,
                    &group.service_group_name,
                ));
                continue;
            }
            let result = self
                .retry
                .run("create_service_group", || client.create_service_group(&group))
                .await;
            if record(
                result,
                ResourceKind::ServiceGroup,
                &group.service_group_name,
                &mut failures,
            ) {
                service_groups.push(group);
            }
        }

        let created_servers: HashSet<String> =
            servers.iter().map(|s| s.server_name.clone()).collect();
        let created_groups: HashSet<String> = service_groups
            .iter()
            .map(|g| g.service_group_name.clone())
            .collect();

        let mut server_bindings = Vec::new();
        for binding in plan.server_bindings {
            let name = format!("{}/{}", binding.service_group_name, binding.server_name);
            let missing = if !created_servers.contains(&binding.server_name) {
                Some(&binding.server_name)
            } else if !created_groups.contains(&binding.service_group_name) {
                Some(&binding.service_group_name)
            } else {
                None
            };

            if let Some(missing) = missing {
                failures.push(ProvisioningFailure::dependency(
                    ResourceKind::ServerBinding,
                    name,
                    missing,
                ));
                continue;
            }
            if expired() {
                failures.push(ProvisioningFailure::deadline(ResourceKind::ServerBinding, name));
                continue;
            }

            let result = self
                .retry
                .run("bind_server_to_service_group", || {
                    client.bind_server_to_service_group(&binding)
                })
                .await;
            if record(result, ResourceKind::ServerBinding, &name, &mut failures) {
                server_bindings.push(binding);
            }
        }

        let mut lb_vservers = Vec::new();
        for vserver in plan.lb_vservers {
            if expired() {
                failures.push(ProvisioningFailure::deadline(
                    ResourceKind::LbVServer,
                    &vserver.lb_vserver_name,
                ));
                continue;
            }
            let result = self
                .retry
                .run("create_vserver", || client.create_vserver(&vserver, &plan.settings))
                .await;
            if record(
                result,
                ResourceKind::LbVServer,
                &vserver.lb_vserver_name,
                &mut failures,
            ) {
                lb_vservers.push(vserver);
            }
        }

        let created_vservers: HashSet<String> = lb_vservers
            .iter()
            .map(|v| v.lb_vserver_name.clone())
            .collect();

        let mut vserver_bindings = Vec::new();
        for binding in plan.vserver_bindings {
            let name = format!("{}/{}", binding.lb_vserver_name, binding.service_group_name);
            let missing = if !created_groups.contains(&binding.service_group_name) {
                Some(&binding.service_group_name)
            } else if !created_vservers.contains(&binding.lb_vserver_name) {
                Some(&binding.lb_vserver_name)
            } else {
                None
            };

            if let Some(missing) = missing {
                failures.push(ProvisioningFailure::dependency(
                    ResourceKind::VServerBinding,
                    name,
                    missing,
                ));
                continue;
            }
            if expired() {
                failures.push(ProvisioningFailure::deadline(ResourceKind::VServerBinding, name));
                continue;
            }

            let result = self
                .retry
                .run("bind_service_group_to_vserver", || {
                    client.bind_service_group_to_vserver(&binding)
                })
                .await;
            if record(result, ResourceKind::VServerBinding, &name, &mut failures) {
                vserver_bindings.push(binding);
            }
        }

        ProvisioningReport {
            handled: "it",
            request_id: plan.request_id,
            app_name: plan.app_name,
            load_balancer: self.client.name().to_string(),
            complete: plan.warnings.is_empty() && failures.is_empty(),
            servers,
            service_groups,
            server_bindings,
            lb_vservers,
            vserver_bindings,
            warnings: plan.warnings,
            failures,
        }
    }
}

/// Count a created resource or keep the failure; true when the step succeeded
fn record(
    result: ProvisionerResult<()>,
    kind: ResourceKind,
    name: &str,
    failures: &mut Vec<ProvisioningFailure>,
) -> bool {
    match result {
        Ok(()) => {
            counter!("provisioner_resources_created_total", "kind" => kind.as_str())
                .increment(1);
            true
        }
        Err(err) => {
            warn!(kind = kind.as_str(), name, error = %err, "Provisioning step failed");
            failures.push(ProvisioningFailure::from_error(kind, name, &err));
            false
        }
    }
}
