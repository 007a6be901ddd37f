//! # Load Balancer Client
//!
//! Capability interface to the load-balancer control plane. The provisioning executor calls
//! one method per planned step; every method is idempotent by resource name, so re-running a
//! request against an appliance that already has some of the resources is safe.
//!
//! Implementations:
//! - [`DryRunClient`]: logs each step and succeeds (default when no appliance is configured)
//! - [`NitroClient`](crate::load_balancing::nitro::NitroClient): NetScaler NITRO REST API

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::core::config::LoadBalancerConfig;
use crate::core::error::ProvisionerResult;
use crate::core::types::{
    LbVServer, Server, ServerBinding, ServiceGroup, VServerBinding, VServerSettings,
};
use crate::load_balancing::nitro::NitroClient;

/// Operations the provisioner needs from a load balancer
#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    /// Create a server entity pointing at a backend address
    async fn create_server(&self, server: &Server) -> ProvisionerResult<()>;

    /// Create an empty service group
    async fn create_service_group(&self, group: &ServiceGroup) -> ProvisionerResult<()>;

    /// Add a server (on its port) as a member of a service group
    async fn bind_server_to_service_group(&self, binding: &ServerBinding) -> ProvisionerResult<()>;

    /// Create a load-balancing virtual server
    async fn create_vserver(
        &self,
        vserver: &LbVServer,
        settings: &VServerSettings,
    ) -> ProvisionerResult<()>;

    /// Bind a service group behind a virtual server
    async fn bind_service_group_to_vserver(
        &self,
        binding: &VServerBinding,
    ) -> ProvisionerResult<()>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Client that only logs what it would do
#[derive(Debug, Default, Clone)]
pub struct DryRunClient;

#[async_trait]
impl LoadBalancerClient for DryRunClient {
    async fn create_server(&self, server: &Server) -> ProvisionerResult<()> {
        info!(
            server_name = %server.server_name,
            ip = %server.address,
            "dry-run: create server"
        );
        Ok(())
    }

    async fn create_service_group(&self, group: &ServiceGroup) -> ProvisionerResult<()> {
        info!(
            service_group_name = %group.service_group_name,
            service_type = %group.service_type,
            "dry-run: create service group"
        );
        Ok(())
    }

    async fn bind_server_to_service_group(&self, binding: &ServerBinding) -> ProvisionerResult<()> {
        info!(
            service_group_name = %binding.service_group_name,
            server_name = %binding.server_name,
            port = binding.server_port,
            "dry-run: bind server to service group"
        );
        Ok(())
    }

    async fn create_vserver(
        &self,
        vserver: &LbVServer,
        settings: &VServerSettings,
    ) -> ProvisionerResult<()> {
        info!(
            lb_vserver_name = %vserver.lb_vserver_name,
            service_type = %vserver.service_type,
            ipv46 = %vserver.ipv46,
            port = vserver.vip_port,
            lb_method = ?settings.lb_method,
            persistence_type = ?settings.persistence_type,
            "dry-run: create lb vserver"
        );
        Ok(())
    }

    async fn bind_service_group_to_vserver(
        &self,
        binding: &VServerBinding,
    ) -> ProvisionerResult<()> {
        info!(
            service_group_name = %binding.service_group_name,
            lb_vserver_name = %binding.lb_vserver_name,
            port = binding.vip_port,
            "dry-run: bind service group to lb vserver"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

/// Create the client described by the configuration
pub fn create_client(
    config: &LoadBalancerConfig,
) -> ProvisionerResult<Arc<dyn LoadBalancerClient>> {
    let client: Arc<dyn LoadBalancerClient> = match config {
        LoadBalancerConfig::DryRun => Arc::new(DryRunClient),
        LoadBalancerConfig::Nitro(nitro) => Arc::new(NitroClient::new(nitro)?),
    };

    info!(client = client.name(), "Load balancer client initialized");
    Ok(client)
}
