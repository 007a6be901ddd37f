//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lb_provisioner::core::types::AllocationScope;
use lb_provisioner::discovery::StaticResolver;
use lb_provisioner::ipam::FixedAllocator;
use lb_provisioner::load_balancing::DryRunClient;
use lb_provisioner::{
    AddressAllocator, LbVServer, LoadBalancerClient, ProvisionerError, ProvisionerResult,
    ProvisioningService, Resolution, ResourcePlanner, Resolver, RetryPolicy, Server,
    ServerBinding, ServiceGroup, VServerBinding, VServerSettings,
};

pub fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Retry policy with millisecond backoff so retry tests stay fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(5),
        2.0,
        Duration::from_secs(2),
    )
}

pub fn web_resolver() -> Arc<StaticResolver> {
    Arc::new(StaticResolver::new([
        ("web1", addr("192.168.1.10")),
        ("web2", addr("192.168.1.11")),
        ("db1", addr("192.168.2.10")),
    ]))
}

pub fn planner() -> ResourcePlanner {
    ResourcePlanner::new(web_resolver(), Arc::new(FixedAllocator::default()), fast_retry())
}

pub fn dry_run_service() -> ProvisioningService {
    ProvisioningService::new(
        web_resolver(),
        Arc::new(FixedAllocator::default()),
        Arc::new(DryRunClient),
        fast_retry(),
    )
}

pub fn entry(server_name: &str, server_port: u16, vip_port: u16, protocol: &str) -> Value {
    json!({
        "serverName": server_name,
        "serverPort": server_port,
        "vipPort": vip_port,
        "protocol": protocol,
    })
}

pub fn request_json(entries: Vec<Value>) -> Value {
    json!({
        "appName": "app",
        "dataCenter": "dc1",
        "networkZone": "dmz",
        "hostnameTableEntries": entries,
        "loadBalanceMethod": "ROUNDROBIN",
        "loadBalancePersistencyType": "SOURCEIP",
        "loadBalancePersistencyTimeout": 2,
        "comments": "ticket 42",
    })
}

/// Resolver that fails with a transient error a fixed number of times
pub struct FlakyResolver {
    pub failures_left: AtomicU32,
    pub calls: AtomicU32,
    pub address: IpAddr,
}

impl FlakyResolver {
    pub fn new(failures: u32, address: IpAddr) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            address,
        }
    }
}

#[async_trait]
impl Resolver for FlakyResolver {
    async fn resolve(&self, hostname: &str) -> ProvisionerResult<Resolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(ProvisionerError::resolution(hostname, "SERVFAIL"));
        }
        Ok(Resolution::Found(self.address))
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Allocator that records every scope it is asked for
pub struct RecordingAllocator {
    pub scopes: Mutex<Vec<AllocationScope>>,
    pub result: ProvisionerResult<IpAddr>,
}

impl RecordingAllocator {
    pub fn returning(address: IpAddr) -> Self {
        Self {
            scopes: Mutex::new(Vec::new()),
            result: Ok(address),
        }
    }

    pub fn failing(error: ProvisionerError) -> Self {
        Self {
            scopes: Mutex::new(Vec::new()),
            result: Err(error),
        }
    }

    pub fn scopes(&self) -> Vec<AllocationScope> {
        self.scopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddressAllocator for RecordingAllocator {
    async fn allocate(&self, scope: &AllocationScope) -> ProvisionerResult<IpAddr> {
        self.scopes.lock().unwrap().push(scope.clone());
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Load balancer client that records calls and fails the resources it is told to
#[derive(Default)]
pub struct RecordingClient {
    pub calls: Mutex<Vec<String>>,
    pub failing: HashSet<String>,
    pub failure_status: u16,
    pub settings: Mutex<Vec<VServerSettings>>,
    pub delay: Duration,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            failure_status: 400,
            ..Default::default()
        }
    }

    pub fn failing_on(names: &[&str], status: u16) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            failure_status: status,
            ..Default::default()
        }
    }

    /// Every call takes `delay` before it is recorded
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn call(&self, operation: &str, name: &str) -> ProvisionerResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, name));

        if self.failing.contains(name) {
            Err(ProvisionerError::vendor(
                operation,
                self.failure_status,
                "rejected by test client",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LoadBalancerClient for RecordingClient {
    async fn create_server(&self, server: &Server) -> ProvisionerResult<()> {
        self.call("create_server", &server.server_name).await
    }

    async fn create_service_group(&self, group: &ServiceGroup) -> ProvisionerResult<()> {
        self.call("create_service_group", &group.service_group_name).await
    }

    async fn bind_server_to_service_group(
        &self,
        binding: &ServerBinding,
    ) -> ProvisionerResult<()> {
        self.call(
            "bind_server",
            &format!("{}/{}", binding.service_group_name, binding.server_name),
        )
        .await
    }

    async fn create_vserver(
        &self,
        vserver: &LbVServer,
        settings: &VServerSettings,
    ) -> ProvisionerResult<()> {
        self.settings.lock().unwrap().push(settings.clone());
        self.call("create_vserver", &vserver.lb_vserver_name).await
    }

    async fn bind_service_group_to_vserver(
        &self,
        binding: &VServerBinding,
    ) -> ProvisionerResult<()> {
        self.call(
            "bind_service_group",
            &format!("{}/{}", binding.lb_vserver_name, binding.service_group_name),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
