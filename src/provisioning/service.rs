//! Request-level entry point: validate, plan, execute, report.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::core::config::ProvisionerConfig;
use crate::core::error::ProvisionerResult;
use crate::core::retry::RetryPolicy;
use crate::core::types::LoadBalancerRequest;
use crate::discovery::{create_resolver, Resolver};
use crate::ipam::{create_allocator, AddressAllocator};
use crate::load_balancing::{create_client, LoadBalancerClient};
use crate::observability::metrics::{record_report, record_request};
use crate::provisioning::executor::ProvisioningExecutor;
use crate::provisioning::planner::ResourcePlanner;
use crate::provisioning::report::ProvisioningReport;

/// Planner and executor sharing one retry policy
pub struct ProvisioningService {
    planner: ResourcePlanner,
    executor: ProvisioningExecutor,
    deadline: Option<Duration>,
}

impl ProvisioningService {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        allocator: Arc<dyn AddressAllocator>,
        client: Arc<dyn LoadBalancerClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            planner: ResourcePlanner::new(resolver, allocator, retry.clone()),
            executor: ProvisioningExecutor::new(client, retry),
            deadline: None,
        }
    }

    /// Start no load balancer step once `deadline` has elapsed since the request arrived
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build every adapter from configuration
    pub fn from_config(config: &ProvisionerConfig) -> ProvisionerResult<Self> {
        Ok(Self::new(
            create_resolver(&config.dns)?,
            create_allocator(&config.ipam)?,
            create_client(&config.load_balancer)?,
            RetryPolicy::from_config(&config.retry),
        )
        .with_deadline(config.server.request_timeout))
    }

    pub fn planner(&self) -> &ResourcePlanner {
        &self.planner
    }

    /// Name of the load balancer client plans are applied with
    pub fn client_name(&self) -> &'static str {
        self.executor.client_name()
    }

    /// Provision everything `request` describes
    ///
    /// Only an invalid request is an error; skipped units and rejected steps are listed in the
    /// report.
    #[instrument(skip(self, request), fields(app_name = %request.app_name))]
    pub async fn provision(
        &self,
        request: LoadBalancerRequest,
    ) -> ProvisionerResult<ProvisioningReport> {
        let deadline = self.deadline.map(|limit| Instant::now() + limit);

        if let Err(err) = request.validate() {
            record_request("rejected");
            return Err(err);
        }

        let plan = self.planner.plan(&request).await;
        let report = self.executor.execute_until(plan, deadline).await;
        record_report(&report);

        info!(
            request_id = %report.request_id,
            client = self.executor.client_name(),
            complete = report.complete,
            warnings = report.warnings.len(),
            failures = report.failures.len(),
            "Provisioning request handled"
        );

        Ok(report)
    }
}
