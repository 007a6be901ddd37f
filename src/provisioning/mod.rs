pub mod executor;
pub mod planner;
pub mod report;
pub mod service;

pub use executor::ProvisioningExecutor;
pub use planner::{
    bind_servers_to_service_groups, bind_service_groups_to_vservers, create_service_groups,
    ResourcePlanner,
};
pub use report::{
    PlanWarning, ProvisioningFailure, ProvisioningPlan, ProvisioningReport, ResourceKind,
    StageOutcome,
};
pub use service::ProvisioningService;
