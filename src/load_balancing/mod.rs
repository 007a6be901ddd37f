pub mod client;
pub mod nitro;

pub use client::{create_client, DryRunClient, LoadBalancerClient};
pub use nitro::NitroClient;
