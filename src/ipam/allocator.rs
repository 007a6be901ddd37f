//! # Address Allocation
//!
//! Virtual servers need a routable VIP. The [`AddressAllocator`] trait hands one out per
//! virtual server; the scope (data center and network zone of the request) decides which
//! network it comes from.
//!
//! - [`FixedAllocator`] returns one configured address for everything.
//! - [`InfobloxAllocator`] reserves the next free address of a network through the Infoblox
//!   WAPI `func:nextavailableip` helper.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use crate::core::config::{InfobloxConfig, IpamConfig};
use crate::core::error::{ProvisionerError, ProvisionerResult};
use crate::core::types::{AllocationScope, LbVServer};

/// Hands out virtual server addresses
#[async_trait]
pub trait AddressAllocator: Send + Sync {
    /// Reserve an address for the virtual server described by `scope`
    async fn allocate(&self, scope: &AllocationScope) -> ProvisionerResult<IpAddr>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Allocator returning the same address every time
#[derive(Debug, Clone)]
pub struct FixedAllocator {
    address: IpAddr,
}

impl FixedAllocator {
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }
}

impl Default for FixedAllocator {
    fn default() -> Self {
        Self::new(IpAddr::from([10, 10, 10, 10]))
    }
}

#[async_trait]
impl AddressAllocator for FixedAllocator {
    async fn allocate(&self, _scope: &AllocationScope) -> ProvisionerResult<IpAddr> {
        Ok(self.address)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Reserves addresses from Infoblox
pub struct InfobloxAllocator {
    client: reqwest::Client,
    endpoint: Url,
    username: String,
    password: String,
    networks: HashMap<String, String>,
    default_network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixedAddressRecord {
    ipv4addr: String,
}

#[derive(Debug, Deserialize)]
struct WapiError {
    #[serde(rename = "Error", default)]
    error: String,
    #[serde(default)]
    text: String,
}

impl InfobloxAllocator {
    pub fn new(config: &InfobloxConfig) -> ProvisionerResult<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| ProvisionerError::config(format!("Invalid Infoblox url: {}", e)))?;
        let endpoint = base
            .join(&format!("wapi/{}/fixedaddress", config.wapi_version))
            .map_err(|e| ProvisionerError::config(format!("Invalid Infoblox url: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| {
                ProvisionerError::config(format!("Failed to build Infoblox client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            networks: config.networks.clone(),
            default_network: config.default_network.clone(),
        })
    }

    /// Network CIDR serving `scope`
    pub fn network_for(&self, scope: &AllocationScope) -> ProvisionerResult<&str> {
        self.networks
            .get(&scope.network_key())
            .or(self.default_network.as_ref())
            .map(String::as_str)
            .ok_or_else(|| {
                ProvisionerError::allocation(format!(
                    "no network configured for {}",
                    scope.network_key()
                ))
            })
    }

    /// Address already reserved under `comment` in `network`, if any
    async fn existing_reservation(
        &self,
        network: &str,
        comment: &str,
    ) -> ProvisionerResult<Option<IpAddr>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("network", network),
                ("comment", comment),
                ("_return_fields", "ipv4addr"),
            ])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(wapi_error(response).await);
        }

        let records: Vec<FixedAddressRecord> = response.json().await?;
        records
            .into_iter()
            .next()
            .map(|record| parse_address(&record.ipv4addr))
            .transpose()
    }
}

#[async_trait]
impl AddressAllocator for InfobloxAllocator {
    /// Reservations are tagged with the virtual server name, so a retry after a lost
    /// response finds the address reserved by the earlier attempt instead of taking another.
    #[instrument(skip(self), fields(network = tracing::field::Empty))]
    async fn allocate(&self, scope: &AllocationScope) -> ProvisionerResult<IpAddr> {
        let network = self.network_for(scope)?;
        tracing::Span::current().record("network", network);

        let comment = LbVServer::derive_name(&scope.app_name, scope.vip_port);
        if let Some(address) = self.existing_reservation(network, &comment).await? {
            info!(%address, network, "Reusing reserved virtual server address");
            return Ok(address);
        }

        let body = json!({
            "ipv4addr": format!("func:nextavailableip:{}", network),
            // Reservation without a client binding
            "mac": "00:00:00:00:00:00",
            "comment": comment,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("_return_fields", "ipv4addr")])
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(wapi_error(response).await);
        }

        let record: FixedAddressRecord = response.json().await?;
        let address = parse_address(&record.ipv4addr)?;
        info!(%address, network, "Reserved virtual server address");
        Ok(address)
    }

    fn name(&self) -> &'static str {
        "infoblox"
    }
}

fn parse_address(raw: &str) -> ProvisionerResult<IpAddr> {
    raw.parse::<IpAddr>().map_err(|_| {
        ProvisionerError::allocation(format!("Infoblox returned an invalid address: {}", raw))
    })
}

/// Map a failed WAPI response; grid-side failures are retryable
async fn wapi_error(response: reqwest::Response) -> ProvisionerError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<WapiError>(&text) {
        Ok(err) if !err.text.is_empty() => err.text,
        Ok(err) if !err.error.is_empty() => err.error,
        _ => text,
    };
    debug!(status = status.as_u16(), %message, "Infoblox rejected request");

    let message = format!("Infoblox returned {}: {}", status.as_u16(), message);
    if status.is_server_error() {
        ProvisionerError::allocation_unavailable(message)
    } else {
        ProvisionerError::allocation(message)
    }
}

/// Create the allocator described by the configuration
pub fn create_allocator(config: &IpamConfig) -> ProvisionerResult<Arc<dyn AddressAllocator>> {
    let allocator: Arc<dyn AddressAllocator> = match config {
        IpamConfig::Fixed { address } => Arc::new(FixedAllocator::new(*address)),
        IpamConfig::Infoblox(infoblox) => Arc::new(InfobloxAllocator::new(infoblox)?),
    };

    info!(allocator = allocator.name(), "Address allocator initialized");
    Ok(allocator)
}
