//! # Core Types
//!
//! Request and resource records shared by the planner, the executor and the HTTP front end.
//!
//! Everything here is request-scoped: a [`LoadBalancerRequest`] is parsed once, the planner
//! derives [`Server`], [`ServiceGroup`] and [`LbVServer`] records plus their bindings from it,
//! and all of them are dropped once the response has been written.

use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;

use crate::core::error::{ProvisionerError, ProvisionerResult};

/// Body of `POST /api/standardLoadBalRequest`
///
/// Every key is required. A missing key is rejected by serde before any planning starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerRequest {
    pub app_name: String,
    pub data_center: String,
    pub network_zone: String,
    pub hostname_table_entries: Vec<HostnameEntry>,
    #[serde(rename = "loadBalanceMethod")]
    pub lb_method: String,
    #[serde(rename = "loadBalancePersistencyType")]
    pub lb_persistency_type: String,
    #[serde(
        rename = "loadBalancePersistencyTimeout",
        deserialize_with = "deserialize_u32"
    )]
    pub lb_persistency_timeout: u32,
    pub comments: String,
}

impl LoadBalancerRequest {
    /// Check the values serde cannot check on its own
    pub fn validate(&self) -> ProvisionerResult<()> {
        let app_name = self.app_name.trim();
        if app_name.is_empty() {
            return Err(ProvisionerError::validation("appName", "must not be empty"));
        }
        if app_name.chars().any(char::is_whitespace) {
            return Err(ProvisionerError::validation(
                "appName",
                "must not contain whitespace",
            ));
        }

        for (index, entry) in self.hostname_table_entries.iter().enumerate() {
            let field = |name: &str| format!("hostnameTableEntries[{}].{}", index, name);

            if entry.server_name.trim().is_empty() {
                return Err(ProvisionerError::validation(
                    field("serverName"),
                    "must not be empty",
                ));
            }
            if entry.server_port == 0 {
                return Err(ProvisionerError::validation(
                    field("serverPort"),
                    "must be between 1 and 65535",
                ));
            }
            if entry.vip_port == 0 {
                return Err(ProvisionerError::validation(
                    field("vipPort"),
                    "must be between 1 and 65535",
                ));
            }
            if entry.protocol.is_empty() {
                return Err(ProvisionerError::validation(field("protocol"), "must not be empty"));
            }
        }

        Ok(())
    }

    /// Settings applied to every virtual server created for this request
    pub fn vserver_settings(&self) -> VServerSettings {
        VServerSettings {
            lb_method: non_empty(&self.lb_method),
            persistence_type: non_empty(&self.lb_persistency_type),
            persistence_timeout: self.lb_persistency_timeout,
            comment: non_empty(&self.comments),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// One row of the hostname table submitted by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameEntry {
    pub server_name: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub server_port: u16,
    #[serde(deserialize_with = "deserialize_port")]
    pub vip_port: u16,
    #[serde(deserialize_with = "deserialize_protocol")]
    pub protocol: String,
}

/// A backend server, one per resolvable hostname entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Derived name: `<hostname>-<serverPort>`
    pub server_name: String,
    /// Hostname as submitted, before derivation
    pub hostname: String,
    pub address: IpAddr,
    pub protocol: String,
    pub server_port: u16,
    pub vip_port: u16,
}

impl Server {
    pub fn derive_name(hostname: &str, server_port: u16) -> String {
        format!("{}-{}", hostname, server_port)
    }
}

/// A pool of servers sharing one server port and protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    /// Derived name: `sg-<appName>-<serverPort>`
    pub service_group_name: String,
    pub service_type: String,
    pub server_port: u16,
    pub vip_port: u16,
}

impl ServiceGroup {
    pub fn derive_name(app_name: &str, server_port: u16) -> String {
        format!("sg-{}-{}", app_name, server_port)
    }
}

/// The externally addressable load-balancing virtual server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbVServer {
    /// Derived name: `lb-<appName>-<vipPort>`
    #[serde(rename = "lbVServerName")]
    pub lb_vserver_name: String,
    pub service_type: String,
    pub ipv46: IpAddr,
    pub vip_port: u16,
}

impl LbVServer {
    pub fn derive_name(app_name: &str, vip_port: u16) -> String {
        format!("lb-{}-{}", app_name, vip_port)
    }
}

/// Server to service group membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBinding {
    pub service_group_name: String,
    pub server_name: String,
    pub server_port: u16,
}

/// Service group to virtual server binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VServerBinding {
    #[serde(rename = "lbVServerName")]
    pub lb_vserver_name: String,
    pub service_group_name: String,
    pub vip_port: u16,
}

/// Request-level virtual server settings (LB method, persistence, comment)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VServerSettings {
    pub lb_method: Option<String>,
    pub persistence_type: Option<String>,
    pub persistence_timeout: u32,
    pub comment: Option<String>,
}

/// Where a virtual server address should come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationScope {
    pub app_name: String,
    pub vip_port: u16,
    pub data_center: String,
    pub network_zone: String,
}

impl AllocationScope {
    /// Key used to look up the IPAM network: `<dataCenter>/<networkZone>`
    pub fn network_key(&self) -> String {
        format!("{}/{}", self.data_center, self.network_zone)
    }
}

/// Web forms submit ports as strings, API clients as numbers; accept both
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Float(f64),
    Text(String),
}

impl NumberOrString {
    fn into_u64(self) -> Result<u64, String> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u64),
            Self::Float(f) => Err(format!("expected a whole number, got {}", f)),
            Self::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("expected a number, got {:?}", s)),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let value = NumberOrString::deserialize(deserializer)?
        .into_u64()
        .map_err(serde::de::Error::custom)?;
    u16::try_from(value)
        .map_err(|_| serde::de::Error::custom(format!("port {} is out of range", value)))
}

fn deserialize_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = NumberOrString::deserialize(deserializer)?
        .into_u64()
        .map_err(serde::de::Error::custom)?;
    u32::try_from(value)
        .map_err(|_| serde::de::Error::custom(format!("{} is out of range", value)))
}

/// NITRO service types are upper case (HTTP, SSL, TCP)
fn deserialize_protocol<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let protocol = String::deserialize(deserializer)?;
    Ok(protocol.trim().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_json() -> serde_json::Value {
        json!({
            "appName": "app",
            "dataCenter": "dc1",
            "networkZone": "dmz",
            "hostnameTableEntries": [
                {"serverName": "web1", "serverPort": 80, "vipPort": 443, "protocol": "http"},
                {"serverName": "web2", "serverPort": "80", "vipPort": "443", "protocol": " HTTP "}
            ],
            "loadBalanceMethod": "ROUNDROBIN",
            "loadBalancePersistencyType": "",
            "loadBalancePersistencyTimeout": 2,
            "comments": "ticket 42"
        })
    }

    #[test]
    fn test_request_parses_numbers_and_strings() {
        let request: LoadBalancerRequest = serde_json::from_value(request_json()).unwrap();
        assert_eq!(request.app_name, "app");
        assert_eq!(request.hostname_table_entries.len(), 2);
        assert_eq!(request.hostname_table_entries[1].server_port, 80);
        assert_eq!(request.hostname_table_entries[1].vip_port, 443);
        assert_eq!(request.hostname_table_entries[0].protocol, "HTTP");
        assert_eq!(request.hostname_table_entries[1].protocol, "HTTP");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let mut value = request_json();
        value.as_object_mut().unwrap().remove("networkZone");
        let err = serde_json::from_value::<LoadBalancerRequest>(value).unwrap_err();
        assert!(err.to_string().contains("networkZone"));
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let mut value = request_json();
        value["hostnameTableEntries"][0]["serverPort"] = json!(70000);
        assert!(serde_json::from_value::<LoadBalancerRequest>(value).is_err());
    }

    #[test]
    fn test_whole_float_numbers_are_accepted() {
        let mut value = request_json();
        value["loadBalancePersistencyTimeout"] = json!(2.0);
        value["hostnameTableEntries"][0]["serverPort"] = json!(80.0);
        let request: LoadBalancerRequest = serde_json::from_value(value).unwrap();
        assert_eq!(request.vserver_settings().persistence_timeout, 2);
        assert_eq!(request.hostname_table_entries[0].server_port, 80);

        let mut value = request_json();
        value["loadBalancePersistencyTimeout"] = json!(2.5);
        let err = serde_json::from_value::<LoadBalancerRequest>(value).unwrap_err();
        assert!(err.to_string().contains("whole number"));
    }

    #[test]
    fn test_validation_reports_field_path() {
        let mut value = request_json();
        value["hostnameTableEntries"][1]["vipPort"] = json!(0);
        let request: LoadBalancerRequest = serde_json::from_value(value).unwrap();
        match request.validate() {
            Err(ProvisionerError::RequestValidation { field, .. }) => {
                assert_eq!(field, "hostnameTableEntries[1].vipPort");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_app_name_is_invalid() {
        let mut value = request_json();
        value["appName"] = json!("  ");
        let request: LoadBalancerRequest = serde_json::from_value(value).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_vserver_settings_drop_blank_values() {
        let request: LoadBalancerRequest = serde_json::from_value(request_json()).unwrap();
        let settings = request.vserver_settings();
        assert_eq!(settings.lb_method.as_deref(), Some("ROUNDROBIN"));
        assert_eq!(settings.persistence_type, None);
        assert_eq!(settings.persistence_timeout, 2);
        assert_eq!(settings.comment.as_deref(), Some("ticket 42"));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(Server::derive_name("web1", 80), "web1-80");
        assert_eq!(ServiceGroup::derive_name("app", 80), "sg-app-80");
        assert_eq!(LbVServer::derive_name("app", 443), "lb-app-443");
    }
}
