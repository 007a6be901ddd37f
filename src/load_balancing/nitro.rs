//! # NITRO REST Client
//!
//! Talks to a Citrix NetScaler (ADC) through its NITRO configuration API:
//!
//! | step                    | method | resource                                |
//! |-------------------------|--------|-----------------------------------------|
//! | create server           | POST   | `server`                                |
//! | create service group    | POST   | `servicegroup`                          |
//! | bind server to group    | PUT    | `servicegroup_servicegroupmember_binding` |
//! | create lb vserver       | POST   | `lbvserver`                             |
//! | bind group to vserver   | PUT    | `lbvserver_servicegroup_binding`        |
//!
//! Creating something that already exists (HTTP 409 or NITRO errorcode 273) is treated as
//! success so that replaying a request is harmless.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::core::config::NitroConfig;
use crate::core::error::{ProvisionerError, ProvisionerResult};
use crate::core::types::{
    LbVServer, Server, ServerBinding, ServiceGroup, VServerBinding, VServerSettings,
};
use crate::load_balancing::client::LoadBalancerClient;

/// NITRO errorcode for "Resource already exists"
const ERRORCODE_ALREADY_EXISTS: i64 = 273;

/// NetScaler NITRO API client
pub struct NitroClient {
    client: reqwest::Client,
    base: Url,
    username: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
struct NitroResponse {
    #[serde(default)]
    errorcode: i64,
    #[serde(default)]
    message: String,
}

impl NitroClient {
    pub fn new(config: &NitroConfig) -> ProvisionerResult<Self> {
        let base = Url::parse(&config.url)
            .and_then(|url| url.join("nitro/v1/config/"))
            .map_err(|e| ProvisionerError::config(format!("Invalid NITRO url: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ProvisionerError::config(format!("Failed to build NITRO client: {}", e)))?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// URL of a NITRO config resource
    pub fn resource_url(&self, resource: &str) -> ProvisionerResult<Url> {
        self.base.join(resource).map_err(|e| {
            ProvisionerError::internal(format!("Invalid NITRO resource {}: {}", resource, e))
        })
    }

    /// Send `{"<resource>": payload}` and interpret the NITRO response
    async fn send(
        &self,
        operation: &str,
        method: Method,
        resource: &str,
        payload: Value,
    ) -> ProvisionerResult<()> {
        let url = self.resource_url(resource)?;
        let mut body = Map::new();
        body.insert(resource.to_string(), payload);

        debug!(operation, %url, "NITRO request");

        let response = self
            .client
            .request(method, url)
            .header("X-NITRO-USER", &self.username)
            .header("X-NITRO-PASS", &self.password)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let nitro: NitroResponse = serde_json::from_str(&text).unwrap_or_default();

        if status.is_success() && nitro.errorcode == 0 {
            return Ok(());
        }

        if status == StatusCode::CONFLICT || nitro.errorcode == ERRORCODE_ALREADY_EXISTS {
            debug!(operation, "Resource already exists, treating as created");
            return Ok(());
        }

        let message = if nitro.message.is_empty() {
            text
        } else {
            format!("{} (errorcode {})", nitro.message, nitro.errorcode)
        };

        Err(ProvisionerError::vendor(operation, status.as_u16(), message))
    }
}

fn insert_opt(object: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value.clone()));
    }
}

/// `lbvserver` payload with the optional request-level settings
fn vserver_payload(vserver: &LbVServer, settings: &VServerSettings) -> Value {
    let mut object = Map::new();
    object.insert("name".into(), json!(vserver.lb_vserver_name));
    object.insert("servicetype".into(), json!(vserver.service_type));
    object.insert("ipv46".into(), json!(vserver.ipv46.to_string()));
    object.insert("port".into(), json!(vserver.vip_port));
    insert_opt(&mut object, "lbmethod", &settings.lb_method);
    insert_opt(&mut object, "persistencetype", &settings.persistence_type);
    if settings.persistence_type.is_some() && settings.persistence_timeout > 0 {
        object.insert("timeout".into(), json!(settings.persistence_timeout));
    }
    insert_opt(&mut object, "comment", &settings.comment);
    Value::Object(object)
}

#[async_trait]
impl LoadBalancerClient for NitroClient {
    #[instrument(skip(self, server), fields(server_name = %server.server_name))]
    async fn create_server(&self, server: &Server) -> ProvisionerResult<()> {
        self.send(
            "create_server",
            Method::POST,
            "server",
            json!({
                "name": server.server_name,
                "ipaddress": server.address.to_string(),
            }),
        )
        .await
    }

    #[instrument(skip(self, group), fields(service_group_name = %group.service_group_name))]
    async fn create_service_group(&self, group: &ServiceGroup) -> ProvisionerResult<()> {
        self.send(
            "create_service_group",
            Method::POST,
            "servicegroup",
            json!({
                "servicegroupname": group.service_group_name,
                "servicetype": group.service_type,
            }),
        )
        .await
    }

    #[instrument(skip(self, binding), fields(service_group_name = %binding.service_group_name))]
    async fn bind_server_to_service_group(&self, binding: &ServerBinding) -> ProvisionerResult<()> {
        self.send(
            "bind_server_to_service_group",
            Method::PUT,
            "servicegroup_servicegroupmember_binding",
            json!({
                "servicegroupname": binding.service_group_name,
                "servername": binding.server_name,
                "port": binding.server_port,
            }),
        )
        .await
    }

    #[instrument(skip(self, vserver, settings), fields(lb_vserver_name = %vserver.lb_vserver_name))]
    async fn create_vserver(
        &self,
        vserver: &LbVServer,
        settings: &VServerSettings,
    ) -> ProvisionerResult<()> {
        self.send(
            "create_vserver",
            Method::POST,
            "lbvserver",
            vserver_payload(vserver, settings),
        )
        .await
    }

    #[instrument(skip(self, binding), fields(lb_vserver_name = %binding.lb_vserver_name))]
    async fn bind_service_group_to_vserver(
        &self,
        binding: &VServerBinding,
    ) -> ProvisionerResult<()> {
        self.send(
            "bind_service_group_to_vserver",
            Method::PUT,
            "lbvserver_servicegroup_binding",
            json!({
                "name": binding.lb_vserver_name,
                "servicegroupname": binding.service_group_name,
            }),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "nitro"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn vserver() -> LbVServer {
        LbVServer {
            lb_vserver_name: "lb-app-443".to_string(),
            service_type: "SSL".to_string(),
            ipv46: "10.10.10.10".parse().unwrap(),
            vip_port: 443,
        }
    }

    #[test]
    fn test_resource_url() {
        let client = NitroClient::new(&NitroConfig {
            url: "https://ns.example.com".to_string(),
            username: "nsroot".to_string(),
            password: "nsroot".to_string(),
            timeout: Duration::from_secs(1),
            accept_invalid_certs: false,
        })
        .unwrap();

        assert_eq!(
            client.resource_url("lbvserver").unwrap().as_str(),
            "https://ns.example.com/nitro/v1/config/lbvserver"
        );
    }

    #[test]
    fn test_vserver_payload_without_settings() {
        let payload = vserver_payload(&vserver(), &VServerSettings::default());
        assert_eq!(
            payload,
            json!({
                "name": "lb-app-443",
                "servicetype": "SSL",
                "ipv46": "10.10.10.10",
                "port": 443,
            })
        );
    }

    #[test]
    fn test_vserver_payload_with_settings() {
        let settings = VServerSettings {
            lb_method: Some("LEASTCONNECTION".to_string()),
            persistence_type: Some("SOURCEIP".to_string()),
            persistence_timeout: 5,
            comment: Some("ticket 42".to_string()),
        };
        let payload = vserver_payload(&vserver(), &settings);
        assert_eq!(payload["lbmethod"], "LEASTCONNECTION");
        assert_eq!(payload["persistencetype"], "SOURCEIP");
        assert_eq!(payload["timeout"], 5);
        assert_eq!(payload["comment"], "ticket 42");
    }

    #[test]
    fn test_persistence_timeout_needs_persistence_type() {
        let settings = VServerSettings {
            persistence_timeout: 5,
            ..Default::default()
        };
        let payload = vserver_payload(&vserver(), &settings);
        assert!(payload.get("timeout").is_none());
    }
}
