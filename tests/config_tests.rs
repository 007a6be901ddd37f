//! # Configuration Tests

use std::net::IpAddr;
use std::time::Duration;

use lb_provisioner::core::config::{IpamConfig, LoadBalancerConfig, LogFormat};
use lb_provisioner::{ProvisionerConfig, ProvisioningService};

#[test]
fn test_example_config_parses_and_validates() {
    let content = std::fs::read_to_string(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/config/provisioner.example.yaml"
    ))
    .expect("example config missing");

    let config: ProvisionerConfig = serde_yaml::from_str(&content).expect("example config invalid");
    config.validate().expect("example config does not validate");

    assert_eq!(config.server.request_timeout, Duration::from_secs(120));
    assert_eq!(config.retry.initial_backoff, Duration::from_millis(200));
    assert_eq!(config.observability.logging.format, LogFormat::Json);

    match &config.ipam {
        IpamConfig::Infoblox(infoblox) => {
            assert_eq!(infoblox.networks["dc1/dmz"], "10.20.0.0/24");
            assert_eq!(infoblox.default_network.as_deref(), Some("10.99.0.0/24"));
        }
        other => panic!("unexpected ipam config: {:?}", other),
    }

    match &config.load_balancer {
        LoadBalancerConfig::Nitro(nitro) => assert_eq!(nitro.username, "nsroot"),
        other => panic!("unexpected load balancer config: {:?}", other),
    }
}

#[test]
fn test_service_builds_from_offline_config() {
    let mut config = ProvisionerConfig::default();
    config.dns.use_system_resolver = false;
    config
        .dns
        .static_hosts
        .insert("web1".to_string(), "192.168.1.10".parse::<IpAddr>().unwrap());

    let service = ProvisioningService::from_config(&config).expect("service from config");
    assert_eq!(service.client_name(), "dry-run");
}

#[test]
fn test_invalid_sections_are_all_reported() {
    let yaml = r#"
server:
  http_port: 0
retry:
  max_attempts: 0
load_balancer:
  type: Nitro
  url: "not a url"
  username: ""
"#;

    let config: ProvisionerConfig = serde_yaml::from_str(yaml).unwrap();
    let message = config.validate().unwrap_err().to_string();

    assert!(message.contains("http_port"));
    assert!(message.contains("max_attempts"));
    assert!(message.contains("NITRO url"));
    assert!(message.contains("NITRO username"));
}
