//! # NITRO Client Tests
//!
//! Runs the NITRO client against a wiremock appliance.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lb_provisioner::core::config::NitroConfig;
use lb_provisioner::load_balancing::NitroClient;
use lb_provisioner::{
    LbVServer, LoadBalancerClient, ProvisionerError, Server, ServerBinding, ServiceGroup,
    VServerBinding, VServerSettings,
};

fn client_for(mock_server: &MockServer) -> NitroClient {
    NitroClient::new(&NitroConfig {
        url: mock_server.uri(),
        username: "nsroot".to_string(),
        password: "secret".to_string(),
        timeout: Duration::from_secs(2),
        accept_invalid_certs: false,
    })
    .expect("Failed to create NITRO client")
}

fn server() -> Server {
    Server {
        server_name: "web1-80".to_string(),
        hostname: "web1".to_string(),
        address: "192.168.1.10".parse().unwrap(),
        protocol: "HTTP".to_string(),
        server_port: 80,
        vip_port: 443,
    }
}

fn done() -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({
        "errorcode": 0,
        "message": "Done",
        "severity": "NONE"
    }))
}

#[tokio::test]
async fn test_create_server_sends_credentials_and_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/server"))
        .and(header("X-NITRO-USER", "nsroot"))
        .and(header("X-NITRO-PASS", "secret"))
        .and(body_json(json!({
            "server": {"name": "web1-80", "ipaddress": "192.168.1.10"}
        })))
        .respond_with(done())
        .expect(1)
        .mount(&mock_server)
        .await;

    client_for(&mock_server)
        .create_server(&server())
        .await
        .expect("create_server failed");
}

#[tokio::test]
async fn test_service_group_and_member_binding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/servicegroup"))
        .and(body_json(json!({
            "servicegroup": {"servicegroupname": "sg-app-80", "servicetype": "HTTP"}
        })))
        .respond_with(done())
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/nitro/v1/config/servicegroup_servicegroupmember_binding"))
        .and(body_json(json!({
            "servicegroup_servicegroupmember_binding": {
                "servicegroupname": "sg-app-80",
                "servername": "web1-80",
                "port": 80
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errorcode": 0, "message": "Done"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .create_service_group(&ServiceGroup {
            service_group_name: "sg-app-80".to_string(),
            service_type: "HTTP".to_string(),
            server_port: 80,
            vip_port: 443,
        })
        .await
        .unwrap();
    client
        .bind_server_to_service_group(&ServerBinding {
            service_group_name: "sg-app-80".to_string(),
            server_name: "web1-80".to_string(),
            server_port: 80,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_vserver_and_group_binding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/lbvserver"))
        .and(body_json(json!({
            "lbvserver": {
                "name": "lb-app-443",
                "servicetype": "SSL",
                "ipv46": "10.10.10.10",
                "port": 443,
                "lbmethod": "LEASTCONNECTION",
                "persistencetype": "SOURCEIP",
                "timeout": 5
            }
        })))
        .respond_with(done())
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/nitro/v1/config/lbvserver_servicegroup_binding"))
        .and(body_json(json!({
            "lbvserver_servicegroup_binding": {
                "name": "lb-app-443",
                "servicegroupname": "sg-app-443"
            }
        })))
        .respond_with(done())
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let settings = VServerSettings {
        lb_method: Some("LEASTCONNECTION".to_string()),
        persistence_type: Some("SOURCEIP".to_string()),
        persistence_timeout: 5,
        comment: None,
    };

    client
        .create_vserver(
            &LbVServer {
                lb_vserver_name: "lb-app-443".to_string(),
                service_type: "SSL".to_string(),
                ipv46: "10.10.10.10".parse().unwrap(),
                vip_port: 443,
            },
            &settings,
        )
        .await
        .unwrap();
    client
        .bind_service_group_to_vserver(&VServerBinding {
            lb_vserver_name: "lb-app-443".to_string(),
            service_group_name: "sg-app-443".to_string(),
            vip_port: 443,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_existing_resource_counts_as_created() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/server"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errorcode": 273,
            "message": "Resource already exists",
            "severity": "ERROR"
        })))
        .mount(&mock_server)
        .await;

    assert!(client_for(&mock_server).create_server(&server()).await.is_ok());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/server"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .create_server(&server())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, ProvisionerError::Vendor { status: 503, .. }));
}

#[tokio::test]
async fn test_rejected_argument_is_permanent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/server"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorcode": 1075,
            "message": "Invalid argument [ipaddress]",
            "severity": "ERROR"
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .create_server(&server())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    match err {
        ProvisionerError::Vendor {
            operation,
            status,
            message,
        } => {
            assert_eq!(operation, "create_server");
            assert_eq!(status, 400);
            assert!(message.contains("Invalid argument [ipaddress]"));
            assert!(message.contains("1075"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_nonzero_errorcode_on_success_status_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nitro/v1/config/server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorcode": 344,
            "message": "Invalid IP address",
            "severity": "ERROR"
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .create_server(&server())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionerError::Vendor { status: 200, .. }));
    assert!(!err.is_retryable());
}
