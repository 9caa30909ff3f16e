use kamatera_api::{ClientConfig, KamateraClient};
use kamatera_cloud::remote::{CommandId, CommandStatus, InstanceLookup, RemoteClient};
use kamatera_cloud::wire::{WireCreateNetwork, WireCreateServer};
use kamatera_cloud::{
    ComputeInstanceSpec, InstanceId, PowerState, RemoteError, RetryPolicy, ServerOperation, mapper,
};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

fn client(server: &MockServer) -> KamateraClient {
    KamateraClient::new(
        ClientConfig::new("test-client", "test-secret")
            .with_api_url(server.uri())
            .with_request_timeout(Duration::from_secs(5))
            .with_retry(fast_retry()),
    )
    .unwrap()
}

fn server_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "datacenter": "IL-PT",
        "cpu": "2B",
        "ram": 2048,
        "diskSizes": [15, 20, 30],
        "power": "on",
        "networks": [{"network": "wan-il-pt", "ips": ["203.0.113.5"]}],
        "billing": "monthly",
        "traffic": "t5000",
        "managed": "0",
        "backup": "0"
    })
}

fn create_request(name: &str) -> WireCreateServer {
    mapper::to_wire_create(&ComputeInstanceSpec::new(name, "IL-PT", "IL-PT:6000C29"))
}

async fn mount_no_servers(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "No servers found"})))
        .mount(server)
        .await;
}

// ============ Request shape ============

#[tokio::test]
async fn test_read_sends_auth_headers_and_parses_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .and(header("AuthClientId", "test-client"))
        .and(header("AuthSecret", "test-secret"))
        .and(header("Accept", "application/json"))
        .and(body_json(json!({"id": "srv1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([server_json("srv1", "web-01")])))
        .expect(1)
        .mount(&server)
        .await;

    let servers = client(&server)
        .read_instance(&InstanceLookup::Id(InstanceId("srv1".into())))
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "web-01");
    assert_eq!(servers[0].disk_sizes_gb, vec![15, 20, 30]);
    assert_eq!(servers[0].power, PowerState::On);
    assert_eq!(servers[0].public_ips(), vec!["203.0.113.5".to_string()]);
}

#[tokio::test]
async fn test_configure_body_carries_one_attribute() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/server/configure"))
        .and(body_json(json!({"id": "srv1", "ram": 1024})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["9001"])))
        .expect(1)
        .mount(&server)
        .await;

    let command = client(&server)
        .update_instance(&InstanceId("srv1".into()), &ServerOperation::SetRam { ram_mb: 1024 })
        .await
        .unwrap();
    assert_eq!(command, CommandId("9001".into()));
}

#[tokio::test]
async fn test_terminate_is_forced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/terminate"))
        .and(body_json(json!({"id": "srv1", "force": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["77"])))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .destroy_instance(&InstanceId("srv1".into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_queue_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/queue"))
        .and(query_param("id", "42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "42", "status": "complete", "log": "Name: web-01\nDone"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/queue"))
        .and(query_param("id", "43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "43", "status": "error", "log": "disk full"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/queue"))
        .and(query_param("id", "44"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "44"}])))
        .mount(&server)
        .await;

    let client = client(&server);
    let complete = client.command_status(&CommandId("42".into())).await.unwrap();
    assert_eq!(complete.created_name(), Some("web-01"));
    assert_eq!(
        client.command_status(&CommandId("43".into())).await.unwrap(),
        CommandStatus::Failed {
            log: Some("disk full".into())
        }
    );
    assert_eq!(
        client.command_status(&CommandId("44".into())).await.unwrap(),
        CommandStatus::Pending
    );
}

#[tokio::test]
async fn test_create_network_unwraps_res_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/network/create"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"res": "{\"networkId\": 4021, \"subnetId\": 77}"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_network(&WireCreateNetwork {
            datacenter: "IL-PT".into(),
            name: "backend".into(),
            subnet_ip: "172.16.0.0".into(),
            subnet_bit: 23,
            gateway: String::new(),
            dns1: String::new(),
            dns2: String::new(),
            subnet_description: "a".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.network_id, Some(4021));
    assert_eq!(created.subnet_id, 77);
}

// ============ Error classification and retries ============

#[tokio::test]
async fn test_empty_lookup_is_not_found_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "No servers found"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .read_instance(&InstanceLookup::exact_name("terraformtest"))
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::NotFound("No servers found".into()));
}

#[tokio::test]
async fn test_empty_list_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = client(&server)
        .read_instance(&InstanceLookup::NameFilter("web.*".into()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No servers found");
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/networks"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/networks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"vlanId": 12, "ids": [345], "names": ["lan-12-backend"]}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let networks = client(&server).read_networks("IL-PT").await.unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].names, vec!["lan-12-backend".to_string()]);
}

#[tokio::test]
async fn test_exhausted_retries_are_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).list_datacenters().await.unwrap_err();
    match err {
        RemoteError::TransientFailure {
            endpoint, attempts, ..
        } => {
            assert_eq!(endpoint, "service/server?datacenter=1");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected transient failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/server/configure"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "invalid cpu"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .update_instance(
            &InstanceId("srv1".into()),
            &ServerOperation::SetCpu {
                cpu_type: "B".into(),
                cores: 3,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Rejected {
            status: 400,
            message: "invalid cpu".into(),
        }
    );
}

#[tokio::test]
async fn test_throttled_request_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/queue"))
        .and(query_param("id", "77"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "too many requests"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .command_status(&CommandId("77".into()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Rejected {
            status: 429,
            message: "too many requests".into(),
        }
    );
    server.verify().await;
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "authentication failed"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).list_images("IL-PT").await.unwrap_err();
    assert_eq!(err, RemoteError::Unauthorized("authentication failed".into()));
}

// ============ Create idempotency ============

#[tokio::test]
async fn test_create_returns_commands_and_generated_password() {
    let server = MockServer::start().await;
    mount_no_servers(&server).await;
    Mock::given(method("POST"))
        .and(path("/service/server"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"password": "Gen3rated!", "commandIds": ["4242"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_instance(&create_request("web-01"))
        .await
        .unwrap();
    assert_eq!(created.commands, vec![CommandId("4242".into())]);
    assert_eq!(created.generated_password.as_deref(), Some("Gen3rated!"));
    assert_eq!(created.adopted, None);
}

#[tokio::test]
async fn test_create_refuses_existing_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .and(body_json(json!({"name": "^web-01$"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([server_json("srv1", "web-01")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["1"])))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .create_instance(&create_request("web-01"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::ConflictDuplicate {
            kind: "server",
            name: "web-01".into(),
        }
    );
}

#[tokio::test]
async fn test_create_adopts_server_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "No servers found"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/service/server/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([server_json("srv9", "web-01")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(504).set_body_string("Gateway Timeout"))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_instance(&create_request("web-01"))
        .await
        .unwrap();
    assert_eq!(created.adopted, Some(InstanceId("srv9".into())));
    assert!(created.commands.is_empty());
}

#[tokio::test]
async fn test_create_retries_when_nothing_was_created() {
    let server = MockServer::start().await;
    mount_no_servers(&server).await;
    Mock::given(method("POST"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/service/server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["5150"])))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_instance(&create_request("web-01"))
        .await
        .unwrap();
    assert_eq!(created.commands, vec![CommandId("5150".into())]);
    assert_eq!(created.generated_password, None);
}
