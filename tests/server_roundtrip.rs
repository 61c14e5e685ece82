//! Server/client round-trip integration tests
//!
//! Runs a real server on an ephemeral port with scripted command output and
//! talks to it through the client and through raw HTTP.

use std::sync::Arc;
use std::time::Duration;

use diskmon::client::{ClientState, DiskHealthClient};
use diskmon::config::ExecutorConfig;
use diskmon::error::{DiskmonError, Result, ResultCode};
use diskmon::executor::{CommandOutput, DiskExecutor, ScriptedRunner};
use diskmon::normalize::{DeviceType, SmartStatus};
use diskmon::tools::{CHECK_DISK_SMART, LIST_DISKS, ToolRegistry};
use diskmon::transport::{DiskServer, MAX_IN_FLIGHT, MAX_QUEUED_REQUESTS, ServerState};
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource, retry};
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;

const SINGLE_DISK: &str = r#"{"devices":[{"name":"sda","type":"disk","size":"447.1G","children":[{"name":"sda1","type":"part","size":"600M"}]}]}"#;

struct TestServer {
    url: String,
    state: ServerState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(runner: Arc<ScriptedRunner>) -> Result<Self> {
        let executor = DiskExecutor::new(runner, ExecutorConfig::default());
        let state = ServerState::new(ToolRegistry::standard(executor)?, diskmon::executor::WorkerPool::new(4))
            .with_keepalive(Duration::from_millis(200));
        let server = DiskServer::bind("127.0.0.1:0", state.clone()).await?;
        let url = server.sse_url()?;

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Ok(Self {
            url,
            state,
            shutdown: Some(tx),
        })
    }

    fn base(&self) -> String {
        self.url.trim_end_matches("/sse").to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn healthy_host() -> Arc<ScriptedRunner> {
    Arc::new(
        ScriptedRunner::new()
            .respond_to("/dev/sda", CommandOutput::ok("SMART overall-health self-assessment test result: PASSED\n"))
            .respond_to("lsblk", CommandOutput::ok(SINGLE_DISK)),
    )
}

/// Open a raw event stream and return it with the announced message URL
async fn raw_session(server: &TestServer) -> (EventSource, String) {
    let mut source = EventSource::get(&server.url);
    source.set_retry_policy(Box::new(retry::Never));
    loop {
        match source.next().await {
            Some(Ok(Event::Message(message))) if message.event == "endpoint" => {
                return (source, format!("{}{}", server.base(), message.data));
            }
            Some(Ok(_)) => continue,
            other => panic!("stream ended before endpoint: {:?}", other.map(|e| e.map(|_| ()))),
        }
    }
}

async fn next_message(source: &mut EventSource) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), source.next()).await {
            Ok(Some(Ok(Event::Message(message)))) if message.event == "message" => {
                return serde_json::from_str(&message.data).unwrap();
            }
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("stream ended: {:?}", other.map(|e| e.map(|_| ()))),
            Err(_) => panic!("no message event within 5s"),
        }
    }
}

#[tokio::test]
async fn test_discover_lists_both_tools() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let mut client = DiskHealthClient::new(&server.url);

    client.connect().await?;
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(
        client.server_info().and_then(|i| i.get("name")).and_then(Value::as_str),
        Some("DiskHealthChecker")
    );

    let names: Vec<String> = client.discover().await?.iter().map(|s| s.name.clone()).collect();
    assert_eq!(names, vec![CHECK_DISK_SMART.to_string(), LIST_DISKS.to_string()]);
    assert_eq!(client.state(), ClientState::Ready);

    let smart = &client.catalog()[0];
    let device = smart.param("device").unwrap();
    assert!(!device.required);
    assert_eq!(device.default, Some(json!("/dev/sda")));

    client.disconnect().await;
    assert_eq!(client.state(), ClientState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_smart_check_passed() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let mut client = DiskHealthClient::new(&server.url);

    let result = client.check_disk_smart("/dev/sda").await?;
    assert_eq!(result.status, SmartStatus::Passed);
    assert_eq!(result.device, "/dev/sda");
    assert_eq!(result.code, ResultCode::Success);
    Ok(())
}

#[tokio::test]
async fn test_smart_default_device() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let mut client = DiskHealthClient::new(&server.url);

    let result = client.call(CHECK_DISK_SMART, Map::new()).await?;
    assert!(result.success);
    assert_eq!(result.payload["device"], "/dev/sda");
    assert_eq!(result.payload["status"], "PASSED");
    Ok(())
}

#[tokio::test]
async fn test_list_disks_over_the_wire() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let mut client = DiskHealthClient::new(&server.url);

    let forest = client.list_disks().await?;
    assert_eq!(forest.roots().len(), 1);
    let sda = &forest.roots()[0];
    assert_eq!(sda.name, "sda");
    assert_eq!(sda.device_type, DeviceType::Disk);
    assert_eq!(sda.children.len(), 1);
    assert_eq!(sda.children[0].name, "sda1");
    assert_eq!(sda.children[0].size_bytes, 629_145_600);
    Ok(())
}

#[tokio::test]
async fn test_injection_rejected_without_spawning() -> Result<()> {
    let runner = healthy_host();
    let server = TestServer::start(Arc::clone(&runner)).await?;
    let mut client = DiskHealthClient::new(&server.url);

    let err = client.check_disk_smart("/dev/sda; rm -rf /").await.unwrap_err();
    assert!(matches!(err, DiskmonError::Validation(_)), "got {:?}", err);
    assert_eq!(runner.call_count(), 0);

    // the session is still usable
    assert_eq!(client.state(), ClientState::Ready);
    assert!(client.check_disk_smart("/dev/sda").await?.is_healthy());
    Ok(())
}

#[tokio::test]
async fn test_client_rejects_bad_arguments_locally() -> Result<()> {
    let runner = healthy_host();
    let server = TestServer::start(Arc::clone(&runner)).await?;
    let mut client = DiskHealthClient::new(&server.url);
    client.ensure_ready().await?;

    let mut args = Map::new();
    args.insert("device".into(), json!(42));
    let err = client.invoke(CHECK_DISK_SMART, args).await.unwrap_err();
    assert!(matches!(err, DiskmonError::InvalidArguments(_)));

    let err = client.invoke("format_disk", Map::new()).await.unwrap_err();
    assert!(matches!(err, DiskmonError::UnknownTool(_)));
    assert_eq!(runner.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_smartctl_reports_code() -> Result<()> {
    let runner = Arc::new(ScriptedRunner::new().unavailable("smartctl"));
    let server = TestServer::start(runner).await?;
    let mut client = DiskHealthClient::new(&server.url);

    let result = client.call(CHECK_DISK_SMART, Map::new()).await?;
    assert!(!result.success);
    assert_eq!(result.code, ResultCode::CommandUnavailable);
    assert_eq!(result.payload["status"], "ERROR");
    Ok(())
}

#[tokio::test]
async fn test_responses_follow_request_order() -> Result<()> {
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond_after(
                "/dev/sdb",
                CommandOutput::ok("test result: PASSED"),
                Duration::from_millis(300),
            )
            .respond_to("lsblk", CommandOutput::ok(SINGLE_DISK)),
    );
    let server = TestServer::start(runner).await?;
    let (mut source, endpoint) = raw_session(&server).await;
    let http = reqwest::Client::new();

    let slow = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
        "params": {"name": "check_disk_smart", "arguments": {"device": "/dev/sdb"}}});
    let fast = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
        "params": {"name": "list_disks", "arguments": {}}});

    for request in [slow, fast] {
        let status = http.post(&endpoint).json(&request).send().await.unwrap().status();
        assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    }

    let first = next_message(&mut source).await;
    let second = next_message(&mut source).await;
    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 2);
    assert_eq!(first["result"]["structuredContent"]["data"]["status"], "PASSED");
    source.close();
    Ok(())
}

#[tokio::test]
async fn test_saturated_session_is_unavailable() -> Result<()> {
    let runner = Arc::new(ScriptedRunner::new().respond_after(
        "/dev/sdb",
        CommandOutput::ok("test result: PASSED"),
        Duration::from_secs(30),
    ));
    let server = TestServer::start(runner).await?;
    let (mut source, endpoint) = raw_session(&server).await;
    let http = reqwest::Client::new();

    let mut accepted = 0;
    let mut refused = false;
    for id in 0..(MAX_IN_FLIGHT + MAX_QUEUED_REQUESTS + 16) {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": "tools/call",
            "params": {"name": "check_disk_smart", "arguments": {"device": "/dev/sdb"}}});
        let status = http.post(&endpoint).json(&request).send().await.unwrap().status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            refused = true;
            break;
        }
        assert_eq!(status, reqwest::StatusCode::ACCEPTED);
        accepted += 1;
    }
    assert!(refused, "no request refused after {} accepted", accepted);
    assert!(accepted >= MAX_QUEUED_REQUESTS);
    source.close();
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_not_found() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let response = reqwest::Client::new()
        .post(format!("{}/messages?session_id=deadbeef", server.base()))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_malformed_message() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let (mut source, endpoint) = raw_session(&server).await;

    let response = reqwest::Client::new()
        .post(&endpoint)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let event = next_message(&mut source).await;
    assert_eq!(event["error"]["code"], -32700);
    assert!(event["id"].is_null());
    source.close();
    Ok(())
}

#[tokio::test]
async fn test_unknown_method() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let (mut source, endpoint) = raw_session(&server).await;

    reqwest::Client::new()
        .post(&endpoint)
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}))
        .send()
        .await
        .unwrap();

    let event = next_message(&mut source).await;
    assert_eq!(event["id"], 7);
    assert_eq!(event["error"]["code"], -32601);
    source.close();
    Ok(())
}

#[tokio::test]
async fn test_session_removed_after_disconnect() -> Result<()> {
    let server = TestServer::start(healthy_host()).await?;
    let mut client = DiskHealthClient::new(&server.url);
    client.ensure_ready().await?;
    assert_eq!(server.state.sessions.len().await, 1);

    client.disconnect().await;
    // the dispatcher notices the closed stream on its next keep-alive
    for _ in 0..100 {
        if server.state.sessions.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.state.sessions.is_empty().await);
    Ok(())
}
