// Integration tests for `LabClient` using wiremock.

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wanlab_api::models::{PortRef, PortSetting, StatusEntry};
use wanlab_api::{Error, LabClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, LabClient) {
    let server = MockServer::start().await;
    let client = LabClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn setting(name: &str, iface: &str, delay_ms: u32) -> PortSetting {
    PortSetting {
        name: name.into(),
        iface: iface.into(),
        delay_ms,
        jitter_ms: 0,
        loss_pct: 1.0,
        ber_pct: 0.0,
        rate: None,
        queue_limit: None,
        overhead: None,
        mpu: Some(64),
    }
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_ports() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "client1", "iface": "eth0", "ipv4": "10.0.0.2/24", "mac": "02:42:0a:00:00:02"},
            {"name": "lab_server", "iface": "eth0", "ipv4": "10.0.0.1/24", "mac": null},
            {"name": "lab_server", "iface": "eth1", "ipv4": null}
        ])))
        .mount(&server)
        .await;

    let ports = client.list_ports().await.unwrap();

    assert_eq!(ports.len(), 3);
    assert_eq!(ports[0].name, "client1");
    assert_eq!(ports[0].ipv4.as_deref(), Some("10.0.0.2/24"));
    assert_eq!(ports[1].mac, None);
    assert_eq!(ports[2].ipv4, None);
}

#[tokio::test]
async fn test_apply_ports_matrix_sends_items() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/links/apply_ports_matrix"))
        .and(body_json(json!({
            "items": [{
                "name": "client1", "iface": "eth0",
                "delay_ms": 50, "jitter_ms": 0, "loss_pct": 1.0, "ber_pct": 0.0,
                "rate": null, "queue_limit": null, "overhead": null, "mpu": 64
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "count": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let count = client
        .apply_ports_matrix(&[setting("client1", "eth0", 50)])
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_status_ports_mixed_entries() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/links/status_ports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client1:eth0": {
                "qdisc": "qdisc netem 8001: root ...",
                "summary": {
                    "active": true, "delay_ms": 50,
                    "tx": {"bytes": 4200, "frames": 42},
                    "drops": {"total": 2, "pct": 4.545, "overlimits": 0, "requeues": 0},
                    "queue": {"bytes": 0, "frames": 0, "qlen": null}
                }
            },
            "ghost:eth9": {"error": "container not found"}
        })))
        .mount(&server)
        .await;

    let status = client
        .status_ports(&[PortRef {
            name: "client1".into(),
            iface: "eth0@if7".into(),
        }])
        .await
        .unwrap();

    assert_eq!(status.len(), 2);
    match &status["client1:eth0"] {
        StatusEntry::Ok { summary, .. } => {
            assert_eq!(summary.tx.frames, 42);
            assert_eq!(summary.drops.total, 2);
        }
        StatusEntry::Failed { .. } => panic!("expected a parsed summary"),
    }
    assert!(matches!(status["ghost:eth9"], StatusEntry::Failed { .. }));
}

#[tokio::test]
async fn test_ping_clamps_count() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tools/ping"))
        .and(body_json(json!({"source": "client1", "target": "10.0.0.1", "count": 10})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "rc": 0,
            "out": "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=50.3 ms\n"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.ping("client1", "10.0.0.1", 50).await.unwrap();
    assert!(resp.ok);
    assert!(resp.out.contains("time=50.3"));
}

#[tokio::test]
async fn test_lab_lifecycle() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/lab/init"))
        .and(body_json(json!({"ports": 2, "recreate": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "server": "lab_server",
            "clients": ["client1", "client2"],
            "networks": ["lab_net1", "lab_net2"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/lab/destroy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lab/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"containers": [], "networks": []})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let init = client.init_lab(2, true).await.unwrap();
    assert_eq!(init.clients, vec!["client1".to_owned(), "client2".to_owned()]);
    client.destroy_lab().await.unwrap();
    let status = client.lab_status().await.unwrap();
    assert!(status["containers"].as_array().unwrap().is_empty());
    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn test_status_stream_yields_snapshots_then_ends() {
    let (server, client) = setup().await;

    let body = concat!(
        "data: {\"client1:eth0\": {\"qdisc\": \"\", \"summary\": {\"active\": false}}}\n\n",
        "data: not-json\n\n",
        "data: {}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/ports/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let mut stream = client.open_status_stream().await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(first.contains_key("client1:eth0"));
    let second = stream.next().await.unwrap().unwrap();
    assert!(second.is_empty());
    let end = stream.next().await.unwrap();
    assert!(matches!(end, Err(Error::Stream(_))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_status_stream_error_event() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ports/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: error\ndata: docker unavailable\n\n"),
        )
        .mount(&server)
        .await;

    let mut stream = client.open_status_stream().await.unwrap();
    match stream.next().await.unwrap() {
        Err(Error::Stream(msg)) => assert_eq!(msg, "docker unavailable"),
        other => panic!("expected stream error, got {other:?}"),
    }
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_apply_empty_batch_reports_detail() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/links/apply_ports_matrix"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "nothing selected"})),
        )
        .mount(&server)
        .await;

    let err = client.apply_ports_matrix(&[]).await.unwrap_err();
    match err {
        Error::Backend { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "nothing selected");
        }
        other => panic!("expected Backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_apply_ok_false_is_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/links/apply_ports_matrix"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
        .mount(&server)
        .await;

    let err = client
        .apply_ports_matrix(&[setting("client1", "eth0", 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }));
}

#[tokio::test]
async fn test_not_found_and_transient_classification() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/lab/status"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not Found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ports"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.lab_status().await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_transient());

    let err = client.list_ports().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ports"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = client.list_ports().await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert!(body.contains("proxy")),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_refused() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ports/stream"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = client.open_status_stream().await;
    assert!(matches!(result, Err(Error::Backend { status: 502, .. })));
}
