mod common;

use std::sync::Arc;
use std::time::Duration;

use agentic_chat_gateway::mcp::{
    ConnectionRegistry, ConnectionStatus, McpError, RmcpConnector, ServerConfig, SessionConnector,
    SessionFactory, ToolAggregator, ToolSession, TransportKind,
};
use async_trait::async_trait;
use common::{FakeConnector, FakeServer, aggregator, stdio};

#[tokio::test]
async fn test_connected_and_unreachable_servers() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("A", FakeServer::with_tools(&["search"]))
            .with_server(
                "B",
                FakeServer::failing(McpError::ConnectionRefused {
                    server: "B".to_string(),
                    message: "Connection refused (os error 111)".to_string(),
                }),
            ),
    );
    let aggregator = aggregator(connector);

    let result = aggregator.aggregate(&[stdio("A"), stdio("B")]).await;

    assert_eq!(result.statuses.len(), 2);
    assert_eq!(result.statuses[0].name, "A");
    assert_eq!(result.statuses[0].status, ConnectionStatus::Connected);
    assert_eq!(result.statuses[0].tools, vec!["search"]);
    assert!(result.statuses[0].error.is_none());

    assert_eq!(result.statuses[1].name, "B");
    assert_eq!(result.statuses[1].status, ConnectionStatus::Failed);
    assert!(result.statuses[1].tools.is_empty());
    assert!(
        result.statuses[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Connection refused")
    );

    assert_eq!(result.catalog.names(), vec!["search"]);
    assert_eq!(result.catalog.get("search").unwrap().server, "A");
}

#[tokio::test]
async fn test_empty_server_list() {
    let aggregator = aggregator(Arc::new(FakeConnector::new()));
    let result = aggregator.aggregate(&[]).await;

    assert!(result.catalog.is_empty());
    assert!(result.statuses.is_empty());
}

#[tokio::test]
async fn test_invalid_config_never_reaches_connector() {
    let connector = Arc::new(FakeConnector::new());
    let aggregator = aggregator(Arc::clone(&connector));

    let mut remote = ServerConfig::sse("remote", "");
    remote.url = None;
    let result = aggregator
        .aggregate(&[ServerConfig::stdio("local", "   "), remote])
        .await;

    assert_eq!(connector.total_attempts(), 0);
    for status in &result.statuses {
        assert_eq!(status.status, ConnectionStatus::Failed);
        assert!(
            status
                .error
                .as_deref()
                .unwrap()
                .starts_with("Invalid configuration")
        );
    }
    assert_eq!(result.statuses[0].transport, TransportKind::Stdio);
    assert_eq!(result.statuses[1].transport, TransportKind::Sse);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_rest() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("first", FakeServer::with_tools(&["a"]))
            .with_server(
                "missing",
                FakeServer::failing(McpError::ExecutableNotFound {
                    server: "missing".to_string(),
                    command: "mcp-missing".to_string(),
                }),
            )
            .with_server("last", FakeServer::with_tools(&["b", "c"])),
    );
    let aggregator = aggregator(connector);

    let configs = [
        stdio("first"),
        ServerConfig::stdio("blank", ""),
        stdio("missing"),
        stdio("last"),
    ];
    let result = aggregator.aggregate(&configs).await;

    let names: Vec<&str> = result.statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["first", "blank", "missing", "last"]);

    assert!(result.statuses[0].is_connected());
    assert!(!result.statuses[1].is_connected());
    assert_eq!(
        result.statuses[2].error.as_deref(),
        Some("Command not found: mcp-missing")
    );
    assert!(result.statuses[3].is_connected());

    let mut tools = result.catalog.names();
    tools.sort_unstable();
    assert_eq!(tools, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_later_server_wins_name_collisions() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("a", FakeServer::with_tools(&["x", "only_a"]))
            .with_server("b", FakeServer::with_tools(&["x"])),
    );
    let aggregator = aggregator(connector);

    let forward = aggregator.aggregate(&[stdio("a"), stdio("b")]).await;
    assert_eq!(forward.catalog.len(), 2);
    assert_eq!(forward.catalog.get("x").unwrap().server, "b");

    // Reusing the cached sessions, only the order changes.
    let reverse = aggregator.aggregate(&[stdio("b"), stdio("a")]).await;
    assert_eq!(reverse.catalog.get("x").unwrap().server, "a");

    // Both servers still report the colliding tool.
    assert_eq!(forward.statuses[0].tools, vec!["x", "only_a"]);
    assert_eq!(forward.statuses[1].tools, vec!["x"]);
}

#[tokio::test]
async fn test_shadowed_tool_calls_the_winning_session() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("a", FakeServer::with_tools(&["x"]))
            .with_server("b", FakeServer::with_tools(&["x"])),
    );
    let aggregator = aggregator(connector);

    let result = aggregator.aggregate(&[stdio("a"), stdio("b")]).await;
    let output = result
        .catalog
        .call("x", serde_json::json!({ "q": 1 }))
        .await
        .unwrap();

    assert_eq!(output["server"], "b");
    assert_eq!(output["arguments"]["q"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_turns_share_one_attempt() {
    let connector = Arc::new(
        FakeConnector::new().with_server(
            "slow",
            FakeServer::with_tools(&["t"]).delayed(Duration::from_secs(2)),
        ),
    );
    let aggregator = aggregator(Arc::clone(&connector));
    let configs = [stdio("slow")];

    let results = futures::future::join_all((0..5).map(|_| aggregator.aggregate(&configs))).await;

    assert_eq!(connector.attempts("slow"), 1);
    assert_eq!(aggregator.factory().registry().len(), 1);
    for result in results {
        assert!(result.statuses[0].is_connected());
        assert!(result.catalog.contains("t"));
    }
}

#[tokio::test]
async fn test_failed_servers_are_not_retried() {
    let connector = Arc::new(FakeConnector::new().with_server(
        "broken",
        FakeServer::failing(McpError::PermissionDenied {
            server: "broken".to_string(),
            command: "./server.sh".to_string(),
        }),
    ));
    let aggregator = aggregator(Arc::clone(&connector));

    for _ in 0..3 {
        let result = aggregator.aggregate(&[stdio("broken")]).await;
        assert_eq!(
            result.statuses[0].error.as_deref(),
            Some("Permission denied: ./server.sh")
        );
    }
    assert_eq!(connector.attempts("broken"), 1);
}

#[tokio::test]
async fn test_identity_includes_transport() {
    let connector = Arc::new(FakeConnector::new().with_server("same", FakeServer::with_tools(&["t"])));
    let aggregator = aggregator(Arc::clone(&connector));

    aggregator
        .aggregate(&[stdio("same"), ServerConfig::sse("same", "http://127.0.0.1:9/mcp")])
        .await;

    assert_eq!(connector.attempts("same"), 2);
    let snapshot = aggregator.factory().registry().snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].transport, TransportKind::Stdio);
    assert_eq!(snapshot[1].transport, TransportKind::Sse);
}

#[tokio::test(start_paused = true)]
async fn test_slow_server_times_out() {
    let connector = Arc::new(FakeConnector::new().with_server(
        "sleepy",
        FakeServer::with_tools(&["t"]).delayed(Duration::from_secs(120)),
    ));
    let aggregator = aggregator(connector);

    let result = aggregator.aggregate(&[stdio("sleepy")]).await;
    assert_eq!(
        result.statuses[0].error.as_deref(),
        Some("Connection timeout after 30s")
    );
}

#[tokio::test(start_paused = true)]
async fn test_per_server_timeout_only_tightens() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server(
                "tight",
                FakeServer::with_tools(&["t"]).delayed(Duration::from_secs(10)),
            )
            .with_server(
                "loose",
                FakeServer::with_tools(&["t"]).delayed(Duration::from_secs(45)),
            ),
    );
    let aggregator = aggregator(connector);

    let result = aggregator
        .aggregate(&[
            stdio("tight").with_timeout(5),
            stdio("loose").with_timeout(600),
        ])
        .await;

    assert_eq!(
        result.statuses[0].error.as_deref(),
        Some("Connection timeout after 5s")
    );
    assert_eq!(
        result.statuses[1].error.as_deref(),
        Some("Connection timeout after 30s")
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_means_default() {
    let connector = Arc::new(FakeConnector::new().with_server(
        "A",
        FakeServer::with_tools(&["search"]).delayed(Duration::from_secs(1)),
    ));
    let aggregator = aggregator(connector);

    let result = aggregator.aggregate(&[stdio("A").with_timeout(0)]).await;

    assert!(result.statuses[0].is_connected(), "{:?}", result.statuses[0].error);
    assert_eq!(result.statuses[0].tools, vec!["search".to_string()]);
}

#[derive(Debug)]
struct PanickingConnector;

#[async_trait]
impl SessionConnector for PanickingConnector {
    async fn open(&self, _config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError> {
        panic!("connector blew up");
    }
}

#[tokio::test]
async fn test_aborted_connection_task_is_an_initialize_error() {
    let aggregator = ToolAggregator::new(SessionFactory::new(
        Arc::new(PanickingConnector),
        Arc::new(ConnectionRegistry::new()),
    ));

    let result = aggregator.aggregate(&[stdio("A")]).await;

    let error = result.statuses[0].error.as_deref().unwrap();
    assert!(
        error.starts_with("Failed to initialize session: connection task aborted"),
        "{error}"
    );
    assert!(!error.contains("spawn"), "{error}");
}

#[tokio::test]
async fn test_failed_probe_is_an_initialize_error() {
    let connector = Arc::new(
        FakeConnector::new().with_server("mute", FakeServer::with_tools(&["t"]).listing_fails_after(0)),
    );
    let aggregator = aggregator(connector);

    let result = aggregator.aggregate(&[stdio("mute")]).await;
    let error = result.statuses[0].error.as_deref().unwrap();
    assert!(error.starts_with("Failed to initialize session"), "{error}");
    assert!(result.catalog.is_empty());
}

#[tokio::test]
async fn test_stale_session_reports_tool_fetch_failure() {
    // Probe and first turn succeed, the second turn's listing fails.
    let connector = Arc::new(
        FakeConnector::new().with_server("stale", FakeServer::with_tools(&["t"]).listing_fails_after(2)),
    );
    let aggregator = aggregator(Arc::clone(&connector));

    let first = aggregator.aggregate(&[stdio("stale")]).await;
    assert!(first.statuses[0].is_connected());

    let second = aggregator.aggregate(&[stdio("stale")]).await;
    assert_eq!(second.statuses[0].status, ConnectionStatus::Failed);
    assert_eq!(
        second.statuses[0].error.as_deref(),
        Some("Tool fetch failed: session closed")
    );
    assert!(second.catalog.is_empty());
    assert_eq!(connector.attempts("stale"), 1);
}

fn rmcp_aggregator() -> ToolAggregator {
    ToolAggregator::new(
        SessionFactory::new(
            Arc::new(RmcpConnector::new()),
            Arc::new(ConnectionRegistry::new()),
        )
        .with_timeout(Duration::from_secs(10)),
    )
}

#[tokio::test]
async fn test_missing_executable_is_reported() {
    let aggregator = rmcp_aggregator();
    let result = aggregator
        .aggregate(&[ServerConfig::stdio(
            "ghost",
            "agentic-chat-gateway-no-such-binary",
        )])
        .await;

    assert_eq!(
        result.statuses[0].error.as_deref(),
        Some("Command not found: agentic-chat-gateway-no-such-binary")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_executable_command_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("server.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

    let aggregator = rmcp_aggregator();
    let result = aggregator
        .aggregate(&[ServerConfig::stdio("local", script.to_string_lossy())])
        .await;

    let error = result.statuses[0].error.as_deref().unwrap();
    assert!(error.starts_with("Permission denied"), "{error}");
}

#[tokio::test]
async fn test_unreachable_remote_server_fails() {
    let aggregator = rmcp_aggregator();
    let result = aggregator
        .aggregate(&[ServerConfig::sse("remote", "http://127.0.0.1:1/mcp").with_timeout(5)])
        .await;

    assert_eq!(result.statuses[0].status, ConnectionStatus::Failed);
    assert!(result.statuses[0].error.is_some());
    assert!(result.catalog.is_empty());
}
