mod common;

use std::sync::Arc;

use agentic_chat_gateway::context::{ContextRetriever, EntryRole};
use agentic_chat_gateway::llm::{Message, Orchestrator};
use agentic_chat_gateway::mcp::{McpError, ServerStatusReport};
use agentic_chat_gateway::normalized::NormalizedEvent;
use agentic_chat_gateway::persistence::providers::MemoryStore;
use agentic_chat_gateway::persistence::{ContextStore, ConversationFilter};
use agentic_chat_gateway::turn::{TurnAssembler, TurnError, TurnRequest};
use common::{
    FakeConnector, FakeServer, FlakyStore, ScriptedDriver, aggregator, llm_settings, stdio,
    text_reply, tool_call_reply,
};
use futures::StreamExt;

struct Harness {
    turns: TurnAssembler,
    driver: Arc<ScriptedDriver>,
    store: Arc<dyn ContextStore>,
}

fn harness(scripts: Vec<Vec<NormalizedEvent>>, store: Arc<dyn ContextStore>) -> Harness {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("A", FakeServer::with_tools(&["search"]))
            .with_server(
                "B",
                FakeServer::failing(McpError::ConnectionRefused {
                    server: "B".to_string(),
                    message: "Connection refused".to_string(),
                }),
            ),
    );
    let driver = Arc::new(ScriptedDriver::new(scripts));
    let orchestrator = Arc::new(Orchestrator::with_driver(llm_settings(), driver.clone()));
    let turns = TurnAssembler::new(
        ContextRetriever::new(Arc::clone(&store)),
        aggregator(connector),
        orchestrator,
    )
    .with_default_servers(vec![stdio("A")]);

    Harness {
        turns,
        driver,
        store,
    }
}

fn request(text: &str) -> TurnRequest {
    TurnRequest {
        messages: vec![Message::user(text)],
        ..TurnRequest::default()
    }
}

async fn collect(turns: &TurnAssembler, request: TurnRequest) -> Vec<NormalizedEvent> {
    match turns.run(request).await {
        Ok(stream) => stream.collect().await,
        Err(e) => panic!("turn failed: {e}"),
    }
}

fn statuses(events: &[NormalizedEvent]) -> &[ServerStatusReport] {
    match &events[1] {
        NormalizedEvent::McpStatus { servers } => servers,
        other => panic!("expected mcp.status second, got {other:?}"),
    }
}

#[tokio::test]
async fn test_explicit_empty_server_list_sends_no_tools() {
    let h = harness(vec![text_reply("hello")], Arc::new(MemoryStore::new()));
    let req = TurnRequest {
        mcp_servers: Some(Vec::new()),
        ..request("hi")
    };

    let events = collect(&h.turns, req).await;

    assert!(matches!(events[0], NormalizedEvent::StreamStart { .. }));
    assert!(statuses(&events).is_empty());
    assert_eq!(events.last(), Some(&NormalizedEvent::Done));

    let requests = h.driver.requests();
    assert!(requests[0].tools.is_none());
    let system = requests[0].messages[0]["content"].as_str().unwrap();
    assert!(system.contains("No tools available"));
    assert!(system.contains("No contextual information available for this session."));
}

#[tokio::test]
async fn test_omitted_server_list_uses_defaults() {
    let h = harness(vec![text_reply("hello")], Arc::new(MemoryStore::new()));

    let events = collect(&h.turns, request("hi")).await;

    let servers = statuses(&events);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "A");

    let tools = h.driver.requests()[0].tools.clone().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["function"]["name"], "search");
}

#[tokio::test]
async fn test_status_precedes_model_output_and_names_failures() {
    let h = harness(vec![text_reply("hello")], Arc::new(MemoryStore::new()));
    let req = TurnRequest {
        mcp_servers: Some(vec![stdio("A"), stdio("B")]),
        selected_mcp_server: Some("A".to_string()),
        ..request("hi")
    };

    let events = collect(&h.turns, req).await;

    let servers = statuses(&events);
    assert!(servers[0].is_connected());
    assert!(!servers[1].is_connected());
    assert!(matches!(events[2], NormalizedEvent::MessageDelta { .. }));

    let requests = h.driver.requests();
    let system = requests[0].messages[0]["content"].as_str().unwrap();
    assert!(system.contains("✅ **A**: Connected (1 tools: search)"));
    assert!(system.contains("❌ **B**: Failed - Connection refused"));
    assert!(system.contains("**🎯 User Selected Server:** A"));
}

#[tokio::test]
async fn test_model_start_failure_is_reported() {
    let h = harness(Vec::new(), Arc::new(MemoryStore::new()));

    match h.turns.run(request("hi")).await {
        Err(TurnError::ModelInvocationFailed(e)) => {
            assert!(e.to_string().contains("401 Unauthorized"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("turn should fail"),
    }
}

#[tokio::test]
async fn test_empty_messages_are_rejected() {
    let h = harness(vec![text_reply("unused")], Arc::new(MemoryStore::new()));

    let result = h.turns.assemble(TurnRequest::default()).await;
    assert!(matches!(
        result,
        Err(TurnError::InvalidRequest(ref message)) if message == "No messages provided"
    ));
    assert!(h.driver.requests().is_empty());
}

#[tokio::test]
async fn test_session_turn_persists_both_sides() {
    let h = harness(vec![text_reply("hello there")], Arc::new(MemoryStore::new()));
    let req = TurnRequest {
        session_id: Some("s1".to_string()),
        model: Some("vendor/model-x".to_string()),
        ..request("hi")
    };

    collect(&h.turns, req).await;

    let stored = h
        .store
        .recent_conversations(&ConversationFilter::session("s1"), 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);

    assert_eq!(stored[0].role, EntryRole::Assistant);
    assert_eq!(stored[0].content, "hello there");
    assert_eq!(stored[0].agent_id.as_deref(), Some("main"));
    assert_eq!(stored[0].metadata["model"], "vendor/model-x");
    assert_eq!(stored[0].metadata["toolsUsed"], 0);

    assert_eq!(stored[1].role, EntryRole::User);
    assert_eq!(stored[1].content, "hi");
    assert_eq!(stored[1].metadata["message_type"], "user_input");
    assert_eq!(stored[1].metadata["hasImages"], false);

    assert_eq!(h.driver.requests()[0].model, "vendor/model-x");
}

#[tokio::test]
async fn test_previous_turns_reach_the_instructions() {
    let h = harness(
        vec![text_reply("first answer"), text_reply("second answer")],
        Arc::new(MemoryStore::new()),
    );
    let session = |text: &str| TurnRequest {
        session_id: Some("s1".to_string()),
        ..request(text)
    };

    collect(&h.turns, session("remember the number 42")).await;
    collect(&h.turns, session("what number?")).await;

    let requests = h.driver.requests();
    let system = requests[1].messages[0]["content"].as_str().unwrap();
    assert!(system.contains("- Session ID: s1"));
    assert!(system.contains("assistant: first answer..."));
    assert!(system.contains("user: remember the number 42..."));
}

#[tokio::test]
async fn test_tool_round_trip_is_persisted_with_count() {
    let h = harness(
        vec![
            tool_call_reply("call_1", "search", r#"{"q":"rust"}"#),
            text_reply("found it"),
        ],
        Arc::new(MemoryStore::new()),
    );
    let req = TurnRequest {
        session_id: Some("s1".to_string()),
        ..request("look it up")
    };

    let events = collect(&h.turns, req).await;

    let result = events
        .iter()
        .find_map(|e| match e {
            NormalizedEvent::ToolResult {
                content, success, ..
            } => Some((content.clone(), *success)),
            _ => None,
        })
        .expect("tool result event");
    assert!(result.1);
    assert!(result.0.contains(r#""server":"A""#));

    // The follow-up request carries the tool exchange.
    let requests = h.driver.requests();
    assert_eq!(requests.len(), 2);
    let follow_up = &requests[1].messages;
    assert_eq!(follow_up[follow_up.len() - 1]["role"], "tool");
    assert_eq!(follow_up[follow_up.len() - 1]["tool_call_id"], "call_1");

    let stored = h
        .store
        .recent_conversations(&ConversationFilter::session("s1"), 1)
        .await
        .unwrap();
    assert_eq!(stored[0].content, "found it");
    assert_eq!(stored[0].metadata["toolsUsed"], 1);
}

#[tokio::test]
async fn test_images_attach_to_latest_user_message() {
    let h = harness(Vec::new(), Arc::new(MemoryStore::new()));
    let req = TurnRequest {
        messages: vec![
            Message::user("earlier"),
            Message::assistant("ok"),
            Message::user("what is in this picture?"),
        ],
        images: vec!["data:image/png;base64,AAAA".to_string()],
        mcp_servers: Some(Vec::new()),
        ..TurnRequest::default()
    };

    let payload = h.turns.assemble(req).await.unwrap();

    let first = serde_json::to_value(&payload.messages[0]).unwrap();
    assert_eq!(first["content"], "earlier");

    let last = serde_json::to_value(&payload.messages[2]).unwrap();
    assert_eq!(last["content"][0]["text"], "what is in this picture?");
    assert_eq!(last["content"][1]["type"], "image_url");
    assert_eq!(last["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
}

#[tokio::test]
async fn test_store_failures_do_not_fail_the_turn() {
    let store = FlakyStore {
        fail_writes: true,
        fail_history: true,
        fail_documents: true,
        ..FlakyStore::new()
    };
    let h = harness(vec![text_reply("still here")], Arc::new(store));
    let req = TurnRequest {
        session_id: Some("s1".to_string()),
        ..request("hi")
    };

    let events = collect(&h.turns, req).await;

    assert!(events.contains(&NormalizedEvent::MessageDelta {
        text: "still here".to_string()
    }));
    assert_eq!(events.last(), Some(&NormalizedEvent::Done));
}

#[tokio::test]
async fn test_no_session_stores_nothing() {
    let h = harness(vec![text_reply("hello")], Arc::new(MemoryStore::new()));

    let payload_events = collect(&h.turns, request("hi")).await;
    assert_eq!(payload_events.last(), Some(&NormalizedEvent::Done));

    let stored = h
        .store
        .recent_conversations(&ConversationFilter::default(), 10)
        .await
        .unwrap();
    assert!(stored.is_empty());
}
