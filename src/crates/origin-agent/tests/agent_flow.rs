//! End-to-end turns through the service layer with a scripted model.

use futures::StreamExt;
use llm::ProviderManager;
use notegraph_checkpoint::{CheckpointSaver, InMemorySaver};
use notegraph_core::messages::{Message, ToolCall};
use origin_agent::config::Settings;
use origin_agent::state::AgentMode;
use origin_agent::store::NoteStore;
use origin_agent::supervisor::{AgentService, TurnRequest};
use origin_agent::testing::{InMemoryNoteStore, ScriptedChatModel, StaticSearchIndex};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const NOTE_ID: &str = "1700000000000-abcdef012";

struct Harness {
    service: Arc<AgentService>,
    saver: Arc<InMemorySaver>,
    store: Arc<InMemoryNoteStore>,
    model: Arc<ScriptedChatModel>,
}

async fn harness(model: ScriptedChatModel, settings: Settings) -> Harness {
    let dir = std::env::temp_dir().join(format!("origin-test-{}", uuid::Uuid::new_v4()));
    let providers = Arc::new(
        ProviderManager::load(dir.join("providers.json"))
            .await
            .unwrap(),
    );
    let saver = Arc::new(InMemorySaver::new());
    let store = Arc::new(InMemoryNoteStore::new());
    store
        .seed_note(NOTE_ID, "Old Title", "# Old Title\n\nSome content.")
        .await;
    let index = Arc::new(StaticSearchIndex::new(vec![]));
    let model = Arc::new(model);

    let service = Arc::new(
        AgentService::new(
            providers,
            saver.clone(),
            store.clone(),
            index,
            Arc::new(settings),
        )
        .with_model(model.clone()),
    );
    Harness {
        service,
        saver,
        store,
        model,
    }
}

fn turn(message: &str) -> TurnRequest {
    TurnRequest {
        message: message.to_string(),
        thread_id: "thread-1".to_string(),
        note_context: None,
        selected_text: None,
        active_note_id: Some(NOTE_ID.to_string()),
        active_note_title: Some("Old Title".to_string()),
        context_note_id: None,
        context_note_title: None,
        use_knowledge: false,
        auto_accept_writes: true,
        agent_mode: AgentMode::Agent,
        attachments: vec![],
        resume: None,
        model_provider_id: None,
        model_name: None,
    }
}

fn tool_call_message(id: &str, name: &str, args: Value) -> Message {
    let args: Map<String, Value> = args.as_object().unwrap().clone();
    Message::assistant("").with_tool_calls(vec![ToolCall::new(id, name, args)])
}

async fn run_turn(service: &Arc<AgentService>, request: TurnRequest) -> Vec<Value> {
    let lines: Vec<String> = service.handle_turn(request).collect().await;
    lines
        .iter()
        .map(|l| serde_json::from_str(l).expect("every line is JSON"))
        .collect()
}

fn tool_parts(events: &[Value]) -> Vec<&Value> {
    events
        .iter()
        .filter(|e| e["part_type"] == "tool")
        .collect()
}

#[tokio::test]
async fn ask_mode_blocks_writes() {
    let model = ScriptedChatModel::new(vec![
        tool_call_message("c1", "delete_note", json!({"note_id": NOTE_ID})),
        Message::assistant("I'm in read-only mode, so I can't delete this note."),
    ])
    .with_intent("TASK");
    let h = harness(model, Settings::default()).await;

    let mut request = turn("Delete this note.");
    request.agent_mode = AgentMode::Ask;
    let events = run_turn(&h.service, request).await;

    // The write never executed.
    assert!(h.store.get_note(NOTE_ID).await.unwrap().is_some());

    // The blocked decision surfaced as the tool's output.
    let completed: Vec<&Value> = tool_parts(&events)
        .into_iter()
        .filter(|e| e["status"] == "completed")
        .collect();
    assert_eq!(completed.len(), 1);
    let output = completed[0]["output"].as_str().unwrap();
    assert!(output.contains("ask_mode_read_only"), "got: {output}");

    // The assistant still explained itself.
    assert!(events.iter().any(|e| e["part_type"] == "text"));
}

#[tokio::test]
async fn auto_accept_write_streams_in_order() {
    let model = ScriptedChatModel::new(vec![
        tool_call_message(
            "c1",
            "rename_note",
            json!({"note_id": NOTE_ID, "new_title": "Weekly Plan"}),
        ),
        Message::assistant("Title updated to 'Weekly Plan'."),
    ]);
    let h = harness(model, Settings::default()).await;

    let events = run_turn(&h.service, turn("Rename this to 'Weekly Plan'")).await;

    assert_eq!(
        h.store.get_note(NOTE_ID).await.unwrap().unwrap().title,
        "Weekly Plan"
    );

    // status → tool(running) → tool(completed) → legacy → text → status("")
    assert_eq!(events[0]["type"], "status");
    assert_eq!(events[1]["part_type"], "tool");
    assert_eq!(events[1]["status"], "running");
    assert_eq!(events[1]["tool_name"], "rename_note");
    assert_eq!(events[2]["status"], "completed");
    assert_eq!(events[3]["tool_call"], "note_renamed");
    assert_eq!(events[3]["note_id"], NOTE_ID);
    assert_eq!(events[4]["part_type"], "text");
    let last = events.last().unwrap();
    assert_eq!(last["type"], "status");
    assert_eq!(last["text"], "");
}

#[tokio::test]
async fn manual_approval_suspends_then_resumes() {
    let model = ScriptedChatModel::new(vec![
        tool_call_message(
            "c1",
            "rename_note",
            json!({"note_id": NOTE_ID, "new_title": "Weekly Plan"}),
        ),
        Message::assistant("Done — the note is now called 'Weekly Plan'."),
    ]);
    let h = harness(model, Settings::default()).await;

    let mut request = turn("Rename this to 'Weekly Plan'");
    request.auto_accept_writes = false;
    let events = run_turn(&h.service, request).await;

    let approval = events
        .iter()
        .find(|e| e["type"] == "approval_required")
        .expect("turn ends awaiting approval");
    assert_eq!(approval["approval"]["tool"], "rename_note");
    assert_eq!(approval["approval"]["kind"], "write_tool_approval");
    let approval_id = approval["approval"]["approval_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Still suspended: nothing renamed, one pending interrupt.
    assert_eq!(
        h.store.get_note(NOTE_ID).await.unwrap().unwrap().title,
        "Old Title"
    );
    assert_eq!(h.saver.pending_interrupts("thread-1").await.unwrap().len(), 1);

    let mut resume = turn("");
    resume.auto_accept_writes = false;
    resume.resume = Some(json!({"action": "approve", "approval_id": approval_id}));
    let events = run_turn(&h.service, resume).await;

    assert_eq!(
        h.store.get_note(NOTE_ID).await.unwrap().unwrap().title,
        "Weekly Plan"
    );
    assert!(events.iter().any(|e| e["tool_call"] == "note_renamed"));
    assert!(h.saver.pending_interrupts("thread-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn mismatched_approval_id_rejects_the_write() {
    let model = ScriptedChatModel::new(vec![
        tool_call_message(
            "c1",
            "rename_note",
            json!({"note_id": NOTE_ID, "new_title": "Weekly Plan"}),
        ),
        Message::assistant("Understood, I won't rename it."),
    ]);
    let h = harness(model, Settings::default()).await;

    let mut request = turn("Rename this to 'Weekly Plan'");
    request.auto_accept_writes = false;
    run_turn(&h.service, request).await;

    let mut resume = turn("");
    resume.auto_accept_writes = false;
    resume.resume = Some(json!({"action": "approve", "approval_id": "stale-id"}));
    let events = run_turn(&h.service, resume).await;

    // Treated as reject: no write occurred.
    assert_eq!(
        h.store.get_note(NOTE_ID).await.unwrap().unwrap().title,
        "Old Title"
    );
    let rejected = events
        .iter()
        .filter(|e| e["status"] == "completed")
        .any(|e| e["output"].as_str().unwrap().contains("rejected"));
    assert!(rejected);
}

#[tokio::test]
async fn inline_token_resumes_pending_approval() {
    let model = ScriptedChatModel::new(vec![
        tool_call_message(
            "c1",
            "rename_note",
            json!({"note_id": NOTE_ID, "new_title": "Weekly Plan"}),
        ),
        Message::assistant("改好了。"),
    ]);
    let h = harness(model, Settings::default()).await;

    let mut request = turn("Rename this to 'Weekly Plan'");
    request.auto_accept_writes = false;
    run_turn(&h.service, request).await;

    // "继续" as the next message counts as an approval.
    let mut inline = turn("继续");
    inline.auto_accept_writes = false;
    run_turn(&h.service, inline).await;

    assert_eq!(
        h.store.get_note(NOTE_ID).await.unwrap().unwrap().title,
        "Weekly Plan"
    );

    // Resume implies no extra user message in history.
    let state = h.saver.get_latest("thread-1").await.unwrap().unwrap();
    let messages: Vec<Message> =
        serde_json::from_value(state.channel_values["messages"].clone()).unwrap();
    let humans = messages.iter().filter(|m| m.is_human()).count();
    assert_eq!(humans, 1);
}

#[tokio::test]
async fn pending_approval_without_token_gets_guidance() {
    let model = ScriptedChatModel::new(vec![tool_call_message(
        "c1",
        "rename_note",
        json!({"note_id": NOTE_ID, "new_title": "Weekly Plan"}),
    )]);
    let h = harness(model, Settings::default()).await;

    let mut request = turn("Rename this to 'Weekly Plan'");
    request.auto_accept_writes = false;
    run_turn(&h.service, request).await;

    let events = run_turn(&h.service, turn("also fix the typos please")).await;
    assert_eq!(events.len(), 1);
    let error = events[0]["error"].as_str().unwrap();
    assert!(error.contains("awaiting your approval"), "got: {error}");
}

#[tokio::test]
async fn resume_without_checkpoint_errors() {
    let model = ScriptedChatModel::new(vec![]);
    let h = harness(model, Settings::default()).await;

    let mut request = turn("");
    request.resume = Some(json!(true));
    let events = run_turn(&h.service, request).await;
    assert_eq!(events.len(), 1);
    assert!(events[0]["error"]
        .as_str()
        .unwrap()
        .contains("No pending approval"));
}

#[tokio::test]
async fn doom_loop_halts_identical_calls() {
    let same_args = json!({"query": "weekly plan"});
    let model = ScriptedChatModel::new(vec![
        tool_call_message("c1", "search_knowledge", same_args.clone()),
        tool_call_message("c2", "search_knowledge", same_args.clone()),
        tool_call_message("c3", "search_knowledge", same_args.clone()),
        Message::assistant("I kept getting the same result, so I stopped searching."),
    ])
    .with_write_authorization("DENY_WRITE");
    let h = harness(model, Settings::default()).await;

    let events = run_turn(&h.service, turn("find my weekly plan")).await;

    let completed: Vec<String> = events
        .iter()
        .filter(|e| e["status"] == "completed")
        .map(|e| e["output"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(completed.len(), 3);
    assert!(completed[2].contains("[DOOM LOOP DETECTED]"), "got: {}", completed[2]);

    let state = h.saver.get_latest("thread-1").await.unwrap().unwrap();
    assert_eq!(state.channel_values["tool_call_count"], 3);
}

#[tokio::test]
async fn orphan_checkpoint_is_healed_before_turn() {
    let model = ScriptedChatModel::new(vec![Message::assistant("Hello again!")])
        .with_intent("CHAT");
    let h = harness(model, Settings::default()).await;

    // Seed a corrupted thread: an assistant tool call with no tool result
    // and no pending interrupt.
    let orphan = Message::assistant("")
        .with_id("a1")
        .with_tool_calls(vec![ToolCall::new("c9", "update_note", Map::new())]);
    h.saver
        .put(
            "thread-1",
            json!({"messages": [Message::human("earlier").with_id("u0"), orphan]}),
        )
        .await
        .unwrap();

    let events = run_turn(&h.service, turn("hi")).await;
    assert!(events.iter().all(|e| e.get("error").is_none()));

    // The thread restarted fresh: exactly the new user message and reply.
    let state = h.saver.get_latest("thread-1").await.unwrap().unwrap();
    let messages: Vec<Message> =
        serde_json::from_value(state.channel_values["messages"].clone()).unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_human());
    assert_eq!(messages[0].text(), "hi");
}

#[tokio::test]
async fn tool_budget_stops_further_calls() {
    let settings = Settings {
        max_tool_calls: 1,
        ..Settings::default()
    };
    let model = ScriptedChatModel::new(vec![
        tool_call_message("c1", "search_knowledge", json!({"query": "a"})),
        tool_call_message("c2", "search_knowledge", json!({"query": "b"})),
        Message::assistant("budget spent"),
    ])
    .with_write_authorization("DENY_WRITE");
    let h = harness(model, settings).await;

    let events = run_turn(&h.service, turn("search twice please")).await;

    let completed = events.iter().filter(|e| e["status"] == "completed").count();
    assert_eq!(completed, 1);

    let state = h.saver.get_latest("thread-1").await.unwrap().unwrap();
    assert_eq!(state.channel_values["tool_call_count"], 1);

    // The second scripted tool call was emitted by the model but never
    // executed; the final text response was never needed.
    assert_eq!(h.model.remaining(), 1);
}

#[tokio::test]
async fn fast_chat_turn_streams_text_only() {
    let model = ScriptedChatModel::new(vec![Message::assistant("Just chatting. Nothing else.")])
        .with_intent("CHAT");
    let h = harness(model, Settings::default()).await;

    let events = run_turn(&h.service, turn("how are you?")).await;

    assert!(tool_parts(&events).is_empty());
    let text: String = events
        .iter()
        .filter(|e| e["part_type"] == "text")
        .map(|e| e["delta"].as_str().unwrap())
        .collect();
    assert_eq!(text, "Just chatting. Nothing else.");
}
