//! LLM-backed classifiers: intent routing and write authorization.
//!
//! Both classifiers fail safe: a broken or ambiguous model answer routes to
//! `TASK` (tools stay reachable) and denies writes respectively.

use crate::prompts;
use crate::state::{AgentState, Intent};
use notegraph_core::llm::{ChatModel, ChatRequest};
use notegraph_core::messages::Message;
use std::sync::Arc;
use tracing::warn;

/// Summarize the last one or two messages for the router prompt.
fn routing_digest(state: &AgentState) -> String {
    let mut lines: Vec<String> = Vec::new();
    for msg in state.messages.iter().rev().take(2).collect::<Vec<_>>().into_iter().rev() {
        let text = msg.text();
        if text.trim().is_empty() {
            continue;
        }
        let who = if msg.is_human() { "User" } else { "Assistant" };
        let short: String = text.chars().take(400).collect();
        lines.push(format!("{}: {}", who, short));
    }
    lines.join("\n")
}

pub async fn classify_intent(model: &Arc<dyn ChatModel>, state: &AgentState) -> Intent {
    if state.use_knowledge {
        return Intent::Task;
    }

    let request = ChatRequest::new(vec![
        Message::system(prompts::ROUTER_PROMPT),
        Message::human(routing_digest(state)),
    ])
    .with_temperature(0.0)
    .with_max_tokens(8);

    match model.chat(request).await {
        Ok(response) => parse_intent(&response.message.text()),
        Err(e) => {
            // Tools stay reachable when the router is unavailable.
            warn!(error = %e, "intent classifier failed, defaulting to TASK");
            Intent::Task
        }
    }
}

pub(crate) fn parse_intent(answer: &str) -> Intent {
    let first = answer.split_whitespace().next().unwrap_or("");
    if first.to_uppercase().contains("TASK") {
        Intent::Task
    } else {
        Intent::Chat
    }
}

pub async fn classify_write_authorization(
    model: &Arc<dyn ChatModel>,
    last_user_text: &str,
) -> bool {
    let request = ChatRequest::new(vec![
        Message::system(prompts::WRITE_CLASSIFIER_PROMPT),
        Message::human(last_user_text.to_string()),
    ])
    .with_temperature(0.0)
    .with_max_tokens(8);

    match model.chat(request).await {
        Ok(response) => parse_write_authorization(&response.message.text()),
        Err(e) => {
            warn!(error = %e, "write classifier failed, denying writes");
            false
        }
    }
}

pub(crate) fn parse_write_authorization(answer: &str) -> bool {
    for token in answer.split_whitespace() {
        let upper = token
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .to_uppercase();
        match upper.as_str() {
            "ALLOW_WRITE" | "ALLOW" => return true,
            "DENY_WRITE" | "DENY" => return false,
            _ => continue,
        }
    }
    false
}
