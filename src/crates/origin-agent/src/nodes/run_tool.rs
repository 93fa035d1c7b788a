//! Execute the selected tool under policy, approval, and doom-loop guards.

use super::{parse_state, AgentDeps};
use crate::approval::{merge_args, parse_decision, ApprovalRequest, ResumeDecision};
use crate::loop_guard::{fingerprint, LoopGuard, LoopVerdict};
use crate::normalize::normalize_note_id;
use crate::policy::{self, PolicyInput};
use crate::tools::result_is_error;
use notegraph_core::error::{GraphError, Result};
use notegraph_core::messages::{Message, ToolCall};
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const DOOM_LOOP_RESULT: &str = "[DOOM LOOP DETECTED] The same tool was invoked repeatedly with identical arguments. Execution was stopped; explain the situation to the user instead of retrying.";

const APPROVAL_REJECTED_RESULT: &str =
    "Write action rejected: the user declined the approval request.";

pub async fn run_one_tool_node(
    deps: Arc<AgentDeps>,
    value: Value,
    mut ctx: NodeContext,
) -> Result<Value> {
    let state = parse_state(&value)?;
    let Some(call) = state.next_tool_call.clone() else {
        return Ok(json!({ "next_tool_call": null }));
    };

    let is_write = deps.registry.is_write_tool(&call.name);
    let mut args = call.args.clone();
    normalize_note_id(&call.name, is_write, &mut args, &state, &deps.settings.normalize);

    let guard = LoopGuard::new(deps.settings.doom_loop_threshold);
    let mut args_fingerprint = fingerprint(&args);
    let verdict = guard.check(
        &call.name,
        &args_fingerprint,
        state.last_tool_name.as_deref(),
        state.last_tool_fingerprint.as_deref(),
        state.tool_repeat_count,
    );
    let repeat_count = match verdict {
        LoopVerdict::Proceed { repeat_count } | LoopVerdict::DoomLoop { repeat_count } => {
            repeat_count
        }
    };

    let last_user_text = state.last_user_text();
    let decision = policy::evaluate(&PolicyInput {
        tool_name: &call.name,
        is_write_tool: is_write,
        agent_mode: state.agent_mode,
        auto_accept_writes: state.auto_accept_writes,
        last_user_text: last_user_text.as_deref(),
        write_authorized: state.write_authorized.unwrap_or(false),
    });
    info!(
        tool = %call.name,
        action = ?decision.action,
        code = decision.code,
        "write policy decision"
    );

    if !decision.is_allow() {
        let content = format!("Write action blocked ({}): {}", decision.code, decision.reason);
        return Ok(finish(&state, &call, &args_fingerprint, repeat_count, content, false));
    }

    // Human approval for writes when auto-accept is off. On resume the
    // persisted payload is authoritative — its approval_id is what the
    // client echoes back.
    if is_write && !state.auto_accept_writes {
        let request = match ctx.pending_payload() {
            Some(payload) => serde_json::from_value::<ApprovalRequest>(payload.clone())
                .map_err(|e| GraphError::Execution(format!("corrupt approval payload: {}", e)))?,
            None => ApprovalRequest::new(
                call.name.clone(),
                args.clone(),
                state.active_note_title.clone(),
            ),
        };
        let payload = serde_json::to_value(&request)?;
        let answer = ctx.interrupt(payload)?;

        match parse_decision(&answer, &request.approval_id) {
            ResumeDecision::Approved { args_override } => {
                if args_override.is_some() {
                    args = merge_args(args, args_override);
                    args_fingerprint = fingerprint(&args);
                }
            }
            ResumeDecision::Rejected => {
                info!(tool = %call.name, "write approval rejected");
                return Ok(finish(
                    &state,
                    &call,
                    &args_fingerprint,
                    repeat_count,
                    APPROVAL_REJECTED_RESULT.to_string(),
                    false,
                ));
            }
        }
    }

    if let LoopVerdict::DoomLoop { .. } = verdict {
        warn!(tool = %call.name, repeat_count, "doom loop detected");
        return Ok(finish(
            &state,
            &call,
            &args_fingerprint,
            repeat_count,
            DOOM_LOOP_RESULT.to_string(),
            false,
        ));
    }

    let result = deps.registry.invoke(&call.name, &args).await;
    let success = !result_is_error(&result);
    info!(tool = %call.name, success, "tool executed");

    Ok(finish(&state, &call, &args_fingerprint, repeat_count, result, success))
}

fn finish(
    state: &crate::state::AgentState,
    call: &ToolCall,
    args_fingerprint: &str,
    repeat_count: u32,
    content: String,
    success: bool,
) -> Value {
    json!({
        "messages": [Message::tool(content, call.id.clone())],
        "tool_call_count": state.tool_call_count + 1,
        "last_tool_name": call.name,
        "last_tool_fingerprint": args_fingerprint,
        "tool_repeat_count": repeat_count,
        "last_tool_success": success,
        "next_tool_call": null,
    })
}
