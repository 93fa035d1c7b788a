//! Doom-loop detection.
//!
//! Tool invocations are fingerprinted over canonical (key-sorted) JSON of
//! their arguments. Repeating the same tool with the same fingerprint is the
//! signature of a confused model; the guard halts the run of repeats at the
//! configured threshold.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Stable text form of a JSON value: object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Hex digest of a tool call's canonicalized arguments.
pub fn fingerprint(args: &Map<String, Value>) -> String {
    let canonical = canonical_json(&Value::Object(args.clone()));
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    Proceed { repeat_count: u32 },
    DoomLoop { repeat_count: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct LoopGuard {
    threshold: u32,
}

impl LoopGuard {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Judge the next invocation given the previous one's bookkeeping.
    pub fn check(
        &self,
        tool_name: &str,
        args_fingerprint: &str,
        last_tool_name: Option<&str>,
        last_fingerprint: Option<&str>,
        last_repeat_count: u32,
    ) -> LoopVerdict {
        let identical =
            last_tool_name == Some(tool_name) && last_fingerprint == Some(args_fingerprint);
        let repeat_count = if identical { last_repeat_count + 1 } else { 1 };

        if identical && repeat_count >= self.threshold {
            LoopVerdict::DoomLoop { repeat_count }
        } else {
            LoopVerdict::Proceed { repeat_count }
        }
    }
}
