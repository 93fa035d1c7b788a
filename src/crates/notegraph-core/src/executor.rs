//! The step loop: execute node → merge update → checkpoint → route.

use crate::channels::StateSchema;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, END};
use crate::node::{InterruptRecord, NodeContext, NodeFn};
use crate::stream::GraphEvent;
use notegraph_checkpoint::{CheckpointSaver, InterruptWrite};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Default step ceiling; generous compared to the tool-call limit so the
/// graph itself ends loops before this fires.
const DEFAULT_MAX_STEPS: usize = 128;

/// Input for one turn: a fresh update or a resume decision.
#[derive(Debug, Clone)]
pub enum GraphInput {
    /// Apply this partial update (typically the new user message plus live
    /// UI toggles) and run from the entry node.
    Start(Value),

    /// Resume a suspended thread. `state_update` carries live state (UI
    /// toggles changed while the approval dialog was open) applied before
    /// the suspended node re-executes.
    Resume {
        decision: Value,
        state_update: Option<Value>,
    },
}

struct GraphInner {
    schema: StateSchema,
    nodes: HashMap<String, NodeFn>,
    edges: HashMap<String, Edge>,
    entry: String,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    max_steps: usize,
    // One guard per thread; runs on the same thread id serialize.
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// An executable graph. Cheap to clone; meant to live as a process singleton.
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

impl CompiledGraph {
    pub(crate) fn new(
        schema: StateSchema,
        nodes: HashMap<String, NodeFn>,
        edges: HashMap<String, Edge>,
        entry: String,
    ) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                schema,
                nodes,
                edges,
                entry,
                checkpointer: None,
                max_steps: DEFAULT_MAX_STEPS,
                thread_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn CheckpointSaver>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_checkpointer must be called before the graph is shared");
        inner.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_max_steps must be called before the graph is shared");
        inner.max_steps = max_steps;
        self
    }

    pub fn checkpointer(&self) -> Option<Arc<dyn CheckpointSaver>> {
        self.inner.checkpointer.clone()
    }

    /// Run a turn, streaming events as they happen.
    ///
    /// The stream always terminates with exactly one of `Done`, `Interrupt`,
    /// or `Error`. Dropping the receiver cancels the run between steps; any
    /// in-flight checkpoint write completes first.
    pub fn stream(
        &self,
        input: GraphInput,
        thread_id: impl Into<String>,
    ) -> UnboundedReceiverStream<GraphEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        let thread_id = thread_id.into();

        tokio::spawn(async move {
            if let Err(e) = run_loop(&inner, input, &thread_id, &tx).await {
                let _ = tx.send(GraphEvent::Error {
                    message: e.to_string(),
                });
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    /// Run a turn to completion and return the final state.
    ///
    /// Interrupts surface as `Err(GraphError::Suspended)`.
    pub async fn invoke(&self, input: GraphInput, thread_id: &str) -> Result<Value> {
        use futures::StreamExt;

        let mut stream = self.stream(input, thread_id);
        while let Some(event) = stream.next().await {
            match event {
                GraphEvent::Done { state } => return Ok(state),
                GraphEvent::Interrupt { id, value } => {
                    return Err(GraphError::Suspended(InterruptRecord {
                        id,
                        node: value
                            .get("node")
                            .and_then(|n| n.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        value,
                    }))
                }
                GraphEvent::Error { message } => return Err(GraphError::Execution(message)),
                _ => {}
            }
        }
        Err(GraphError::Execution(
            "graph stream ended without a terminal event".to_string(),
        ))
    }
}

async fn thread_lock(inner: &GraphInner, thread_id: &str) -> Arc<Mutex<()>> {
    let mut locks = inner.thread_locks.lock().await;
    locks
        .entry(thread_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

async fn run_loop(
    inner: &GraphInner,
    input: GraphInput,
    thread_id: &str,
    tx: &mpsc::UnboundedSender<GraphEvent>,
) -> Result<()> {
    let lock = thread_lock(inner, thread_id).await;
    let _guard = lock.lock().await;

    let mut state = match &inner.checkpointer {
        Some(cp) => cp
            .get_latest(thread_id)
            .await?
            .map(|c| c.channel_values)
            .unwrap_or_else(|| Value::Object(Default::default())),
        None => Value::Object(Default::default()),
    };

    let (mut current, mut resume, mut pending_payload) = match input {
        GraphInput::Start(update) => {
            inner.schema.apply(&mut state, &update)?;
            persist(inner, thread_id, &state).await?;
            (inner.entry.clone(), None, None)
        }
        GraphInput::Resume {
            decision,
            state_update,
        } => {
            let cp = inner
                .checkpointer
                .as_ref()
                .ok_or_else(|| GraphError::NoPendingInterrupt(thread_id.to_string()))?;
            // Read the pending interrupt before any new checkpoint
            // supersedes it.
            let pending = cp.pending_interrupts(thread_id).await?;
            let record: InterruptRecord = match pending.first() {
                Some(write) => serde_json::from_value(write.value.clone())?,
                None => return Err(GraphError::NoPendingInterrupt(thread_id.to_string())),
            };

            if let Some(update) = state_update {
                inner.schema.apply(&mut state, &update)?;
                persist(inner, thread_id, &state).await?;
            }
            let payload = record.value.clone();
            (record.node, Some(decision), Some(payload))
        }
    };

    let mut steps = 0usize;
    while current != END {
        if steps >= inner.max_steps {
            return Err(GraphError::RecursionLimit(inner.max_steps));
        }
        steps += 1;

        // Client disconnect: stop between steps, state already durable.
        if tx.is_closed() {
            debug!(thread_id, node = %current, "stream receiver dropped, stopping run");
            return Ok(());
        }

        let node = inner
            .nodes
            .get(&current)
            .ok_or_else(|| GraphError::Execution(format!("node '{}' is not defined", current)))?
            .clone();

        let ctx = NodeContext::new(thread_id, current.clone(), resume.take(), tx.clone())
            .with_pending_payload(pending_payload.take());

        match node(state.clone(), ctx).await {
            Ok(update) => {
                inner.schema.apply(&mut state, &update)?;
                persist(inner, thread_id, &state).await?;
                let _ = tx.send(GraphEvent::Updates {
                    node: current.clone(),
                    update,
                });
                current = route(inner, &current, &state);
            }
            Err(GraphError::Suspended(record)) => {
                suspend(inner, thread_id, &state, &record).await?;
                let _ = tx.send(GraphEvent::Interrupt {
                    id: record.id.clone(),
                    value: record.value.clone(),
                });
                return Ok(());
            }
            Err(e) => {
                warn!(thread_id, node = %current, error = %e, "node failed");
                return Err(GraphError::node_execution(current, e.to_string()));
            }
        }
    }

    let _ = tx.send(GraphEvent::Done { state });
    Ok(())
}

async fn persist(inner: &GraphInner, thread_id: &str, state: &Value) -> Result<()> {
    if let Some(cp) = &inner.checkpointer {
        cp.put(thread_id, state.clone()).await?;
    }
    Ok(())
}

async fn suspend(
    inner: &GraphInner,
    thread_id: &str,
    state: &Value,
    record: &InterruptRecord,
) -> Result<()> {
    if let Some(cp) = &inner.checkpointer {
        let checkpoint_id = cp.put(thread_id, state.clone()).await?;
        cp.put_writes(
            thread_id,
            checkpoint_id,
            vec![InterruptWrite::interrupt(
                record.node.clone(),
                serde_json::to_value(record)?,
            )],
        )
        .await?;
    }
    Ok(())
}

fn route(inner: &GraphInner, from: &str, state: &Value) -> String {
    match inner.edges.get(from) {
        Some(Edge::Direct(to)) => to.clone(),
        Some(Edge::Conditional { router, branches }) => {
            let label = router(state);
            branches.get(&label).cloned().unwrap_or(label)
        }
        None => END.to_string(),
    }
}
