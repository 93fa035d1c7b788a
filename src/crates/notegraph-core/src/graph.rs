//! Graph definition: named nodes wired by direct and conditional edges.

use crate::channels::StateSchema;
use crate::error::{GraphError, Result};
use crate::executor::CompiledGraph;
use crate::node::{NodeFn, NodeFuture, NodeContext};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const START: &str = "__start__";
pub const END: &str = "__end__";

pub type EdgeRouter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Edge {
    Direct(String),
    Conditional {
        router: EdgeRouter,
        branches: HashMap<String, String>,
    },
}

/// Builder for a compiled graph.
///
/// Nodes are async closures over `(state, ctx)`; edges are deterministic
/// wiring validated at compile time.
pub struct StateGraph {
    schema: StateSchema,
    nodes: HashMap<String, NodeFn>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
        }
    }

    pub fn add_node<F>(&mut self, name: impl Into<String>, node: F) -> &mut Self
    where
        F: Fn(Value, NodeContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.nodes.insert(name.into(), Arc::new(node));
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.entry = Some(to);
        } else {
            self.edges.insert(from, Edge::Direct(to));
        }
        self
    }

    /// Route `from` through `router`; the returned label is looked up in
    /// `branches` (falling back to the label itself when absent).
    pub fn add_conditional_edge<F>(
        &mut self,
        from: impl Into<String>,
        router: F,
        branches: HashMap<String, String>,
    ) -> &mut Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                branches,
            },
        );
        self
    }

    pub fn compile(self) -> Result<CompiledGraph> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| GraphError::Validation("no entry edge from START".to_string()))?;

        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::Validation(format!(
                "entry node '{}' is not defined",
                entry
            )));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{}' is not a defined node",
                    from
                )));
            }
            let targets: Vec<&String> = match edge {
                Edge::Direct(to) => vec![to],
                Edge::Conditional { branches, .. } => branches.values().collect(),
            };
            for to in targets {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(GraphError::Validation(format!(
                        "edge target '{}' is not a defined node",
                        to
                    )));
                }
            }
        }

        Ok(CompiledGraph::new(self.schema, self.nodes, self.edges, entry))
    }
}
