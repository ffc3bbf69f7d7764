//! Typed directed graph over an application state, with conditional routing.
//!
//! This is a deliberately smaller, typed cousin of the dynamic
//! `serde_json::Value`-keyed graph engines common in this space: instead of a
//! dictionary of optional keys merged by per-field reducers, the state is a
//! single application-defined struct (`S`) and each node returns a partial
//! update (`U`) that the engine merges via [`MergeUpdate`]. Routing decisions
//! are still dynamic — a [`Router`] inspects the state after a merge and
//! picks the next node — but the state itself is fully typed.
//!
//! # Example
//!
//! ```
//! use langgraph_core::graph::{Edge, Graph, NodeSpec, END, START};
//! use langgraph_core::error::GraphError;
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Counter { value: i64 }
//!
//! struct Add(i64);
//!
//! impl langgraph_core::graph::MergeUpdate<Add> for Counter {
//!     fn merge(&mut self, update: Add) {
//!         self.value += update.0;
//!     }
//! }
//!
//! impl langgraph_core::graph::FromEngineFailure for Add {
//!     fn from_engine_failure(_node: &str, _message: String) -> Self {
//!         Add(0)
//!     }
//! }
//!
//! # async fn run() -> Result<Counter, GraphError> {
//! let mut graph: Graph<Counter, Add, ()> = Graph::new();
//! graph.add_node(NodeSpec::new("increment", |state: Counter, _deps: ()| {
//!     Box::pin(async move { Ok(Add(1)) })
//! }));
//! graph.add_edge("increment", END);
//! graph.set_entry("increment");
//!
//! let compiled = graph.compile()?;
//! let result = compiled.invoke(Counter { value: 0 }, (), 100).await?;
//! assert_eq!(result.value, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{GraphError, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel entry node id, mirroring the `START`/`END` convention used by
/// state-graph frameworks in this space.
pub const START: &str = "__start__";
/// Sentinel terminal node id. Reaching it ends execution.
pub const END: &str = "__end__";

pub type NodeId = String;

/// Applies a partial node update onto the owning state.
///
/// Implemented once per concrete `(State, Update)` pair. Most fields have a
/// single writer node and are simply overwritten; append-only fields (an
/// execution log, a trace buffer) should be appended here rather than
/// replaced.
pub trait MergeUpdate<U> {
    fn merge(&mut self, update: U);
}

/// Lets the engine express "a node's executor returned `Err`" as a regular
/// update, so error handling stays inside the typed state instead of
/// becoming a second, untyped failure channel.
pub trait FromEngineFailure {
    fn from_engine_failure(node: &str, message: String) -> Self;
}

/// Lets a state forcibly override normal routing, e.g. "if an error was set
/// by the last node, go to the error handler regardless of what it asked
/// for". Returning `None` falls through to the graph's configured edges.
pub trait RouteOverride {
    fn route_override(&self) -> Option<NodeId> {
        None
    }
}

type NodeFn<S, U, D> =
    Arc<dyn Fn(S, D) -> BoxFuture<'static, Result<U>> + Send + Sync>;

#[derive(Clone)]
pub struct NodeSpec<S, U, D> {
    pub name: NodeId,
    executor: NodeFn<S, U, D>,
}

impl<S, U, D> NodeSpec<S, U, D> {
    pub fn new<F>(name: impl Into<NodeId>, executor: F) -> Self
    where
        F: Fn(S, D) -> BoxFuture<'static, Result<U>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            executor: Arc::new(executor),
        }
    }
}

/// A router inspects the freshly merged state and names the next node.
pub type Router<S> = Arc<dyn Fn(&S) -> NodeId + Send + Sync>;

#[derive(Clone)]
pub enum Edge<S> {
    /// Always proceed to this node.
    Direct(NodeId),
    /// Ask `router` which node to run next; `branches` lists every node the
    /// router is allowed to name, used purely for validation at compile time.
    Conditional {
        router: Router<S>,
        branches: Vec<NodeId>,
    },
}

/// An unvalidated graph under construction.
pub struct Graph<S, U, D> {
    nodes: HashMap<NodeId, NodeSpec<S, U, D>>,
    edges: HashMap<NodeId, Edge<S>>,
    entry: NodeId,
}

impl<S, U, D> Default for Graph<S, U, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, U, D> Graph<S, U, D> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: START.to_string(),
        }
    }

    pub fn add_node(&mut self, spec: NodeSpec<S, U, D>) -> &mut Self {
        self.nodes.insert(spec.name.clone(), spec);
        self
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<NodeId>,
        router: Router<S>,
        branches: Vec<NodeId>,
    ) -> &mut Self {
        self.edges
            .insert(from.into(), Edge::Conditional { router, branches });
        self
    }

    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.entry = node.into();
        self
    }

    /// Validate node/edge references and produce an executable graph.
    pub fn compile(self) -> Result<CompiledGraph<S, U, D>> {
        if self.entry != START && !self.nodes.contains_key(&self.entry) {
            return Err(GraphError::Validation(format!(
                "entry point '{}' is not a registered node",
                self.entry
            )));
        }
        for (from, edge) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{from}' is not a registered node"
                )));
            }
            match edge {
                Edge::Direct(to) => self.validate_target(to)?,
                Edge::Conditional { branches, .. } => {
                    for branch in branches {
                        self.validate_target(branch)?;
                    }
                }
            }
        }
        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry: self.entry,
        })
    }

    fn validate_target(&self, target: &str) -> Result<()> {
        if target == END || self.nodes.contains_key(target) {
            Ok(())
        } else {
            Err(GraphError::Validation(format!(
                "edge target '{target}' is not a registered node"
            )))
        }
    }
}

/// A validated, runnable graph.
pub struct CompiledGraph<S, U, D> {
    nodes: HashMap<NodeId, NodeSpec<S, U, D>>,
    edges: HashMap<NodeId, Edge<S>>,
    entry: NodeId,
}

/// One step of a run, useful for tests and for building an observability
/// trace without baking tracing concerns into the engine itself.
#[derive(Debug, Clone)]
pub struct VisitedNode {
    pub node: NodeId,
    pub ok: bool,
}

impl<S, U, D> CompiledGraph<S, U, D>
where
    S: Clone + MergeUpdate<U> + RouteOverride + Send + 'static,
    U: FromEngineFailure + Send + 'static,
    D: Clone + Send + 'static,
{
    /// Drive `state` through the graph starting at the entry node until a
    /// node routes to [`END`], returning the final state.
    ///
    /// `max_steps` is a hard backstop against routing bugs (an oscillating
    /// conditional edge, say) producing an infinite loop; it is not the same
    /// as the application's `retry_count` budget, which is domain state the
    /// nodes themselves maintain.
    pub async fn invoke(&self, initial: S, deps: D, max_steps: usize) -> Result<S> {
        let (state, _trace) = self.invoke_traced(initial, deps, max_steps).await?;
        Ok(state)
    }

    /// Same as [`invoke`](Self::invoke) but also returns the sequence of
    /// visited nodes, e.g. for populating an execution log at the call site.
    pub async fn invoke_traced(
        &self,
        mut state: S,
        deps: D,
        max_steps: usize,
    ) -> Result<(S, Vec<VisitedNode>)> {
        let mut current = self.entry.clone();
        let mut trace = Vec::new();

        for _ in 0..max_steps {
            if current == END {
                return Ok((state, trace));
            }
            let spec = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode {
                    node: current.clone(),
                })?;

            tracing::debug!(node = %current, "graph: entering node");
            let outcome = (spec.executor)(state.clone(), deps.clone()).await;
            let ok = outcome.is_ok();
            match outcome {
                Ok(update) => state.merge(update),
                Err(err) => {
                    tracing::warn!(node = %current, error = %err, "graph: node returned an error");
                    state.merge(U::from_engine_failure(&current, err.to_string()));
                }
            }
            trace.push(VisitedNode {
                node: current.clone(),
                ok,
            });

            current = self.next_node(&current, &state)?;
        }

        Err(GraphError::StepBudgetExceeded(max_steps))
    }

    fn next_node(&self, from: &str, state: &S) -> Result<NodeId> {
        if let Some(forced) = state.route_override() {
            return Ok(forced);
        }
        match self.edges.get(from) {
            Some(Edge::Direct(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, branches }) => {
                let target = router(state);
                if target == END || branches.contains(&target) {
                    Ok(target)
                } else {
                    Err(GraphError::UnknownBranch {
                        node: from.to_string(),
                        branch: target,
                    })
                }
            }
            None => Ok(END.to_string()),
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct S {
        value: i64,
        failed: bool,
    }

    enum U {
        Add(i64),
        Fail,
    }

    impl MergeUpdate<U> for S {
        fn merge(&mut self, update: U) {
            match update {
                U::Add(n) => self.value += n,
                U::Fail => self.failed = true,
            }
        }
    }

    impl FromEngineFailure for U {
        fn from_engine_failure(_node: &str, _message: String) -> Self {
            U::Fail
        }
    }

    impl RouteOverride for S {
        fn route_override(&self) -> Option<NodeId> {
            if self.failed {
                Some(END.to_string())
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn linear_chain_accumulates() {
        let mut graph: Graph<S, U, ()> = Graph::new();
        graph.add_node(NodeSpec::new("a", |s: S, _d: ()| {
            Box::pin(async move { Ok(U::Add(1 + s.value * 0)) })
        }));
        graph.add_node(NodeSpec::new("b", |_s: S, _d: ()| {
            Box::pin(async move { Ok(U::Add(10)) })
        }));
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);
        graph.set_entry("a");

        let compiled = graph.compile().unwrap();
        let result = compiled.invoke(S::default(), (), 10).await.unwrap();
        assert_eq!(result.value, 11);
    }

    #[tokio::test]
    async fn error_override_short_circuits_conditional_edge() {
        let mut graph: Graph<S, U, ()> = Graph::new();
        graph.add_node(NodeSpec::new("boom", |_s: S, _d: ()| {
            Box::pin(async move { Err(GraphError::Execution("kaboom".into())) })
        }));
        graph.add_conditional_edge(
            "boom",
            Arc::new(|_s: &S| "boom".to_string()),
            vec!["boom".to_string()],
        );
        graph.set_entry("boom");

        let compiled = graph.compile().unwrap();
        let (result, trace) = compiled.invoke_traced(S::default(), (), 10).await.unwrap();
        assert!(result.failed);
        assert_eq!(trace.len(), 1);
        assert!(!trace[0].ok);
    }

    #[tokio::test]
    async fn unknown_branch_is_an_error() {
        let mut graph: Graph<S, U, ()> = Graph::new();
        graph.add_node(NodeSpec::new("a", |_s: S, _d: ()| {
            Box::pin(async move { Ok(U::Add(1)) })
        }));
        graph.add_conditional_edge(
            "a",
            Arc::new(|_s: &S| "nowhere".to_string()),
            vec!["b".to_string()],
        );
        graph.set_entry("a");

        let compiled = graph.compile().unwrap();
        let err = compiled.invoke(S::default(), (), 10).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownBranch { .. }));
    }

    #[test]
    fn compile_rejects_dangling_edge_target() {
        let mut graph: Graph<S, U, ()> = Graph::new();
        graph.add_node(NodeSpec::new("a", |_s: S, _d: ()| {
            Box::pin(async move { Ok(U::Add(1)) })
        }));
        graph.add_edge("a", "ghost");
        graph.set_entry("a");

        assert!(graph.compile().is_err());
    }
}
