//! A small, typed state-graph execution engine.
//!
//! `langgraph-core` drives an application-defined state through a directed
//! graph of async node functions, with conditional routing decided by
//! inspecting the state after each node runs. It intentionally does not
//! attempt to be a generic, dynamically-typed workflow engine — the state is
//! a concrete Rust type, not a JSON document with a reducer per key — which
//! keeps the merge and routing rules statically checked.
//!
//! See [`graph`] for the engine itself.

pub mod error;
pub mod graph;

pub use error::{GraphError, Result};
pub use graph::{
    CompiledGraph, Edge, FromEngineFailure, Graph, MergeUpdate, NodeSpec, RouteOverride, Router,
    VisitedNode, END, START,
};
