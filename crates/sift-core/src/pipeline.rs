//! Pipeline graph construction and lifecycle supervision.
//!
//! Build wires operators by id into a directed graph, rejecting unresolved
//! outputs, duplicate ids, edges into non-receivers, duplicate edges, and
//! cycles (reported as explicit `(a -> b -> a)` paths). `start` walks the
//! topological order in reverse so sinks are live before sources push;
//! `stop` walks it forward so sources quiesce before sinks tear down.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::error::{LifecycleError, WiringError};
use crate::operator::Operator;

/// A directed acyclic graph of operators with a lifecycle supervisor.
pub struct Pipeline {
    graph: DiGraph<Arc<dyn Operator>, ()>,
    running: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("node_count", &self.graph.node_count())
            .field("edge_count", &self.graph.edge_count())
            .field("running", &self.running)
            .finish()
    }
}

impl Pipeline {
    /// Composes built operators into a validated graph.
    pub fn new(operators: Vec<Arc<dyn Operator>>) -> Result<Self, WiringError> {
        // Resolve declared output ids into concrete operator references.
        for operator in &operators {
            if operator.can_output() {
                operator.set_outputs(&operators)?;
            }
        }

        let mut graph = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for operator in &operators {
            let id = operator.id();
            if nodes.contains_key(&id) {
                return Err(WiringError::DuplicateId(id));
            }
            let index = graph.add_node(Arc::clone(operator));
            nodes.insert(id, index);
        }

        for operator in &operators {
            if !operator.can_output() {
                continue;
            }
            let from = operator.id();
            let Some(&from_index) = nodes.get(&from) else {
                continue;
            };
            for output in operator.outputs() {
                let to = output.id();
                if !output.can_process() {
                    return Err(WiringError::NotAProcessor {
                        from: from.clone(),
                        to,
                    });
                }
                let Some(&to_index) = nodes.get(&to) else {
                    return Err(WiringError::OutputNotFound {
                        from: from.clone(),
                        to,
                    });
                };
                if graph.contains_edge(from_index, to_index) {
                    return Err(WiringError::DuplicateEdge {
                        from: from.clone(),
                        to,
                    });
                }
                graph.add_edge(from_index, to_index, ());
            }
        }

        if toposort(&graph, None).is_err() {
            return Err(WiringError::Cycle {
                cycles: render_cycles(&graph),
            });
        }

        Ok(Pipeline {
            graph,
            running: false,
        })
    }

    /// Starts every operator in reverse topological order (sinks first).
    /// The first failure aborts the sequence; the caller may `stop` the
    /// partially started pipeline.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.running {
            return Ok(());
        }

        for index in self.topo_order().into_iter().rev() {
            let operator = &self.graph[index];
            debug!(operator_id = %operator.id(), "starting operator");
            operator.start().await?;
            debug!(operator_id = %operator.id(), "started operator");
        }

        self.running = true;
        Ok(())
    }

    /// Stops every operator in topological order (sources first). Errors
    /// are logged and swallowed so every operator gets a stop attempt.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }

        for index in self.topo_order() {
            let operator = &self.graph[index];
            debug!(operator_id = %operator.id(), "stopping operator");
            if let Err(err) = operator.stop().await {
                warn!(operator_id = %operator.id(), error = %err, "failed to stop operator");
            }
        }

        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The operators in this pipeline, in insertion order.
    pub fn operators(&self) -> Vec<Arc<dyn Operator>> {
        self.graph.node_weights().map(Arc::clone).collect()
    }

    /// Renders the graph in Graphviz dot form for diagnostics.
    pub fn marshal_dot(&self) -> String {
        let mut out = String::from("digraph G {\n");
        for index in self.graph.node_indices() {
            let _ = writeln!(out, "  \"{}\";", self.graph[index].id());
        }
        for edge in self.graph.edge_indices() {
            if let Some((from, to)) = self.graph.edge_endpoints(edge) {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\";",
                    self.graph[from].id(),
                    self.graph[to].id()
                );
            }
        }
        out.push_str("}\n");
        out
    }

    fn topo_order(&self) -> Vec<NodeIndex> {
        // The graph was proven acyclic at build time.
        toposort(&self.graph, None).unwrap_or_default()
    }
}

/// Renders every cycle in the graph as a `(a -> b -> a)` path, joined by
/// commas.
fn render_cycles(graph: &DiGraph<Arc<dyn Operator>, ()>) -> String {
    let mut rendered = Vec::new();

    for component in tarjan_scc(graph) {
        let is_cycle = component.len() > 1
            || (component.len() == 1 && graph.contains_edge(component[0], component[0]));
        if !is_cycle {
            continue;
        }

        // Walk edges within the component to present the cycle in flow
        // order, starting from its earliest-added node.
        let mut start = component[0];
        for &index in &component {
            if index < start {
                start = index;
            }
        }

        let mut path = vec![start];
        let mut current = start;
        while path.len() < component.len() {
            let next = graph
                .neighbors(current)
                .find(|next| component.contains(next) && !path.contains(next));
            match next {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => break,
            }
        }

        let mut text = String::from("(");
        for index in &path {
            let _ = write!(text, "{} -> ", graph[*index].id());
        }
        let _ = write!(text, "{})", graph[start].id());
        rendered.push(text);
    }

    rendered.sort();
    rendered.join(",")
}
