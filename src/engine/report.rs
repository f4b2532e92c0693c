use std::collections::HashMap;
use std::fmt::{Display, Formatter, Write};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::core::Hash32;
use crate::engine::{OutputKey, Payload, Sequence};

/// What happened when a node was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The node returned at least one output.
    Produced,
    /// The node returned no outputs and waits for an external artifact.
    Deferred,
    /// The outputs were replayed from the memo without invoking the node.
    Memoized,
}

#[derive(Debug, Clone)]
pub struct Execution {
    /// Position of the node in the sequence.
    pub index: usize,
    pub name: String,
    pub round: usize,
    pub hash: Hash32,
    pub status: Status,
    pub start: Instant,
    pub duration: Duration,
}

/// A node left pending at the end of a run, with the keys it still misses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved<K> {
    pub index: usize,
    pub name: String,
    pub missing: Vec<K>,
}

impl<K: Display> Display for Unresolved<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is missing [", self.name)?;
        for (i, key) in self.missing.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

/// Result of one resolver run.
///
/// Non-completion is not an error: unresolved nodes and deferred tasks are
/// listed here so that the caller can decide to run the pass again later.
#[derive(Debug, Clone)]
pub struct Report<K, V> {
    /// Every produced value, in the order it was produced.
    pub satisfied: IndexMap<K, V>,
    /// Number of rounds that executed at least one node.
    pub rounds: usize,
    /// Size of `satisfied` after each round.
    pub progress: Vec<usize>,
    /// Every execution, in execution order.
    pub executions: Vec<Execution>,
    /// Nodes that never became ready.
    pub unresolved: Vec<Unresolved<K>>,
}

impl<K, V> Report<K, V>
where
    K: OutputKey,
    V: Payload,
{
    pub(crate) fn new() -> Self {
        Self {
            satisfied: IndexMap::new(),
            rounds: 0,
            progress: Vec::new(),
            executions: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.satisfied.get(key)
    }

    pub fn is_satisfied(&self, key: &K) -> bool {
        self.satisfied.contains_key(key)
    }

    /// True if nothing is left pending.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Names of the executed nodes, in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.executions.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &Execution> {
        self.executions
            .iter()
            .filter(|e| e.status == Status::Deferred)
    }

    /// Renders the sequence as a Mermaid diagram, color-coded by outcome.
    ///
    /// * **Green**: Produced
    /// * **Yellow**: Deferred
    /// * **Blue**: Memoized
    /// * **Red**: Unresolved, with dangling keys drawn as red stubs
    ///
    /// Outcomes pointing past the end of `sequence` are left uncolored.
    pub fn render_mermaid<E>(&self, sequence: &Sequence<K, V, E>) -> String {
        let mut graph: Graph<String, String> = Graph::new();
        let mut indices = Vec::with_capacity(sequence.len());
        let mut dangling: HashMap<String, NodeIndex> = HashMap::new();

        for node in sequence.nodes() {
            indices.push(graph.add_node(node.name().to_string()));
        }

        for (consumer, node) in sequence.nodes().iter().enumerate() {
            for key in node.requirements() {
                let label = key.to_string();
                let source = match sequence.provider_index(key) {
                    Some(provider) => indices[provider],
                    None => *dangling
                        .entry(label.clone())
                        .or_insert_with(|| graph.add_node(label.clone())),
                };
                graph.add_edge(source, indices[consumer], label);
            }
        }

        let mut status: HashMap<NodeIndex, &str> = HashMap::new();
        for execution in &self.executions {
            let class = match execution.status {
                Status::Produced => "produced",
                Status::Deferred => "deferred",
                Status::Memoized => "memoized",
            };
            if let Some(&index) = indices.get(execution.index) {
                status.insert(index, class);
            }
        }
        for unresolved in &self.unresolved {
            if let Some(&index) = indices.get(unresolved.index) {
                status.insert(index, "unresolved");
            }
        }
        for index in dangling.values() {
            status.insert(*index, "missing");
        }

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_mermaid(&mut out, &graph, &status);
        out
    }
}

fn write_mermaid(
    f: &mut impl Write,
    graph: &Graph<String, String>,
    status: &HashMap<NodeIndex, &str>,
) -> std::fmt::Result {
    writeln!(f, "graph LR")?;
    writeln!(f, "    classDef produced fill:#9f9,stroke:#333")?;
    writeln!(f, "    classDef deferred fill:#ff9,stroke:#333")?;
    writeln!(f, "    classDef memoized fill:#9cf,stroke:#333")?;
    writeln!(f, "    classDef unresolved fill:#f99,stroke:#333")?;
    writeln!(f, "    classDef missing fill:#fff,stroke:#f00,stroke-dasharray: 4")?;

    for index in graph.node_indices() {
        let name = graph[index].replace('"', "#quot;");
        write!(f, "    {}[\"{}\"]", index.index(), name)?;
        match status.get(&index) {
            Some(class) => writeln!(f, ":::{class}")?,
            None => writeln!(f)?,
        }
    }

    for edge in graph.raw_edges() {
        let label = edge.weight.replace('"', "#quot;");
        writeln!(
            f,
            "    {} -- \"{}\" --> {}",
            edge.source().index(),
            label,
            edge.target().index()
        )?;
    }

    Ok(())
}
