use std::collections::HashMap;
use std::time::Instant;

use tracing::Level;

use crate::core::{Blake3Hasher, Hash32};
use crate::engine::{
    Args, Context, Execution, Memo, Node, OutputKey, Outputs, Payload, Report, Status,
    Unresolved,
};
use crate::error::ResolveError;

/// The ordered set of nodes handed to the [`Resolver`].
///
/// Every output key is provided by exactly one node. Pushing a node whose
/// declared outputs collide with an earlier node fails right away, so the
/// satisfied set of a run can never see two writers for one key.
pub struct Sequence<K, V, E> {
    nodes: Vec<Node<K, V, E>>,
    providers: HashMap<K, usize>,
}

impl<K, V, E> Sequence<K, V, E>
where
    K: OutputKey,
    V: Payload,
{
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            providers: HashMap::new(),
        }
    }

    pub fn push(&mut self, node: impl Into<Node<K, V, E>>) -> Result<&mut Self, ResolveError> {
        let node = node.into();
        let index = self.nodes.len();

        for key in node.provides() {
            if let Some(&first) = self.providers.get(key) {
                return Err(ResolveError::DuplicateOutput {
                    key: key.to_string(),
                    first: self.nodes[first].name().to_string(),
                    second: node.name().to_string(),
                });
            }
        }

        for key in node.provides() {
            self.providers.insert(key.clone(), index);
        }
        self.nodes.push(node);
        Ok(self)
    }

    pub fn nodes(&self) -> &[Node<K, V, E>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node declaring `key` as one of its outputs.
    pub fn provider(&self, key: &K) -> Option<&Node<K, V, E>> {
        self.provider_index(key).map(|index| &self.nodes[index])
    }

    pub(crate) fn provider_index(&self, key: &K) -> Option<usize> {
        self.providers.get(key).copied()
    }
}

impl<K, V, E> Default for Sequence<K, V, E>
where
    K: OutputKey,
    V: Payload,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone, E> Clone for Sequence<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            providers: self.providers.clone(),
        }
    }
}

/// Executes a [`Sequence`] by fixed-point satisfaction of requirements.
///
/// The algorithm works as follows:
/// 1. Every pending node whose requirement keys are all satisfied is ready.
/// 2. If no node is ready the run is over.
/// 3. The ready nodes are removed from the pending set and executed in
///    sequence order; their outputs are merged into the satisfied set.
/// 4. Go to 1.
///
/// Each round either shrinks the pending set or ends the run, so a run takes
/// at most as many rounds as there are nodes. Nodes that are still pending at
/// the end (missing artifacts, cycles, keys nobody provides) are reported in
/// [`Report::unresolved`], never raised.
///
/// Everything runs on the calling thread, one node at a time.
pub struct Resolver<K, V> {
    memo: Memo<K, V>,
}

impl<K, V> Resolver<K, V>
where
    K: OutputKey,
    V: Payload,
{
    pub fn new() -> Self {
        Self { memo: Memo::new() }
    }

    pub fn with_memo(memo: Memo<K, V>) -> Self {
        Self { memo }
    }

    pub fn memo(&self) -> &Memo<K, V> {
        &self.memo
    }

    pub fn memo_mut(&mut self) -> &mut Memo<K, V> {
        &mut self.memo
    }

    pub fn into_memo(self) -> Memo<K, V> {
        self.memo
    }

    pub fn run<E>(
        &mut self,
        sequence: &Sequence<K, V, E>,
        env: &mut E,
    ) -> Result<Report<K, V>, ResolveError> {
        let span = tracing::span!(Level::INFO, "resolve", nodes = sequence.len());
        let _enter = span.enter();

        let mut report = Report::new();
        let mut pending: Vec<usize> = (0..sequence.len()).collect();

        loop {
            let (ready, rest): (Vec<usize>, Vec<usize>) = pending
                .iter()
                .partition(|&&index| sequence.nodes[index].args(&report.satisfied).is_some());
            pending = rest;

            if ready.is_empty() {
                break;
            }

            report.rounds += 1;
            let round = report.rounds;

            for index in ready {
                let node = &sequence.nodes[index];
                let (execution, outputs) = self.execute(node, index, round, env, &report)?;

                for (key, _) in outputs.iter() {
                    if !node.provides().contains(key) {
                        return Err(ResolveError::UndeclaredOutput {
                            node: node.name().to_string(),
                            key: key.to_string(),
                        });
                    }
                }

                report.executions.push(execution);
                for (key, value) in outputs {
                    report.satisfied.insert(key, value);
                }
            }

            report.progress.push(report.satisfied.len());
        }

        for index in pending {
            let node = &sequence.nodes[index];
            let missing: Vec<K> = node
                .requirements()
                .into_iter()
                .filter(|key| !report.satisfied.contains_key(*key))
                .fold(Vec::new(), |mut acc, key| {
                    if !acc.contains(key) {
                        acc.push(key.clone());
                    }
                    acc
                });

            tracing::warn!(node = node.name(), missing = ?missing, "Unresolved requirements");
            report.unresolved.push(Unresolved {
                index,
                name: node.name().to_string(),
                missing,
            });
        }

        tracing::info!(
            rounds = report.rounds,
            executed = report.executions.len(),
            unresolved = report.unresolved.len(),
            "Resolved sequence"
        );

        Ok(report)
    }

    fn execute<E>(
        &mut self,
        node: &Node<K, V, E>,
        index: usize,
        round: usize,
        env: &mut E,
        report: &Report<K, V>,
    ) -> Result<(Execution, Outputs<K, V>), ResolveError> {
        let span = tracing::span!(Level::INFO, "task", name = node.name(), round);
        let _enter = span.enter();

        let Some(args) = node.args(&report.satisfied) else {
            unreachable!("node '{}' executed before it was ready", node.name());
        };
        let hash = fingerprint(node, &args)?;

        let start = Instant::now();
        let (status, outputs) = match node.is_cached().then(|| self.memo.get(&hash)).flatten() {
            Some(outputs) => {
                tracing::debug!("Replayed from memo");
                (Status::Memoized, outputs)
            }
            None => {
                let mut context = Context {
                    env,
                    hash,
                    name: node.name(),
                    round,
                };
                let outputs = node
                    .invoke(&mut context, &args)
                    .map_err(|e| ResolveError::Task(node.name().to_string(), e))?;

                if outputs.is_empty() {
                    tracing::debug!("Deferred");
                    (Status::Deferred, outputs)
                } else {
                    if node.is_cached() {
                        self.memo.insert(hash, &outputs);
                    }
                    (Status::Produced, outputs)
                }
            }
        };

        let execution = Execution {
            index,
            name: node.name().to_string(),
            round,
            hash,
            status,
            start,
            duration: start.elapsed(),
        };

        Ok((execution, outputs))
    }
}

impl<K, V> Default for Resolver<K, V>
where
    K: OutputKey,
    V: Payload,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Content hash of a node: its name followed by every requirement key and the
/// value bound to it, in declaration order.
fn fingerprint<K, V, E>(node: &Node<K, V, E>, args: &Args<'_, V>) -> Result<Hash32, ResolveError>
where
    K: OutputKey,
    V: Payload,
{
    let fail = |e| ResolveError::Fingerprint(node.name().to_string(), e);

    let mut hasher = Blake3Hasher::new();
    hasher.update(node.name()).map_err(fail)?;
    for (key, value) in node.requirements().into_iter().zip(args.values()) {
        hasher.update(key).map_err(fail)?;
        hasher.update(value).map_err(fail)?;
    }

    Ok(hasher.into())
}
