mod memo;
mod report;
mod resolver;
mod resource;
mod task;

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::Serialize;

use crate::core::Hash32;
use crate::error::ArgError;

pub use crate::engine::memo::Memo;
pub use crate::engine::report::{Execution, Report, Status, Unresolved};
pub use crate::engine::resolver::{Resolver, Sequence};
pub use crate::engine::resource::Resource;
pub use crate::engine::task::{Task, TaskDef};

/// Anything that can name a value in the resolver.
///
/// Keys take part in the content hash of the tasks consuming them, so they
/// must be serializable.
pub trait OutputKey: Clone + Eq + Hash + Debug + Display + Serialize {}

impl<T> OutputKey for T where T: Clone + Eq + Hash + Debug + Display + Serialize {}

/// Anything that can be produced by a node and handed to its dependents.
pub trait Payload: Clone + Debug + Serialize {}

impl<T> Payload for T where T: Clone + Debug + Serialize {}

/// How a formal parameter of a task is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<K> {
    /// One requirement key, one value.
    Single(K),
    /// Several requirement keys, gathered into an ordered list of values.
    Gather(Vec<K>),
}

/// Maps a formal parameter name of a task to its requirement keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding<K> {
    pub param: Cow<'static, str>,
    pub slot: Slot<K>,
}

impl<K> Binding<K> {
    pub fn keys(&self) -> &[K] {
        match &self.slot {
            Slot::Single(key) => std::slice::from_ref(key),
            Slot::Gather(keys) => keys,
        }
    }
}

/// A resolved argument, borrowed from the satisfied set.
#[derive(Debug)]
pub enum Arg<'a, V> {
    Single(&'a V),
    Gather(Vec<&'a V>),
}

/// Arguments handed to a task callback, in binding order.
#[derive(Debug)]
pub struct Args<'a, V> {
    entries: Vec<(&'a str, Arg<'a, V>)>,
}

impl<'a, V> Args<'a, V> {
    pub(crate) fn new(entries: Vec<(&'a str, Arg<'a, V>)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, param: &str) -> Result<&Arg<'a, V>, ArgError> {
        self.entries
            .iter()
            .find(|(name, _)| *name == param)
            .map(|(_, arg)| arg)
            .ok_or_else(|| ArgError::Missing(param.to_string()))
    }

    pub fn single(&self, param: &str) -> Result<&'a V, ArgError> {
        match self.get(param)? {
            Arg::Single(value) => Ok(*value),
            Arg::Gather(_) => Err(ArgError::NotSingle(param.to_string())),
        }
    }

    pub fn gather(&self, param: &str) -> Result<&[&'a V], ArgError> {
        match self.get(param)? {
            Arg::Gather(values) => Ok(values.as_slice()),
            Arg::Single(_) => Err(ArgError::NotGather(param.to_string())),
        }
    }

    /// All argument values flattened into requirement order.
    pub fn values(&self) -> Vec<&'a V> {
        let mut acc = Vec::new();
        for (_, arg) in &self.entries {
            match arg {
                Arg::Single(value) => acc.push(*value),
                Arg::Gather(values) => acc.extend(values.iter().copied()),
            }
        }
        acc
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The named values produced by one invocation of a node.
///
/// An empty `Outputs` means the node deferred: whatever it is waiting for
/// lives outside of the process and will be picked up by a later pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs<K, V>(Vec<(K, V)>);

impl<K: PartialEq, V> Outputs<K, V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn deferred() -> Self {
        Self::new()
    }

    pub fn one(key: K, value: V) -> Self {
        Self(vec![(key, value)])
    }

    pub fn with(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, replacing an earlier one under the same key.
    pub fn insert(&mut self, key: K, value: V) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.0.iter()
    }
}

impl<K: PartialEq, V> Default for Outputs<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> IntoIterator for Outputs<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: PartialEq, V> FromIterator<(K, V)> for Outputs<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut outputs = Outputs::new();
        for (key, value) in iter {
            outputs.insert(key, value);
        }
        outputs
    }
}

/// The context passed to every task invocation.
///
/// The environment is threaded explicitly through the resolver, so tasks
/// have a place to record side effects (for example appending modules to a
/// pipeline) without any global state.
pub struct Context<'a, E> {
    /// Mutable environment shared by all tasks of one resolver run.
    pub env: &'a mut E,
    /// Content hash of the task's name and inputs.
    pub hash: Hash32,
    /// Name of the task being invoked.
    pub name: &'a str,
    /// Fixed-point round the task runs in, starting at 1.
    pub round: usize,
}

/// A node of the sequence handed to the [`Resolver`].
pub enum Node<K, V, E> {
    Resource(Resource<K, V>),
    Task(Task<K, V, E>),
}

impl<K, V, E> Node<K, V, E>
where
    K: OutputKey,
    V: Payload,
{
    pub fn name(&self) -> &str {
        match self {
            Node::Resource(resource) => resource.name(),
            Node::Task(task) => task.name(),
        }
    }

    /// Requirement keys in declaration order, gathered keys flattened.
    pub fn requirements(&self) -> Vec<&K> {
        match self {
            Node::Resource(resource) => resource.requirements().iter().collect(),
            Node::Task(task) => task.bindings().iter().flat_map(Binding::keys).collect(),
        }
    }

    /// Output keys this node may produce.
    pub fn provides(&self) -> &[K] {
        match self {
            Node::Resource(resource) => std::slice::from_ref(resource.key()),
            Node::Task(task) => task.provides(),
        }
    }

    pub(crate) fn is_cached(&self) -> bool {
        match self {
            Node::Resource(_) => false,
            Node::Task(task) => task.is_cached(),
        }
    }

    pub(crate) fn invoke(
        &self,
        context: &mut Context<'_, E>,
        args: &Args<'_, V>,
    ) -> anyhow::Result<Outputs<K, V>> {
        match self {
            Node::Resource(resource) => Ok(resource.invoke()),
            Node::Task(task) => task.invoke(context, args),
        }
    }

    /// Borrows the arguments of this node out of the satisfied set.
    ///
    /// Returns `None` if any requirement is still missing.
    pub(crate) fn args<'a>(&'a self, satisfied: &'a indexmap::IndexMap<K, V>) -> Option<Args<'a, V>> {
        match self {
            Node::Resource(resource) => {
                let entries = resource
                    .requirements()
                    .iter()
                    .map(|key| satisfied.get(key).map(|value| ("", Arg::Single(value))))
                    .collect::<Option<Vec<_>>>()?;
                Some(Args::new(entries))
            }
            Node::Task(task) => {
                let mut entries = Vec::with_capacity(task.bindings().len());
                for binding in task.bindings() {
                    let arg = match &binding.slot {
                        Slot::Single(key) => Arg::Single(satisfied.get(key)?),
                        Slot::Gather(keys) => Arg::Gather(
                            keys.iter()
                                .map(|key| satisfied.get(key))
                                .collect::<Option<Vec<_>>>()?,
                        ),
                    };
                    entries.push((binding.param.as_ref(), arg));
                }
                Some(Args::new(entries))
            }
        }
    }
}

impl<K: Clone, V: Clone, E> Clone for Node<K, V, E> {
    fn clone(&self) -> Self {
        match self {
            Node::Resource(resource) => Node::Resource(resource.clone()),
            Node::Task(task) => Node::Task(task.clone()),
        }
    }
}

impl<K, V, E> From<Resource<K, V>> for Node<K, V, E> {
    fn from(value: Resource<K, V>) -> Self {
        Node::Resource(value)
    }
}

impl<K, V, E> From<Task<K, V, E>> for Node<K, V, E> {
    fn from(value: Task<K, V, E>) -> Self {
        Node::Task(value)
    }
}
