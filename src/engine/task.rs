use std::borrow::Cow;
use std::sync::Arc;

use crate::engine::{Args, Binding, Context, OutputKey, Outputs, Payload, Slot};

type Callback<K, V, E> =
    dyn Fn(&mut Context<'_, E>, &Args<'_, V>) -> anyhow::Result<Outputs<K, V>> + Send + Sync;

/// A named computation with declared requirements and declared outputs.
///
/// Tasks are built with [`Task::new`], which returns a [`TaskDef`] that
/// collects the bindings and output keys before the callback is attached:
///
/// ```rust
/// use fei::{Outputs, Task};
///
/// let task: Task<&str, i32, ()> = Task::new("B")
///     .bind("a", "A")
///     .provides("B")
///     .run(|_, args| {
///         let a: i32 = *args.single("a")?;
///         Ok(Outputs::one("B", a + 1))
///     });
/// ```
pub struct Task<K, V, E> {
    name: Cow<'static, str>,
    bindings: Vec<Binding<K>>,
    provides: Vec<K>,
    cached: bool,
    callback: Arc<Callback<K, V, E>>,
}

impl<K: OutputKey> Task<K, (), ()> {
    /// The entry point. Starts a definition without bindings; the value and
    /// environment types are picked later by [`TaskDef::run`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<Cow<'static, str>>) -> TaskDef<K> {
        TaskDef {
            name: name.into(),
            bindings: Vec::new(),
            provides: Vec::new(),
            cached: false,
        }
    }
}

impl<K, V, E> Task<K, V, E>
where
    K: OutputKey,
    V: Payload,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bindings(&self) -> &[Binding<K>] {
        &self.bindings
    }

    pub fn provides(&self) -> &[K] {
        &self.provides
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub(crate) fn invoke(
        &self,
        context: &mut Context<'_, E>,
        args: &Args<'_, V>,
    ) -> anyhow::Result<Outputs<K, V>> {
        (self.callback)(context, args)
    }
}

impl<K: Clone, V, E> Clone for Task<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            bindings: self.bindings.clone(),
            provides: self.provides.clone(),
            cached: self.cached,
            callback: self.callback.clone(),
        }
    }
}

impl<K: std::fmt::Debug, V, E> std::fmt::Debug for Task<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("bindings", &self.bindings)
            .field("provides", &self.provides)
            .field("cached", &self.cached)
            .finish()
    }
}

pub struct TaskDef<K> {
    name: Cow<'static, str>,
    bindings: Vec<Binding<K>>,
    provides: Vec<K>,
    cached: bool,
}

impl<K: OutputKey> TaskDef<K> {
    /// Positional requirement, reachable under the key's display name.
    pub fn requires(self, key: K) -> Self {
        let param = key.to_string();
        self.bind(param, key)
    }

    pub fn bind(mut self, param: impl Into<Cow<'static, str>>, key: K) -> Self {
        self.bindings.push(Binding {
            param: param.into(),
            slot: Slot::Single(key),
        });
        self
    }

    pub fn gather(
        mut self,
        param: impl Into<Cow<'static, str>>,
        keys: impl IntoIterator<Item = K>,
    ) -> Self {
        self.bindings.push(Binding {
            param: param.into(),
            slot: Slot::Gather(keys.into_iter().collect()),
        });
        self
    }

    pub fn provides(mut self, key: K) -> Self {
        if !self.provides.contains(&key) {
            self.provides.push(key);
        }
        self
    }

    /// Marks the task as pure: outputs are memoized by content hash and
    /// replayed instead of invoking the callback again.
    ///
    /// Only use this for tasks without side effects on the environment.
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    pub fn run<V, E, F>(self, callback: F) -> Task<K, V, E>
    where
        V: Payload,
        F: Fn(&mut Context<'_, E>, &Args<'_, V>) -> anyhow::Result<Outputs<K, V>>
            + Send
            + Sync
            + 'static,
    {
        Task {
            name: self.name,
            bindings: self.bindings,
            provides: self.provides,
            cached: self.cached,
            callback: Arc::new(callback),
        }
    }
}
