use crate::engine::{OutputKey, Outputs, Payload};

/// A node that supplies a constant value under a single key.
///
/// The value is exposed only once all `requirements` are satisfied, which
/// allows "virtual" dependencies: a resource may become available exactly
/// when some other key becomes available.
#[derive(Debug, Clone)]
pub struct Resource<K, V> {
    name: String,
    key: K,
    value: V,
    requirements: Vec<K>,
}

impl<K, V> Resource<K, V>
where
    K: OutputKey,
    V: Payload,
{
    pub fn new(key: K, value: V) -> Self {
        Self {
            name: key.to_string(),
            key,
            value,
            requirements: Vec::new(),
        }
    }

    /// Withholds the value until `key` is satisfied.
    pub fn requires(mut self, key: K) -> Self {
        self.requirements.push(key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn requirements(&self) -> &[K] {
        &self.requirements
    }

    pub(crate) fn invoke(&self) -> Outputs<K, V> {
        Outputs::one(self.key.clone(), self.value.clone())
    }
}
