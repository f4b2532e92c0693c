use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::fei::config::FeiConfig;

/// Opaque description of a module of the external processing framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module type, e.g. `ParticleCombiner`.
    pub kind: String,
    /// Unique instance name, defaults to the type.
    pub name: String,
    pub params: IndexMap<String, serde_json::Value>,
}

impl Module {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            name: kind.clone(),
            kind,
            params: IndexMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// An ordered list of modules, executed by the external framework.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    modules: Vec<Module>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.push(module);
    }

    pub fn add_path(&mut self, path: Path) {
        self.modules.extend(path.modules);
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn find(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Part of a stage a provider writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loading of the final state particle lists.
    Load,
    /// Combination, MC matching and vertex fitting, before the classifiers.
    Pre,
    /// Writing out the training data of the classifiers.
    Training,
    /// Classifier application, merging and ranking.
    Post,
}

/// Environment threaded through the providers of one stage.
///
/// Each phase collects its own modules. The stage controller decides which
/// phases end up in the returned path, depending on the cache level.
#[derive(Debug)]
pub struct Pipeline {
    config: FeiConfig,
    workdir: Utf8PathBuf,
    load: Path,
    pre: Path,
    training: Path,
    post: Path,
}

impl Pipeline {
    pub fn new(config: FeiConfig, workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
            load: Path::new(),
            pre: Path::new(),
            training: Path::new(),
            post: Path::new(),
        }
    }

    pub fn config(&self) -> &FeiConfig {
        &self.config
    }

    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }

    pub fn phase(&self, phase: Phase) -> &Path {
        match phase {
            Phase::Load => &self.load,
            Phase::Pre => &self.pre,
            Phase::Training => &self.training,
            Phase::Post => &self.post,
        }
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut Path {
        match phase {
            Phase::Load => &mut self.load,
            Phase::Pre => &mut self.pre,
            Phase::Training => &mut self.training,
            Phase::Post => &mut self.post,
        }
    }

    pub fn add_module(&mut self, phase: Phase, module: Module) {
        self.phase_mut(phase).add_module(module);
    }

    /// Moves the modules of a phase out, leaving it empty.
    pub fn take(&mut self, phase: Phase) -> Path {
        std::mem::take(self.phase_mut(phase))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_module_builder() {
        let module = Module::new("ParticleCombiner")
            .named("ParticleCombiner_D0")
            .param("decayString", "D0:abc -> K-:generic pi+:generic")
            .param("decayMode", 3);

        assert_eq!(module.kind, "ParticleCombiner");
        assert_eq!(module.params["decayMode"], serde_json::json!(3));
    }

    #[test]
    fn test_phases() {
        let mut pipeline = Pipeline::new(FeiConfig::default(), "work");
        pipeline.add_module(Phase::Pre, Module::new("A"));
        pipeline.add_module(Phase::Post, Module::new("B"));
        assert_eq!(pipeline.phase(Phase::Pre).len(), 1);

        let mut path = Path::new();
        path.add_path(pipeline.take(Phase::Pre));
        path.add_path(pipeline.take(Phase::Post));
        assert!(pipeline.phase(Phase::Pre).is_empty());
        assert_eq!(path.len(), 2);
        assert!(path.find("B").is_some());
    }
}
