use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::fei::config::{MvaConfig, PostCutConfig, PreCutConfig};
use crate::fei::precut::DeterminedCut;

/// Number of MC particles of one PDG code in the whole data sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McCount {
    pub sum: f64,
    pub std: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// MC counts keyed by absolute PDG code. Code `0` holds the number of events.
pub type McCounts = BTreeMap<i32, McCount>;

/// Inverse sampling rates of the training data of one channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sampling {
    /// Expected number of signal candidates.
    pub signal: f64,
    /// Expected number of background candidates.
    pub background: f64,
    pub signal_rate: Option<u64>,
    pub background_rate: Option<u64>,
}

/// Files backing the classifier of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    pub data: Utf8PathBuf,
    pub weight: Utf8PathBuf,
}

/// Everything a FEI provider can produce.
///
/// `None` is a real value: the channel or particle was dropped and every
/// dependent provider passes the `None` along. A provider that waits for an
/// artifact defers instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Text(String),
    Int(i64),
    Mva(MvaConfig),
    PreCutConfig(PreCutConfig),
    PostCutConfig(PostCutConfig),
    Cut(String),
    /// Determined pre cuts of a particle by channel label, `None` for
    /// ignored channels.
    PreCuts(IndexMap<String, Option<DeterminedCut>>),
    Counts(McCounts),
    Sampling(Sampling),
    Training(Training),
}

impl Value {
    pub fn shape(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Text(_) => "Text",
            Value::Int(_) => "Int",
            Value::Mva(_) => "Mva",
            Value::PreCutConfig(_) => "PreCutConfig",
            Value::PostCutConfig(_) => "PostCutConfig",
            Value::Cut(_) => "Cut",
            Value::PreCuts(_) => "PreCuts",
            Value::Counts(_) => "Counts",
            Value::Sampling(_) => "Sampling",
            Value::Training(_) => "Training",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError {
            expected,
            found: self.shape(),
        }
    }

    pub fn as_text(&self) -> Result<&str, ValueError> {
        match self {
            Value::Text(text) => Ok(text),
            _ => Err(self.mismatch("Text")),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(int) => Ok(*int),
            _ => Err(self.mismatch("Int")),
        }
    }

    pub fn as_mva(&self) -> Result<&MvaConfig, ValueError> {
        match self {
            Value::Mva(config) => Ok(config),
            _ => Err(self.mismatch("Mva")),
        }
    }

    pub fn as_pre_cut_config(&self) -> Result<&PreCutConfig, ValueError> {
        match self {
            Value::PreCutConfig(config) => Ok(config),
            _ => Err(self.mismatch("PreCutConfig")),
        }
    }

    pub fn as_post_cut_config(&self) -> Result<&PostCutConfig, ValueError> {
        match self {
            Value::PostCutConfig(config) => Ok(config),
            _ => Err(self.mismatch("PostCutConfig")),
        }
    }

    pub fn as_cut(&self) -> Result<&str, ValueError> {
        match self {
            Value::Cut(cut) => Ok(cut),
            _ => Err(self.mismatch("Cut")),
        }
    }

    pub fn as_pre_cuts(&self) -> Result<&IndexMap<String, Option<DeterminedCut>>, ValueError> {
        match self {
            Value::PreCuts(cuts) => Ok(cuts),
            _ => Err(self.mismatch("PreCuts")),
        }
    }

    pub fn as_counts(&self) -> Result<&McCounts, ValueError> {
        match self {
            Value::Counts(counts) => Ok(counts),
            _ => Err(self.mismatch("Counts")),
        }
    }

    pub fn as_sampling(&self) -> Result<&Sampling, ValueError> {
        match self {
            Value::Sampling(sampling) => Ok(sampling),
            _ => Err(self.mismatch("Sampling")),
        }
    }

    pub fn as_training(&self) -> Result<&Training, ValueError> {
        match self {
            Value::Training(training) => Ok(training),
            _ => Err(self.mismatch("Training")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}
