use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Multivariate classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MvaConfig {
    pub method: String,
    pub config: String,
    pub variables: Vec<String>,
    pub target: String,
    pub splot_variable: Option<String>,
}

impl Default for MvaConfig {
    fn default() -> Self {
        Self {
            method: "FastBDT".into(),
            config: "--nTrees 400  --nCutLevels 10 --nLevels 3 --shrinkage 0.1 --randRatio 0.5".into(),
            variables: Vec::new(),
            target: "isSignal".into(),
            splot_variable: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BestCandidateMode {
    #[default]
    Lowest,
    Highest,
}

/// Binning of the pre cut histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binning {
    /// `(bins, low, high)`
    Range(u32, f64, f64),
    /// Explicit bin edges.
    Edges(Vec<f64>),
}

/// Selection applied while the candidates of a channel are combined.
///
/// Without a `variable` the user cut is applied as is. With one, the cut is
/// determined from histograms of that variable over all channels of the
/// particle, keeping `efficiency` of the signal and dropping channels below
/// `purity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreCutConfig {
    pub user_cut: String,
    pub vertex_cut: f64,
    pub best_candidate_variable: Option<String>,
    pub best_candidate_cut: u32,
    pub best_candidate_mode: BestCandidateMode,
    pub no_background_sampling: bool,
    pub variable: Option<String>,
    pub binning: Binning,
    pub efficiency: f64,
    pub purity: f64,
}

impl Default for PreCutConfig {
    fn default() -> Self {
        Self {
            user_cut: String::new(),
            vertex_cut: -2.0,
            best_candidate_variable: None,
            best_candidate_cut: 0,
            best_candidate_mode: BestCandidateMode::Lowest,
            no_background_sampling: false,
            variable: None,
            binning: Binning::Range(100, 0.0, 1.0),
            efficiency: 0.95,
            purity: 0.0,
        }
    }
}

/// Selection applied on the signal probability of the merged particle list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostCutConfig {
    pub value: f64,
    pub best_candidate_cut: u32,
}

/// Run configuration of one FEI pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeiConfig {
    /// Prefix of the weight files in the condition database.
    pub prefix: String,
    /// Stages already reconstructed, `None` to pick it from the checkpoint.
    pub cache: Option<i32>,
    pub monitor: bool,
    /// Command used by the teacher to train one classifier.
    pub extern_teacher: String,
    pub training: bool,
    /// Size of the training pool, `None` for one worker per core.
    pub threads: Option<usize>,
}

impl Default for FeiConfig {
    fn default() -> Self {
        Self {
            prefix: "FEI_TEST".into(),
            cache: None,
            monitor: false,
            extern_teacher: "basf2_mva_teacher".into(),
            training: true,
            threads: None,
        }
    }
}

/// One decay channel of a [`Particle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayChannel {
    /// `identifier ==> daughter daughter ...`
    pub label: String,
    pub daughters: Vec<String>,
    pub mva_config: MvaConfig,
    pub pre_cut_config: PreCutConfig,
    pub decay_mode_id: usize,
}

/// A particle the FEI should reconstruct, with its decay channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// `name:label`
    pub identifier: String,
    pub name: String,
    pub label: String,
    pub mva_config: MvaConfig,
    pub pre_cut_config: PreCutConfig,
    pub post_cut_config: PostCutConfig,
    pub channels: Vec<DecayChannel>,
}

impl Particle {
    /// Parses `name` or `name:label`. A missing label becomes `generic`.
    pub fn new(identifier: &str, mva_config: MvaConfig) -> Self {
        let (name, label) = identifier.split_once(':').unwrap_or((identifier, "generic"));

        Self {
            identifier: format!("{name}:{label}"),
            name: name.to_string(),
            label: label.to_string(),
            mva_config,
            pre_cut_config: PreCutConfig::default(),
            post_cut_config: PostCutConfig::default(),
            channels: Vec::new(),
        }
    }

    pub fn with_pre_cut(mut self, config: PreCutConfig) -> Self {
        self.pre_cut_config = config;
        self
    }

    pub fn with_post_cut(mut self, config: PostCutConfig) -> Self {
        self.post_cut_config = config;
        self
    }

    /// Appends a decay channel.
    ///
    /// Daughters without a label get `:generic`. Variables containing `{}`
    /// are expanded once per combination of daughter indices, so
    /// `daughter({}, p)` yields one variable per daughter and
    /// `daughterAngle({}, {})` one per unordered pair.
    pub fn add_channel<I, S>(
        &mut self,
        daughters: I,
        mva_config: Option<MvaConfig>,
        pre_cut_config: Option<PreCutConfig>,
    ) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let daughters: Vec<String> = daughters
            .into_iter()
            .map(|d| {
                let d = d.as_ref();
                match d.contains(':') {
                    true => d.to_string(),
                    false => format!("{d}:generic"),
                }
            })
            .collect();

        let mut mva_config = mva_config.unwrap_or_else(|| self.mva_config.clone());
        if mva_config.target != self.mva_config.target {
            return Err(ConfigError::TargetMismatch {
                particle: self.identifier.clone(),
                expected: self.mva_config.target.clone(),
                found: mva_config.target,
            });
        }
        mva_config.variables = expand_variables(&mva_config.variables, daughters.len());

        self.channels.push(DecayChannel {
            label: format!("{} ==> {}", self.identifier, daughters.join(" ")),
            daughters,
            mva_config,
            pre_cut_config: pre_cut_config.unwrap_or_else(|| self.pre_cut_config.clone()),
            decay_mode_id: self.channels.len(),
        });

        Ok(self)
    }

    /// Identifier of the charge conjugated particle.
    pub fn conjugate_identifier(&self) -> String {
        format!("{}:{}", super::pdg::conjugate(&self.name), self.label)
    }

    pub fn is_self_conjugate(&self) -> bool {
        super::pdg::conjugate(&self.name) == self.name
    }
}

fn expand_variables(variables: &[String], daughters: usize) -> Vec<String> {
    let mut acc = Vec::new();
    for variable in variables {
        let slots = variable.matches("{}").count();
        if slots > daughters {
            continue;
        }
        for combination in combinations(daughters, slots) {
            let mut expanded = variable.clone();
            for index in combination {
                expanded = expanded.replacen("{}", &index.to_string(), 1);
            }
            acc.push(expanded);
        }
    }
    acc
}

/// Every `k` element subset of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut acc = Vec::new();
    for first in 0..n {
        for rest in combinations(n, k - 1) {
            if rest.first().is_none_or(|&next| next > first) {
                let mut combination = vec![first];
                combination.extend(rest);
                acc.push(combination);
            }
        }
    }
    acc
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identifier() {
        let p = Particle::new("D0", MvaConfig::default());
        assert_eq!(p.identifier, "D0:generic");
        assert_eq!(p.name, "D0");
        assert_eq!(p.label, "generic");

        let p = Particle::new("B+:semileptonic", MvaConfig::default());
        assert_eq!(p.identifier, "B+:semileptonic");
        assert_eq!(p.label, "semileptonic");
        assert_eq!(p.conjugate_identifier(), "B-:semileptonic");
    }

    #[test]
    fn test_add_channel() {
        let mva = MvaConfig {
            variables: vec![
                "M".into(),
                "daughter({}, p)".into(),
                "daughterAngle({}, {})".into(),
            ],
            ..MvaConfig::default()
        };
        let mut p = Particle::new("D0", mva);
        p.add_channel(["K-", "pi+", "pi0:FSP"], None, None).unwrap();
        p.add_channel(["K-", "pi+"], None, None).unwrap();

        let channel = &p.channels[0];
        assert_eq!(channel.label, "D0:generic ==> K-:generic pi+:generic pi0:FSP");
        assert_eq!(channel.decay_mode_id, 0);
        assert_eq!(
            channel.mva_config.variables,
            vec![
                "M",
                "daughter(0, p)",
                "daughter(1, p)",
                "daughter(2, p)",
                "daughterAngle(0, 1)",
                "daughterAngle(0, 2)",
                "daughterAngle(1, 2)",
            ]
        );
        assert_eq!(p.channels[1].decay_mode_id, 1);
        assert_eq!(p.channels[1].mva_config.variables.len(), 4);
    }

    #[test]
    fn test_target_mismatch() {
        let mut p = Particle::new("pi0", MvaConfig::default());
        let other = MvaConfig {
            target: "isSignalAcceptMissing".into(),
            ..MvaConfig::default()
        };
        let result = p.add_channel(["gamma", "gamma"], Some(other), None);
        assert!(matches!(result, Err(ConfigError::TargetMismatch { .. })));
    }

    #[test]
    fn test_partial_pre_cut_config() {
        let json = r#"{"user_cut": "p > 0.1", "variable": "M", "binning": {"range": [500, 2.0, 4.0]}}"#;
        let config: PreCutConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.variable.as_deref(), Some("M"));
        assert_eq!(config.binning, Binning::Range(500, 2.0, 4.0));
        assert_eq!(config.efficiency, 0.95);
    }

    #[test]
    fn test_defaults() {
        let config = FeiConfig::default();
        assert_eq!(config.prefix, "FEI_TEST");
        assert!(config.training);
        assert_eq!(config.cache, None);
        assert_eq!(PreCutConfig::default().vertex_cut, -2.0);
        assert_eq!(PreCutConfig::default().variable, None);
        assert_eq!(MvaConfig::default().method, "FastBDT");
    }
}
