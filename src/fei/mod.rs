//! The Full Event Interpretation on top of the resolver.
//!
//! A pass of the FEI walks the reconstruction stages in order. Each stage is
//! a [`FeiSequence`] resolved against a fresh [`Pipeline`]; the modules the
//! providers emit are stitched into one [`Path`] depending on how far
//! previous passes already got. During training the pass stops at the first
//! stage whose classifiers are not trained yet, and [`Teacher`] fills the
//! gap before the next pass.

pub mod checkpoint;
pub mod config;
pub mod key;
pub mod monitor;
pub mod path;
pub mod pdg;
pub mod precut;
pub mod provider;
pub mod stages;
pub mod steering;
pub mod teacher;
pub mod value;

use std::fs;

use camino::Utf8Path;
use serde_json::json;

use crate::engine::{Memo, Report, Resolver};
use crate::error::FeiError;

pub use crate::fei::checkpoint::Checkpoint;
pub use crate::fei::config::{
    BestCandidateMode, Binning, DecayChannel, FeiConfig, MvaConfig, Particle, PostCutConfig,
    PreCutConfig,
};
pub use crate::fei::key::{Key, Kind};
pub use crate::fei::path::{Module, Path, Phase, Pipeline};
pub use crate::fei::precut::{CutHistogram, DeterminedCut, calculate_pre_cuts};
pub use crate::fei::provider::{MC_COUNTS_FILE, MC_COUNTS_SUMMARY};
pub use crate::fei::stages::{STAGES, get_stages};
pub use crate::fei::steering::{FeiSequence, build_sequence};
pub use crate::fei::teacher::{Teacher, TrainingJob, is_fake_weightfile};
pub use crate::fei::value::{McCount, McCounts, Value};

/// File the memo of cached providers is persisted to, in the working
/// directory.
pub const MEMO: &str = "memo.cbor";

/// Sequence and outcome of one resolved stage.
pub struct StageReport {
    pub stage: usize,
    pub sequence: FeiSequence,
    pub report: Report<Key, Value>,
}

/// What one pass hands back to the caller.
pub struct FeiState {
    /// Modules to run over the data.
    pub path: Path,
    /// Stage the next pass starts at.
    pub stage: i32,
    /// Particle lists the path fills, in stage order.
    pub plists: Vec<String>,
    /// One entry per resolved stage.
    pub reports: Vec<StageReport>,
}

/// Runs one pass of the FEI over `particles`.
///
/// Without an explicit cache level in `config` the checkpoint in `workdir`
/// wins over the arguments, so that repeated passes continue where the
/// previous one stopped.
pub fn advance(
    particles: &[Particle],
    config: &FeiConfig,
    workdir: &Utf8Path,
) -> Result<FeiState, FeiError> {
    let checkpoint = Checkpoint::new(workdir);

    let (particles, config) = match config.cache {
        None if checkpoint.exists() => {
            tracing::warn!(
                checkpoint = %checkpoint.path(),
                "Cache level not set, resuming from checkpoint. Provided particles and configuration are ignored"
            );
            checkpoint
                .load()
                .map_err(|e| FeiError::Checkpoint(checkpoint.path().to_owned(), e))?
        }
        _ => (particles.to_vec(), config.clone()),
    };
    let cache = config
        .cache
        .unwrap_or(if config.training { -1 } else { 0 });

    let stages = get_stages(&particles)?;
    let mut path = Path::new();

    if cache < 0 && config.training {
        tracing::info!("Stage 0: Run over all MC particles to get the number of signal candidates");
        path.add_path(provider::mc_counts_path(&particles));
        checkpoint
            .save(&particles, &config, 0)
            .map_err(|e| FeiError::Checkpoint(checkpoint.path().to_owned(), e))?;
        return Ok(FeiState {
            path,
            stage: 0,
            plists: Vec::new(),
            reports: Vec::new(),
        });
    }

    if !config.training && config.monitor {
        path.add_path(provider::mc_counts_path(&particles));
    }

    let memo_path = workdir.join(MEMO);
    let memo = Memo::load(&memo_path).map_err(|e| FeiError::Memo(memo_path.clone(), e))?;
    let mut resolver = Resolver::with_memo(memo);

    let mc_counts = match config.training {
        true => load_mc_counts(workdir),
        false => None,
    };

    let mut carried = Vec::new();
    let mut plists = Vec::new();
    let mut reports = Vec::new();
    let mut last = 0;
    let mut pending_cuts = false;

    for (stage, stage_particles) in stages.iter().enumerate() {
        last = stage;
        let level = stage as i32;

        let sequence =
            steering::build_sequence(stage, stage_particles, &config, &carried, mc_counts.as_ref())
                .map_err(|e| FeiError::Sequence(stage, e))?;
        let mut pipeline = Pipeline::new(config.clone(), workdir);
        let report = resolver
            .run(&sequence, &mut pipeline)
            .map_err(|e| FeiError::Resolve(stage, e))?;

        if stage == 0 && cache < 1 {
            path.add_path(pipeline.take(Phase::Load));
        }
        if cache <= level {
            path.add_path(pipeline.take(Phase::Pre));
        }

        let trained = stage_particles
            .iter()
            .all(|p| report.is_satisfied(&Kind::SignalProbability.of(&p.identifier)));

        if config.training && !trained {
            pending_cuts = stage_particles.iter().any(|p| {
                p.channels
                    .iter()
                    .any(|c| !report.is_satisfied(&Kind::PreCut.of(&c.label)))
            });
            tracing::info!(stage, pending_cuts, "Training of stage is not finished yet");
            path.add_path(pipeline.take(Phase::Training));
            for particle in stage_particles {
                for channel in &particle.channels {
                    if let Some(Value::Text(list)) =
                        report.get(&Kind::RawParticleList.of(&channel.label))
                    {
                        plists.push(list.clone());
                    }
                }
            }
            reports.push(StageReport {
                stage,
                sequence,
                report,
            });
            break;
        }

        if cache <= level + 1 {
            path.add_path(pipeline.take(Phase::Post));
        }
        for particle in stage_particles {
            if let Some(Value::Text(list)) =
                report.get(&Kind::HumanReadableParticleList.of(&particle.identifier))
            {
                plists.push(list.clone());
            }
        }

        carried = report
            .satisfied
            .iter()
            .filter(|(key, _)| {
                matches!(
                    key.kind,
                    Kind::ParticleList
                        | Kind::SignalProbability
                        | Kind::VertexFit
                        | Kind::HumanReadableParticleList
                )
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        reports.push(StageReport {
            stage,
            sequence,
            report,
        });
    }

    if config.monitor {
        path.add_module(
            Module::new("RootOutput")
                .param("outputFileName", "Monitor_ModuleStatistics.root")
                .param("branchNames", json!(["EventMetaData"]))
                .param("branchNamesPersistent", json!(["ProcessStatistics"]))
                .param("ignoreCommandLineOverride", true),
        );
    }

    // Histograms for the pre cuts are filled by this pass; the stage is
    // reconstructed again once they exist.
    let next = match pending_cuts {
        true => last as i32,
        false => last as i32 + 1,
    };
    if config.training || config.monitor {
        checkpoint
            .save(&particles, &config, next)
            .map_err(|e| FeiError::Checkpoint(checkpoint.path().to_owned(), e))?;
        let pruned = resolver.memo_mut().prune();
        tracing::debug!(pruned, "Dropped unused memo entries");
        resolver
            .memo()
            .save(&memo_path)
            .map_err(|e| FeiError::Memo(memo_path.clone(), e))?;
    }

    tracing::info!(stage = next, lists = plists.len(), modules = path.len(), "Pass finished");

    Ok(FeiState {
        path,
        stage: next,
        plists,
        reports,
    })
}

/// Reads the summary of the MC counting path. Missing or unreadable counts
/// leave sampling unresolved instead of failing the pass.
fn load_mc_counts(workdir: &Utf8Path) -> Option<McCounts> {
    let summary = workdir.join(MC_COUNTS_SUMMARY);
    if !summary.is_file() {
        match workdir.join(MC_COUNTS_FILE).is_file() {
            true => tracing::warn!(
                file = %summary,
                "MC count histograms exist but were not summarized yet, sampling can't be resolved"
            ),
            false => tracing::warn!(file = %summary, "MC counts not found, sampling can't be resolved"),
        }
        return None;
    }

    let counts = fs::read_to_string(&summary)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str::<McCounts>(&s).map_err(anyhow::Error::from));
    match counts {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::warn!(file = %summary, error = %e, "Couldn't read MC counts, sampling can't be resolved");
            None
        }
    }
}
