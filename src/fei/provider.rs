//! The tasks making up one FEI stage.
//!
//! Every provider appends its modules to one phase of the [`Pipeline`] it is
//! handed and names what it produced through its outputs. Providers marked
//! cached never touch the pipeline, so replaying them from the memo is safe.

use std::fs;

use anyhow::anyhow;
use camino::Utf8Path;
use serde_json::json;

use crate::engine::{Args, Context, Outputs, Task};
use crate::error::ValueError;
use crate::fei::config::{BestCandidateMode, Binning, DecayChannel, Particle};
use crate::fei::key::{Key, Kind};
use crate::fei::monitor;
use crate::fei::path::{Module, Path, Phase, Pipeline};
use crate::fei::pdg;
use crate::fei::precut::{CutHistogram, calculate_pre_cuts};
use crate::fei::teacher::TrainingJob;
use crate::fei::value::{Sampling, Training, Value};
use crate::utils::remove_jpsi_slash;

pub type FeiTask = Task<Key, Value, Pipeline>;

/// Histogram file written by the MC counting path.
pub const MC_COUNTS_FILE: &str = "mcParticlesCount.root";

/// Summary of [`MC_COUNTS_FILE`], one [`McCount`] per PDG code with `0` for
/// the number of events. Converted from the histograms outside of the FEI and
/// read back as [`Kind::McCounts`].
///
/// [`McCount`]: crate::fei::value::McCount
pub const MC_COUNTS_SUMMARY: &str = "mcParticlesCount.json";

/// Upper bound of candidates per class in the training data.
pub const MAXIMUM_SAMPLES: f64 = 1e7;

/// Lists loaded from the event before any stage runs.
pub const FSP_LISTS: [&str; 10] = [
    "K+:FSP",
    "pi+:FSP",
    "e+:FSP",
    "mu+:FSP",
    "gamma:FSP",
    "p+:FSP",
    "K_L0:FSP",
    "K_S0:V0",
    "Lambda0:V0",
    "gamma:V0",
];

/// Particles whose MC multiplicity is histogrammed next to the loaded lists.
const FSP_MONITOR: [&str; 10] = [
    "e+", "K+", "pi+", "mu+", "gamma", "K_S0", "p+", "K_L0", "Lambda0", "pi0",
];

/// Classifier inputs that are only defined on vertex fitted candidates.
pub const VERTEX_VARIABLES: [&str; 8] = [
    "dx",
    "dy",
    "dz",
    "dr",
    "chiProb",
    "significanceOfDistance",
    "distance",
    "cosAngleBetweenMomentumAndVertexVector",
];

pub fn mc_counts_key() -> Key {
    Kind::McCounts.of("mcParticlesCount")
}

/// `None` passes through, everything else must be a list name.
fn list(value: &Value) -> Result<Option<&str>, ValueError> {
    match value {
        Value::None => Ok(None),
        value => value.as_text().map(Some),
    }
}

fn none() -> Value {
    Value::None
}

/// Keys the training data of `channel` waits for on top of its list: the
/// daughter probabilities when a classifier input reads them, and the vertex
/// fit when an input needs a fitted vertex.
pub fn additional_dependencies(channel: &DecayChannel) -> Vec<Key> {
    let variables = &channel.mva_config.variables;
    let mut keys = Vec::new();

    if variables.iter().any(|v| v.contains("SignalProbability")) {
        keys.extend(channel.daughters.iter().map(|d| Kind::SignalProbability.of(d)));
    }
    if variables.iter().any(|v| VERTEX_VARIABLES.contains(&v.as_str())) {
        keys.push(Kind::VertexFit.of(&channel.label));
    }
    keys
}

/// The path counting the MC particles of every PDG code in the sample.
pub fn mc_counts_path(particles: &[Particle]) -> Path {
    let pdgs = particles.iter().filter_map(|p| pdg::from_name(&p.name));

    let mut path = Path::new();
    path.add_module(monitor::mc_particle_counts(
        pdgs,
        "VariablesToHistogram_MCCount",
        MC_COUNTS_FILE,
    ));
    path
}

/// Fills the final state particle lists and the V0 lists.
pub fn fsp_loader() -> FeiTask {
    let mut def = Task::new("FSPLoader");
    for name in FSP_LISTS {
        def = def
            .provides(Kind::ParticleList.of(name))
            .provides(Kind::VertexFit.of(name));
        let conjugate = pdg::conjugate_identifier(name);
        if conjugate != name {
            def = def
                .provides(Kind::ParticleList.of(&conjugate))
                .provides(Kind::VertexFit.of(conjugate));
        }
    }

    def.run(|ctx: &mut Context<'_, Pipeline>, _: &Args<'_, Value>| {
        let mut outputs = Outputs::new();
        for name in FSP_LISTS {
            let (particle, _) = name.split_once(':').unwrap_or((name, ""));
            let decay = match particle {
                "K_S0" => format!("{name} -> pi+ pi-"),
                "Lambda0" => format!("{name} -> p+ pi-"),
                "gamma" if name.ends_with(":V0") => format!("{name} -> e+ e-"),
                _ => name.to_string(),
            };
            ctx.env.add_module(
                Phase::Load,
                Module::new("ParticleLoader")
                    .named(format!("ParticleLoader_{name}"))
                    .param("decayStrings", json!([decay]))
                    .param("writeOut", true),
            );

            outputs.insert(Kind::ParticleList.of(name), Value::from(name));
            outputs.insert(Kind::VertexFit.of(name), Value::from(name));
            let conjugate = pdg::conjugate_identifier(name);
            if conjugate != name {
                outputs.insert(Kind::ParticleList.of(&conjugate), Value::from(conjugate.as_str()));
                outputs.insert(Kind::VertexFit.of(&conjugate), Value::from(conjugate));
            }
        }

        if ctx.env.config().monitor {
            let pdgs = FSP_MONITOR.iter().filter_map(|name| pdg::from_name(name));
            ctx.env.add_module(
                Phase::Load,
                monitor::mc_particle_counts(pdgs, "Monitor_FSPLoader", "Monitor_FSPLoader.root"),
            );
        }
        Ok(outputs)
    })
}

/// Selection string of a channel, from its configuration.
pub fn pre_cut(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("PreCut_{label}"))
        .bind("config", Kind::PreCutConfig.of(&label))
        .provides(Kind::PreCut.of(&label))
        .cached()
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let config = args.single("config")?.as_pre_cut_config()?;
            Ok(Outputs::one(
                Kind::PreCut.of(&label),
                Value::Cut(config.user_cut.clone()),
            ))
        })
}

/// Histograms of the pre cut variable for one channel, split by target.
///
/// The summary of the histogram file is looked up next to it. Until it
/// exists the histogram maker is added to the pre phase and the task defers.
pub fn pre_cut_histogram(particle: &Particle, channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();
    let identifier = &particle.identifier;
    let reads_probability = particle
        .pre_cut_config
        .variable
        .as_deref()
        .is_some_and(|v| v.contains("SignalProbability"));

    let mut def = Task::new(format!("PreCutHistogram_{label}"))
        .bind("name", Kind::Name.of(identifier))
        .gather(
            "daughters",
            channel.daughters.iter().map(|d| Kind::ParticleList.of(d)),
        )
        .bind("mva", Kind::MvaConfig.of(&label))
        .bind("config", Kind::PreCutConfig.of(identifier))
        .provides(Kind::PreCutHistogram.of(&label));
    if reads_probability {
        def = def.gather(
            "probabilities",
            channel.daughters.iter().map(|d| Kind::SignalProbability.of(d)),
        );
    }

    def.run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
        let key = Kind::PreCutHistogram.of(&label);

        let mut daughters = Vec::new();
        for value in args.gather("daughters")? {
            match list(value)? {
                Some(daughter) => daughters.push(daughter),
                None => return Ok(Outputs::one(key, none())),
            }
        }
        let config = args.single("config")?.as_pre_cut_config()?;
        let Some(variable) = &config.variable else {
            return Ok(Outputs::one(key, none()));
        };
        let name = args.single("name")?.as_text()?;
        let mva = args.single("mva")?.as_mva()?;

        let short = ctx.hash.short();
        let stem = remove_jpsi_slash(&format!("CutHistograms_{label}:{short}"));
        let workdir = ctx.env.workdir();
        let summary = workdir.join(format!("{stem}.json"));
        if summary.is_file() {
            return Ok(Outputs::one(key, Value::Text(summary.into_string())));
        }

        let module = Module::new("PreCutHistMaker")
            .named(format!("PreCutHistMaker_{name}:{short}"))
            .param("fileName", workdir.join(format!("{stem}.root")).as_str())
            .param("decayString", format!("{name}:{short} -> {}", daughters.join(" ")))
            .param("cut", config.user_cut.as_str())
            .param("target", mva.target.as_str())
            .param("variable", variable.as_str());
        let module = match &config.binning {
            Binning::Range(bins, low, high) => module.param("histParams", json!([bins, low, high])),
            Binning::Edges(edges) => module.param("customBinning", edges.clone()),
        };
        ctx.env.add_module(Phase::Pre, module);

        tracing::debug!(histogram = %summary, "Waiting for pre cut histograms");
        Ok(Outputs::deferred())
    })
}

/// Determines the pre cuts of all channels of a particle at once, from the
/// channel histograms. Channels without histograms are ignored.
pub fn pre_cut_determination(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();
    let labels: Vec<String> = particle.channels.iter().map(|c| c.label.clone()).collect();

    Task::new(format!("PreCutDetermination_{identifier}"))
        .gather(
            "histograms",
            labels.iter().map(|l| Kind::PreCutHistogram.of(l)),
        )
        .bind("config", Kind::PreCutConfig.of(&identifier))
        .provides(Kind::PreCut.of(&identifier))
        .cached()
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::PreCut.of(&identifier);
            let config = args.single("config")?.as_pre_cut_config()?;
            let Some(variable) = &config.variable else {
                return Ok(Outputs::one(key, none()));
            };

            let mut histograms = Vec::new();
            for (label, value) in labels.iter().zip(args.gather("histograms")?) {
                let Some(path) = list(value)? else {
                    continue;
                };
                match CutHistogram::load(Utf8Path::new(path)) {
                    Ok(histogram) => histograms.push((label.as_str(), histogram)),
                    Err(e) => {
                        tracing::warn!(channel = %label, error = %e, "Couldn't read pre cut histogram");
                        return Ok(Outputs::deferred());
                    }
                }
            }
            if histograms.is_empty() {
                return Ok(Outputs::one(key, none()));
            }

            let borrowed: Vec<(&str, &CutHistogram)> =
                histograms.iter().map(|(label, h)| (*label, h)).collect();
            let mut determined = calculate_pre_cuts(config, variable, &borrowed);
            let cuts = labels
                .iter()
                .map(|l| (l.clone(), determined.shift_remove(l).flatten()))
                .collect();

            Ok(Outputs::one(key, Value::PreCuts(cuts)))
        })
}

/// The determined pre cut of one channel, `None` for ignored channels.
pub fn determined_pre_cut(particle: &Particle, channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("PreCut_{label}"))
        .bind("cuts", Kind::PreCut.of(&particle.identifier))
        .provides(Kind::PreCut.of(&label))
        .cached()
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::PreCut.of(&label);
            let value = match args.single("cuts")? {
                Value::None => none(),
                value => match value.as_pre_cuts()?.get(&label) {
                    Some(Some(determined)) => Value::Cut(determined.cut.clone()),
                    _ => none(),
                },
            };
            Ok(Outputs::one(key, value))
        })
}

/// Selection on the classifier output of a particle.
pub fn post_cut(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();

    Task::new(format!("PostCut_{identifier}"))
        .bind("config", Kind::PostCutConfig.of(&identifier))
        .provides(Kind::PostCut.of(&identifier))
        .cached()
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let config = args.single("config")?.as_post_cut_config()?;
            let cut = match config.value > 0.0 {
                true => format!("{} < extraInfo(SignalProbability)", config.value),
                false => String::new(),
            };
            Ok(Outputs::one(Kind::PostCut.of(&identifier), Value::Cut(cut)))
        })
}

/// Combines the daughter lists of a channel into a new list named after the
/// content hash of the inputs.
///
/// In monitor mode the list is MC matched right away and histogrammed before
/// and after the ranking.
pub fn make_particle_list(particle: &Particle, channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();
    let target = channel.mva_config.target.clone();

    Task::new(format!("MakeParticleList_{label}"))
        .bind("name", Kind::Name.of(&particle.identifier))
        .gather(
            "daughters",
            channel.daughters.iter().map(|d| Kind::ParticleList.of(d)),
        )
        .bind("cut", Kind::PreCut.of(&label))
        .bind("config", Kind::PreCutConfig.of(&label))
        .bind("decay_mode_id", Kind::DecayModeId.of(&label))
        .provides(Kind::RawParticleList.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::RawParticleList.of(&label);

            let cut = match args.single("cut")? {
                Value::None => return Ok(Outputs::one(key, none())),
                value => value.as_cut()?,
            };
            let mut daughters = Vec::new();
            for value in args.gather("daughters")? {
                match list(value)? {
                    Some(daughter) => daughters.push(daughter),
                    None => return Ok(Outputs::one(key, none())),
                }
            }

            let name = args.single("name")?.as_text()?;
            let config = args.single("config")?.as_pre_cut_config()?;
            let decay_mode_id = args.single("decay_mode_id")?.as_int()?;
            let output = format!("{name}:{}", ctx.hash.short());

            if let [daughter] = daughters.as_slice() {
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("ParticleListManipulator")
                        .named(format!("ParticleListManipulator_{output}"))
                        .param("outputListName", output.as_str())
                        .param("inputListNames", json!([daughter]))
                        .param("cut", cut)
                        .param("writeOut", true),
                );
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("VariablesToExtraInfo")
                        .named(format!("VariablesToExtraInfo_{output}"))
                        .param("particleList", output.as_str())
                        .param(
                            "variables",
                            json!({ format!("constant({decay_mode_id})"): "decayModeID" }),
                        ),
                );
            } else {
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("ParticleCombiner")
                        .named(format!("ParticleCombiner_{output}"))
                        .param(
                            "decayString",
                            format!("{output} -> {}", daughters.join(" ")),
                        )
                        .param("cut", cut)
                        .param("decayMode", decay_mode_id)
                        .param("writeOut", true),
                );
            }

            let monitoring = ctx.env.config().monitor;
            let mut variables = vec!["mcErrors".to_string(), "mcParticleStatus".into(), target.clone()];
            let mut pairs = Vec::new();
            if let Some(variable) = &config.best_candidate_variable {
                variables.insert(0, variable.clone());
                pairs.extend([
                    (variable.clone(), target.clone()),
                    (variable.clone(), "mcErrors".into()),
                    (variable.clone(), "mcParticleStatus".into()),
                ]);
            }

            if monitoring {
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("MCMatcherParticles")
                        .named(format!("MCMatcher_{output}"))
                        .param("listName", output.as_str()),
                );
                ctx.env.add_module(
                    Phase::Pre,
                    monitor::histograms(
                        &output,
                        "Monitor_PreReconstruction_BeforeRanking.root",
                        &label,
                        &variables,
                        &pairs,
                    ),
                );
            }

            if let Some(variable) = &config.best_candidate_variable {
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("BestCandidateSelection")
                        .named(format!("BestCandidateSelection_{output}"))
                        .param("particleList", output.as_str())
                        .param("variable", variable.as_str())
                        .param(
                            "selectLowest",
                            config.best_candidate_mode == BestCandidateMode::Lowest,
                        )
                        .param("numBest", config.best_candidate_cut)
                        .param("outputVariable", "preCut_rank"),
                );
            }

            if monitoring {
                let rank = "extraInfo(preCut_rank)".to_string();
                variables.push(rank.clone());
                pairs.extend([
                    (rank.clone(), target.clone()),
                    (rank.clone(), "mcErrors".into()),
                    (rank, "mcParticleStatus".into()),
                ]);
                ctx.env.add_module(
                    Phase::Pre,
                    monitor::histograms(
                        &output,
                        "Monitor_PreReconstruction_AfterRanking.root",
                        &label,
                        &variables,
                        &pairs,
                    ),
                );
            }

            Ok(Outputs::one(key, Value::Text(output)))
        })
}

/// MC truth matching of the raw channel list during training. Monitoring
/// matches the list as soon as it is made.
pub fn match_particle_list(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("MatchParticleList_{label}"))
        .bind("list", Kind::RawParticleList.of(&label))
        .provides(Kind::MatchedParticleList.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::MatchedParticleList.of(&label);
            let Some(list) = list(args.single("list")?)? else {
                return Ok(Outputs::one(key, none()));
            };

            let config = ctx.env.config();
            if config.training && !config.monitor {
                ctx.env.add_module(
                    Phase::Pre,
                    Module::new("MCMatcherParticles")
                        .named(format!("MCMatcher_{list}"))
                        .param("listName", list),
                );
            }
            Ok(Outputs::one(key, Value::from(list)))
        })
}

/// Vertex fit of the channel candidates. Channels with a single daughter, or
/// with several `pi0` daughters, are not fitted but still count as done once
/// the daughters are.
pub fn fit_vertex(particle: &Particle, channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();
    let target = channel.mva_config.target.clone();
    let is_pi0 = particle.name == "pi0";
    let pi0s = channel
        .daughters
        .iter()
        .filter(|d| d.split(':').next() == Some("pi0"))
        .count();
    let single = channel.daughters.len() == 1;

    Task::new(format!("FitVertex_{label}"))
        .bind("list", Kind::RawParticleList.of(&label))
        .bind("config", Kind::PreCutConfig.of(&label))
        // Only orders the fit after the daughter fits.
        .gather(
            "daughters",
            channel.daughters.iter().map(|d| Kind::VertexFit.of(d)),
        )
        .provides(Kind::VertexFit.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::VertexFit.of(&label);
            let Some(list) = list(args.single("list")?)? else {
                return Ok(Outputs::one(key, none()));
            };
            if single {
                return Ok(Outputs::one(key, Value::from(list)));
            }
            if pi0s > 1 && !is_pi0 {
                tracing::info!(channel = %label, "Ignoring vertex fit, multiple pi0 are not supported");
                return Ok(Outputs::one(key, Value::from(list)));
            }

            let config = args.single("config")?.as_pre_cut_config()?;
            ctx.env.add_module(
                Phase::Pre,
                Module::new("ParticleVertexFitter")
                    .named(format!("ParticleVertexFitter_{list}"))
                    .param("listName", list)
                    .param("confidenceLevel", config.vertex_cut)
                    .param("vertexFitter", "KFit")
                    .param("fitType", if is_pi0 { "mass" } else { "vertex" }),
            );

            if ctx.env.config().monitor {
                let chi = "chiProb".to_string();
                ctx.env.add_module(
                    Phase::Pre,
                    monitor::histograms(
                        list,
                        "Monitor_PreReconstruction_AfterVertex.root",
                        &label,
                        &[chi.clone(), "mcErrors".into(), "mcParticleStatus".into(), target.clone()],
                        &[
                            (chi.clone(), target.clone()),
                            (chi.clone(), "mcErrors".into()),
                            (chi, "mcParticleStatus".into()),
                        ],
                    ),
                );
            }
            Ok(Outputs::one(key, Value::from(list)))
        })
}

/// Vertex fit of a particle: the hash over its channel fits, available once
/// every channel is fitted.
pub fn particle_vertex_fit(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();

    Task::new(format!("VertexFit_{identifier}"))
        .gather(
            "channels",
            particle.channels.iter().map(|c| Kind::VertexFit.of(&c.label)),
        )
        .provides(Kind::VertexFit.of(&identifier))
        .cached()
        .run(move |ctx: &mut Context<'_, Pipeline>, _: &Args<'_, Value>| {
            Ok(Outputs::one(
                Kind::VertexFit.of(&identifier),
                Value::Text(ctx.hash.to_hex()),
            ))
        })
}

/// Inverse sampling rates keeping the training data of a channel below
/// [`MAXIMUM_SAMPLES`] per class.
pub fn sampling(particle: &Particle, channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();
    let name = particle.name.clone();

    Task::new(format!("Sampling_{label}"))
        .bind("counts", mc_counts_key())
        .bind("config", Kind::PreCutConfig.of(&label))
        .provides(Kind::Sampling.of(&label))
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let counts = args.single("counts")?.as_counts()?;
            let config = args.single("config")?.as_pre_cut_config()?;
            let code = pdg::from_name(&name)
                .ok_or_else(|| anyhow!("No PDG code for {name}"))?
                .abs();

            let mut signal = counts.get(&code).map_or(0.0, |c| c.sum);
            if code > 400 {
                signal /= 1000.0;
            }
            if code > 500 {
                signal /= 10000.0;
            }
            let events = counts.get(&0).map_or(0.0, |c| c.sum);
            let background = events * f64::from(config.best_candidate_cut);

            let rate = |n: f64| (n > MAXIMUM_SAMPLES).then(|| (n / MAXIMUM_SAMPLES) as u64 + 1);
            let sampling = Sampling {
                signal,
                background,
                signal_rate: rate(signal),
                background_rate: match config.no_background_sampling {
                    true => None,
                    false => rate(background),
                },
            };
            Ok(Outputs::one(
                Kind::Sampling.of(&label),
                Value::Sampling(sampling),
            ))
        })
}

/// Training data of a channel.
///
/// Once the data or the weight file exists their names are produced.
/// Otherwise the ntuple writer is added to the training phase, a job
/// description for the teacher is written next to it, and the task defers.
/// See [`additional_dependencies`] for what else the data waits for.
pub fn training_data(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("TrainingData_{label}"))
        .bind("list", Kind::MatchedParticleList.of(&label))
        .bind("mva", Kind::MvaConfig.of(&label))
        .bind("sampling", Kind::Sampling.of(&label))
        .gather("requirements", additional_dependencies(channel))
        .provides(Kind::TrainingData.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::TrainingData.of(&label);
            let Some(list) = list(args.single("list")?)? else {
                return Ok(Outputs::one(key, none()));
            };
            if args.gather("requirements")?.iter().any(|v| v.is_none()) {
                return Ok(Outputs::one(key, none()));
            }
            let mva = args.single("mva")?.as_mva()?;
            let sampling = args.single("sampling")?.as_sampling()?;

            let stem = remove_jpsi_slash(&format!("{label}_{}", ctx.hash.short()));
            let workdir = ctx.env.workdir();
            let training = Training {
                data: workdir.join(format!("{stem}.root")),
                weight: workdir.join(format!("{stem}_{}.xml", mva.method)),
            };

            if training.data.exists() || training.weight.exists() {
                return Ok(Outputs::one(key, Value::Training(training)));
            }

            let mut variables = mva.variables.clone();
            variables.push(mva.target.clone());
            if let Some(splot) = &mva.splot_variable {
                variables.push(splot.clone());
            }

            let mut rates = serde_json::Map::new();
            if let Some(rate) = sampling.background_rate {
                rates.insert("0".into(), json!(rate));
            }
            if let Some(rate) = sampling.signal_rate {
                rates.insert("1".into(), json!(rate));
            }

            let job = TrainingJob {
                label: remove_jpsi_slash(&label),
                data: training.data.clone(),
                weight: training.weight.clone(),
                log: workdir.join(format!("{stem}.log")),
                tree: format!("{label} variables"),
                method: mva.method.clone(),
                config: mva.config.clone(),
                target: mva.target.clone(),
                variables: mva.variables.clone(),
                signal: sampling.signal / sampling.signal_rate.unwrap_or(1) as f64,
                background: sampling.background / sampling.background_rate.unwrap_or(1) as f64,
            };
            let job_path = workdir.join(format!("{stem}.job"));
            fs::write(&job_path, serde_json::to_string_pretty(&job)?)?;

            ctx.env.add_module(
                Phase::Training,
                Module::new("VariablesToNtuple")
                    .named(format!("VariablesToNtuple_{list}"))
                    .param("fileName", training.data.as_str())
                    .param("treeName", job.tree.as_str())
                    .param("variables", variables)
                    .param("particleList", list)
                    .param("sampling", json!([mva.target, rates])),
            );

            if ctx.env.config().monitor {
                let mut variables = vec!["mcErrors".to_string(), "mcParticleStatus".into()];
                variables.extend(mva.variables.iter().cloned());
                variables.push(mva.target.clone());
                let pairs: Vec<(String, String)> = mva
                    .variables
                    .iter()
                    .filter(|v| **v != mva.target)
                    .map(|v| (v.clone(), mva.target.clone()))
                    .collect();
                ctx.env.add_module(
                    Phase::Training,
                    monitor::histograms(list, "Monitor_TrainingData.root", &label, &variables, &pairs),
                );
            }

            tracing::debug!(job = %job_path, "Waiting for training data");
            Ok(Outputs::deferred())
        })
}

/// Classifier of a channel during training: the weight file, once the
/// teacher produced it.
pub fn trained_mvc(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("TrainedMVC_{label}"))
        .bind("training", Kind::TrainingData.of(&label))
        .provides(Kind::TrainedMvc.of(&label))
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::TrainedMvc.of(&label);
            let training = match args.single("training")? {
                Value::None => return Ok(Outputs::one(key, none())),
                value => value.as_training()?,
            };

            match training.weight.exists() {
                true => Ok(Outputs::one(key, Value::from(training.weight.as_str()))),
                false => Ok(Outputs::deferred()),
            }
        })
}

/// Classifier of a channel during application: the database identifier.
pub fn database_mvc(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("TrainedMVC_{label}"))
        .bind("list", Kind::RawParticleList.of(&label))
        .provides(Kind::TrainedMvc.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::TrainedMvc.of(&label);
            if list(args.single("list")?)?.is_none() {
                return Ok(Outputs::one(key, none()));
            }
            let identifier = format!("{}_{}", ctx.env.config().prefix, remove_jpsi_slash(&label));
            Ok(Outputs::one(key, Value::Text(identifier)))
        })
}

/// Applies the classifier of a channel and tags unique signal candidates.
pub fn channel_signal_probability(channel: &DecayChannel) -> FeiTask {
    let label = channel.label.clone();

    Task::new(format!("SignalProbability_{label}"))
        .bind("list", Kind::RawParticleList.of(&label))
        .bind("mvc", Kind::TrainedMvc.of(&label))
        .bind("mva", Kind::MvaConfig.of(&label))
        .provides(Kind::SignalProbability.of(&label))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::SignalProbability.of(&label);
            let (Some(list), Some(mvc)) = (list(args.single("list")?)?, list(args.single("mvc")?)?)
            else {
                return Ok(Outputs::one(key, none()));
            };
            let mva = args.single("mva")?.as_mva()?;

            ctx.env.add_module(
                Phase::Post,
                Module::new("MVAExpert")
                    .named(format!("MVAExpert_{list}"))
                    .param("identifier", mvc)
                    .param("extraInfoName", "SignalProbability")
                    .param("listNames", json!([list])),
            );
            ctx.env.add_module(
                Phase::Post,
                Module::new("TagUniqueSignal")
                    .named(format!("TagUniqueSignal_{list}"))
                    .param("particleList", list)
                    .param("target", mva.target.as_str())
                    .param("extraInfoName", "uniqueSignal"),
            );

            if ctx.env.config().monitor {
                let probability = "extraInfo(SignalProbability)".to_string();
                let mode = "extraInfo(decayModeID)".to_string();
                let variables = [
                    "mcErrors".to_string(),
                    "mcParticleStatus".into(),
                    "extraInfo(uniqueSignal)".into(),
                    probability.clone(),
                    mva.target.clone(),
                    mode.clone(),
                ];
                let pairs = [
                    (probability.clone(), mva.target.clone()),
                    (probability.clone(), "mcErrors".into()),
                    (probability, "mcParticleStatus".into()),
                    (mode.clone(), mva.target.clone()),
                    (mode.clone(), "mcErrors".into()),
                    (mode.clone(), "extraInfo(uniqueSignal)".into()),
                    (mode, "mcParticleStatus".into()),
                ];
                ctx.env.add_module(
                    Phase::Post,
                    monitor::histograms(
                        list,
                        "Monitor_PostReconstruction_AfterMVA.root",
                        &label,
                        &variables,
                        &pairs,
                    ),
                );
            }
            Ok(Outputs::one(key, Value::from(mvc)))
        })
}

/// Merges the classified channel lists of a particle, applies the post cut
/// and ranks the candidates by signal probability.
pub fn copy_particle_lists(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();
    let channels = &particle.channels;
    let target = particle.mva_config.target.clone();
    let final_variables = final_variables(particle);

    Task::new(format!("CopyParticleLists_{identifier}"))
        .bind("name", Kind::Name.of(&identifier))
        .gather(
            "lists",
            channels.iter().map(|c| Kind::RawParticleList.of(&c.label)),
        )
        .gather(
            "probabilities",
            channels.iter().map(|c| Kind::SignalProbability.of(&c.label)),
        )
        .bind("cut", Kind::PostCut.of(&identifier))
        .bind("config", Kind::PostCutConfig.of(&identifier))
        .provides(Kind::ParticleList.of(&identifier))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::ParticleList.of(&identifier);

            let mut inputs = Vec::new();
            for (l, p) in args.gather("lists")?.iter().zip(args.gather("probabilities")?) {
                if let (Some(l), false) = (list(l)?, p.is_none()) {
                    inputs.push(l);
                }
            }
            if inputs.is_empty() {
                return Ok(Outputs::one(key, none()));
            }

            let name = args.single("name")?.as_text()?;
            let cut = args.single("cut")?.as_cut()?;
            let config = args.single("config")?.as_post_cut_config()?;
            let output = format!("{name}:{}", ctx.hash.short());

            let monitoring = ctx.env.config().monitor;
            let mode = "extraInfo(decayModeID)".to_string();
            let mut variables = vec![
                "mcErrors".to_string(),
                "mcParticleStatus".into(),
                "extraInfo(uniqueSignal)".into(),
                "extraInfo(SignalProbability)".into(),
                target.clone(),
                mode.clone(),
            ];
            let mut pairs = vec![
                (mode.clone(), target.clone()),
                (mode.clone(), "mcErrors".into()),
                (mode.clone(), "mcParticleStatus".into()),
            ];

            ctx.env.add_module(
                Phase::Post,
                Module::new("ParticleListManipulator")
                    .named(format!("ParticleListManipulator_{output}"))
                    .param("outputListName", output.as_str())
                    .param("inputListNames", inputs)
                    .param("variable", "particleSource")
                    .param("writeOut", true),
            );
            if monitoring {
                ctx.env.add_module(
                    Phase::Post,
                    monitor::histograms(
                        &output,
                        "Monitor_PostReconstruction_BeforePostCut.root",
                        &identifier,
                        &variables,
                        &pairs,
                    ),
                );
            }

            ctx.env.add_module(
                Phase::Post,
                Module::new("ParticleSelector")
                    .named(format!("ParticleSelector_{output}"))
                    .param("decayString", output.as_str())
                    .param("cut", cut),
            );
            if monitoring {
                ctx.env.add_module(
                    Phase::Post,
                    monitor::histograms(
                        &output,
                        "Monitor_PostReconstruction_BeforeRanking.root",
                        &identifier,
                        &variables,
                        &pairs,
                    ),
                );
            }

            ctx.env.add_module(
                Phase::Post,
                Module::new("BestCandidateSelection")
                    .named(format!("BestCandidateSelection_{output}"))
                    .param("particleList", output.as_str())
                    .param("variable", "extraInfo(SignalProbability)")
                    .param("selectLowest", false)
                    .param("numBest", config.best_candidate_cut)
                    .param("outputVariable", "postCut_rank"),
            );
            if monitoring {
                let rank = "extraInfo(postCut_rank)".to_string();
                variables.push(rank.clone());
                pairs.extend([
                    (mode, rank.clone()),
                    (target.clone(), rank.clone()),
                    ("mcErrors".into(), rank.clone()),
                    ("mcParticleStatus".into(), rank),
                ]);
                ctx.env.add_module(
                    Phase::Post,
                    monitor::histograms(
                        &output,
                        "Monitor_PostReconstruction_AfterRanking.root",
                        &identifier,
                        &variables,
                        &pairs,
                    ),
                );
                ctx.env.add_module(
                    Phase::Post,
                    monitor::ntuple(
                        &output,
                        "Monitor_Final.root",
                        &format!("{identifier} variables"),
                        &final_variables,
                    ),
                );
            }
            Ok(Outputs::one(key, Value::Text(output)))
        })
}

/// Columns of the final monitoring ntuple of a particle.
fn final_variables(particle: &Particle) -> Vec<String> {
    let mut variables: Vec<String> = [
        "extraInfo(SignalProbability)",
        "mcErrors",
        "mcParticleStatus",
        particle.mva_config.target.as_str(),
        "extraInfo(uniqueSignal)",
        "extraInfo(decayModeID)",
    ]
    .map(String::from)
    .into();

    if particle.name == "B_s0" {
        variables.push("Mbc".into());
    } else if particle.name.contains('B') {
        variables.extend(["Mbc".into(), "cosThetaBetweenParticleAndNominalB".into()]);
    }
    variables
}

/// Copies the merged list of a particle into the list the user asked for.
pub fn human_readable_particle_list(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();

    Task::new(format!("HumanReadableParticleList_{identifier}"))
        .bind("name", Kind::Name.of(&identifier))
        .bind("label", Kind::Label.of(&identifier))
        .bind("list", Kind::ParticleList.of(&identifier))
        .provides(Kind::HumanReadableParticleList.of(&identifier))
        .run(move |ctx: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::HumanReadableParticleList.of(&identifier);
            let Some(list) = list(args.single("list")?)? else {
                return Ok(Outputs::one(key, none()));
            };
            let output = format!(
                "{}:{}",
                args.single("name")?.as_text()?,
                args.single("label")?.as_text()?
            );

            ctx.env.add_module(
                Phase::Post,
                Module::new("ParticleListManipulator")
                    .named(format!("ParticleListManipulator_{output}"))
                    .param("outputListName", output.as_str())
                    .param("inputListNames", json!([list]))
                    .param("cut", "")
                    .param("writeOut", true),
            );
            Ok(Outputs::one(key, Value::Text(output)))
        })
}

/// Signal probability of a particle: the hash over its channels, available
/// once every channel is classified.
pub fn particle_signal_probability(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();

    Task::new(format!("SignalProbability_{identifier}"))
        .gather(
            "channels",
            particle
                .channels
                .iter()
                .map(|c| Kind::SignalProbability.of(&c.label)),
        )
        .provides(Kind::SignalProbability.of(&identifier))
        .cached()
        .run(move |ctx: &mut Context<'_, Pipeline>, _: &Args<'_, Value>| {
            Ok(Outputs::one(
                Kind::SignalProbability.of(&identifier),
                Value::Text(ctx.hash.to_hex()),
            ))
        })
}

/// The particle list of the charge conjugated particle.
pub fn conjugate_particle_list(particle: &Particle) -> FeiTask {
    let identifier = particle.identifier.clone();
    let conjugate = particle.conjugate_identifier();

    Task::new(format!("ParticleList_{conjugate}"))
        .bind("list", Kind::ParticleList.of(&identifier))
        .provides(Kind::ParticleList.of(&conjugate))
        .cached()
        .run(move |_: &mut Context<'_, Pipeline>, args: &Args<'_, Value>| {
            let key = Kind::ParticleList.of(&conjugate);
            let value = match list(args.single("list")?)? {
                Some(list) => Value::Text(pdg::conjugate_identifier(list)),
                None => none(),
            };
            Ok(Outputs::one(key, value))
        })
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;

    use super::*;
    use crate::engine::{Node, Resolver, Resource, Sequence};
    use crate::fei::config::{FeiConfig, MvaConfig, PostCutConfig, PreCutConfig};

    fn resolve(nodes: Vec<Node<Key, Value, Pipeline>>, pipeline: &mut Pipeline) -> IndexMap<Key, Value> {
        let mut sequence = Sequence::new();
        for node in nodes {
            sequence.push(node).unwrap();
        }
        Resolver::new().run(&sequence, pipeline).unwrap().satisfied
    }

    #[test]
    fn test_post_cut() {
        let particle = Particle::new("D0", MvaConfig::default()).with_post_cut(PostCutConfig {
            value: 0.001,
            best_candidate_cut: 10,
        });
        let mut pipeline = Pipeline::new(FeiConfig::default(), "work");
        let satisfied = resolve(
            vec![
                Resource::new(
                    Kind::PostCutConfig.of("D0:generic"),
                    Value::PostCutConfig(particle.post_cut_config.clone()),
                )
                .into(),
                post_cut(&particle).into(),
            ],
            &mut pipeline,
        );

        assert_eq!(
            satisfied[&Kind::PostCut.of("D0:generic")],
            Value::Cut("0.001 < extraInfo(SignalProbability)".into())
        );
    }

    #[test]
    fn test_make_particle_list() {
        let mut particle = Particle::new("D0", MvaConfig::default()).with_pre_cut(PreCutConfig {
            best_candidate_variable: Some("abs(dM)".into()),
            best_candidate_cut: 20,
            ..PreCutConfig::default()
        });
        particle.add_channel(["K-", "pi+"], None, None).unwrap();
        particle.add_channel(["K-", "pi+", "pi0", "pi0"], None, None).unwrap();
        let label = particle.channels[0].label.clone();
        let ignored = particle.channels[1].label.clone();

        let mut nodes: Vec<Node<Key, Value, Pipeline>> = vec![
            Resource::new(Kind::Name.of("D0:generic"), Value::from("D0")).into(),
            Resource::new(Kind::ParticleList.of("K-:generic"), Value::from("K-:aaaa")).into(),
            Resource::new(Kind::ParticleList.of("pi+:generic"), Value::from("pi+:bbbb")).into(),
            Resource::new(Kind::ParticleList.of("pi0:generic"), Value::None).into(),
        ];
        for daughter in ["K-:generic", "pi+:generic", "pi0:generic"] {
            nodes.push(Resource::new(Kind::VertexFit.of(daughter), Value::from(daughter)).into());
        }
        for channel in &particle.channels {
            nodes.push(
                Resource::new(
                    Kind::PreCutConfig.of(&channel.label),
                    Value::PreCutConfig(channel.pre_cut_config.clone()),
                )
                .into(),
            );
            nodes.push(
                Resource::new(
                    Kind::DecayModeId.of(&channel.label),
                    Value::Int(channel.decay_mode_id as i64),
                )
                .into(),
            );
            nodes.push(pre_cut(channel).into());
            nodes.push(make_particle_list(&particle, channel).into());
            nodes.push(fit_vertex(&particle, channel).into());
        }

        let mut pipeline = Pipeline::new(FeiConfig::default(), "work");
        let satisfied = resolve(nodes, &mut pipeline);

        let list = satisfied[&Kind::RawParticleList.of(&label)].as_text().unwrap().to_string();
        assert!(list.starts_with("D0:"));
        assert_eq!(list.len(), "D0:".len() + 16);
        assert_eq!(satisfied[&Kind::RawParticleList.of(&ignored)], Value::None);
        assert_eq!(satisfied[&Kind::VertexFit.of(&ignored)], Value::None);

        let pre = pipeline.phase(Phase::Pre);
        let combiner = pre.find(&format!("ParticleCombiner_{list}")).unwrap();
        assert_eq!(
            combiner.params["decayString"],
            json!(format!("{list} -> K-:aaaa pi+:bbbb"))
        );
        assert!(pre.find(&format!("BestCandidateSelection_{list}")).is_some());
        let fitter = pre.find(&format!("ParticleVertexFitter_{list}")).unwrap();
        assert_eq!(fitter.params["fitType"], json!("vertex"));
    }

    fn channel_nodes(particle: &Particle, channel: &DecayChannel) -> Vec<Node<Key, Value, Pipeline>> {
        vec![
            Resource::new(Kind::Name.of(&particle.identifier), Value::from(particle.name.as_str())).into(),
            Resource::new(
                Kind::PreCutConfig.of(&channel.label),
                Value::PreCutConfig(channel.pre_cut_config.clone()),
            )
            .into(),
            Resource::new(
                Kind::DecayModeId.of(&channel.label),
                Value::Int(channel.decay_mode_id as i64),
            )
            .into(),
            pre_cut(channel).into(),
            make_particle_list(particle, channel).into(),
        ]
    }

    #[test]
    fn test_ranking_follows_best_candidate_variable() {
        let mut unranked = Particle::new("D0", MvaConfig::default());
        unranked.add_channel(["K-:aaaa", "pi+:bbbb"], None, None).unwrap();
        let mut ranked = Particle::new("D+", MvaConfig::default()).with_pre_cut(PreCutConfig {
            best_candidate_variable: Some("daughterProductOf(extraInfo(SignalProbability))".into()),
            best_candidate_mode: BestCandidateMode::Highest,
            best_candidate_cut: 10,
            ..PreCutConfig::default()
        });
        ranked.add_channel(["K-:aaaa", "pi+:bbbb", "pi+:bbbb"], None, None).unwrap();

        let mut nodes: Vec<Node<Key, Value, Pipeline>> = vec![
            Resource::new(Kind::ParticleList.of("K-:aaaa"), Value::from("K-:aaaa")).into(),
            Resource::new(Kind::ParticleList.of("pi+:bbbb"), Value::from("pi+:bbbb")).into(),
        ];
        nodes.extend(channel_nodes(&unranked, &unranked.channels[0]));
        nodes.extend(channel_nodes(&ranked, &ranked.channels[0]));

        let mut pipeline = Pipeline::new(FeiConfig::default(), "work");
        let satisfied = resolve(nodes, &mut pipeline);

        let pre = pipeline.phase(Phase::Pre);
        let ranking: Vec<_> = pre
            .modules()
            .iter()
            .filter(|m| m.kind == "BestCandidateSelection")
            .collect();
        assert_eq!(ranking.len(), 1);

        let list = satisfied[&Kind::RawParticleList.of(&ranked.channels[0].label)].as_text().unwrap();
        assert_eq!(ranking[0].params["particleList"], json!(list));
        assert_eq!(ranking[0].params["selectLowest"], json!(false));
        assert_eq!(ranking[0].params["numBest"], json!(10));
    }

    #[test]
    fn test_additional_dependencies() {
        let mut particle = Particle::new(
            "D0",
            MvaConfig {
                variables: vec!["M".into(), "daughter({}, extraInfo(SignalProbability))".into()],
                ..MvaConfig::default()
            },
        );
        particle.add_channel(["K-", "pi+"], None, None).unwrap();
        particle
            .add_channel(
                ["K-", "pi+", "pi0"],
                Some(MvaConfig {
                    variables: vec!["chiProb".into(), "M".into()],
                    ..MvaConfig::default()
                }),
                None,
            )
            .unwrap();
        particle
            .add_channel(
                ["K-", "pi+", "pi+", "pi-"],
                Some(MvaConfig {
                    variables: vec!["p".into()],
                    ..MvaConfig::default()
                }),
                None,
            )
            .unwrap();

        let [probabilities, vertex, plain] = [0, 1, 2].map(|i| additional_dependencies(&particle.channels[i]));
        assert_eq!(
            probabilities,
            vec![
                Kind::SignalProbability.of("K-:generic"),
                Kind::SignalProbability.of("pi+:generic")
            ]
        );
        assert_eq!(vertex, vec![Kind::VertexFit.of(&particle.channels[1].label)]);
        assert!(plain.is_empty());
    }

    #[test]
    fn test_vertex_fit_waits_for_daughters() {
        let mut particle = Particle::new("D0", MvaConfig::default());
        particle.add_channel(["K-", "pi+"], None, None).unwrap();
        let mut single = Particle::new("K+", MvaConfig::default());
        single.add_channel(["K+:FSP"], None, None).unwrap();
        let channel = &particle.channels[0];

        let mut nodes: Vec<Node<Key, Value, Pipeline>> = vec![
            Resource::new(Kind::ParticleList.of("K-:generic"), Value::from("K-:aaaa")).into(),
            Resource::new(Kind::ParticleList.of("pi+:generic"), Value::from("pi+:bbbb")).into(),
            Resource::new(Kind::ParticleList.of("K+:FSP"), Value::from("K+:FSP")).into(),
            Resource::new(Kind::VertexFit.of("K+:FSP"), Value::from("K+:FSP")).into(),
            Resource::new(Kind::VertexFit.of("K-:generic"), Value::from("K-:aaaa")).into(),
            fit_vertex(&particle, channel).into(),
            particle_vertex_fit(&particle).into(),
            fit_vertex(&single, &single.channels[0]).into(),
            particle_vertex_fit(&single).into(),
        ];
        nodes.extend(channel_nodes(&particle, channel));
        nodes.extend(channel_nodes(&single, &single.channels[0]));

        let mut pipeline = Pipeline::new(FeiConfig::default(), "work");
        let satisfied = resolve(nodes, &mut pipeline);

        // The single daughter channel is done without a fit.
        let list = satisfied[&Kind::RawParticleList.of(&single.channels[0].label)].clone();
        assert_eq!(satisfied[&Kind::VertexFit.of(&single.channels[0].label)], list);
        assert!(satisfied.contains_key(&Kind::VertexFit.of("K+:generic")));

        // pi+:generic was never fitted.
        assert!(!satisfied.contains_key(&Kind::VertexFit.of(&channel.label)));
        assert!(!satisfied.contains_key(&Kind::VertexFit.of("D0:generic")));
        assert!(pipeline.phase(Phase::Pre).modules().iter().all(|m| m.kind != "ParticleVertexFitter"));
    }

    #[test]
    fn test_pre_cut_chain() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = camino::Utf8Path::from_path(dir.path()).unwrap();

        let mut particle = Particle::new("D0", MvaConfig::default()).with_pre_cut(PreCutConfig {
            user_cut: "p > 0.1".into(),
            variable: Some("M".into()),
            binning: Binning::Edges(vec![1.8, 1.85, 1.9]),
            efficiency: 1.0,
            ..PreCutConfig::default()
        });
        particle.add_channel(["K-", "pi+"], None, None).unwrap();
        particle.add_channel(["K-", "pi+", "pi0"], None, None).unwrap();

        let nodes = || {
            let mut nodes: Vec<Node<Key, Value, Pipeline>> = vec![
                Resource::new(Kind::Name.of("D0:generic"), Value::from("D0")).into(),
                Resource::new(
                    Kind::PreCutConfig.of("D0:generic"),
                    Value::PreCutConfig(particle.pre_cut_config.clone()),
                )
                .into(),
                Resource::new(Kind::ParticleList.of("K-:generic"), Value::from("K-:aaaa")).into(),
                Resource::new(Kind::ParticleList.of("pi+:generic"), Value::from("pi+:bbbb")).into(),
                Resource::new(Kind::ParticleList.of("pi0:generic"), Value::from("pi0:cccc")).into(),
                pre_cut_determination(&particle).into(),
            ];
            for channel in &particle.channels {
                nodes.push(
                    Resource::new(
                        Kind::MvaConfig.of(&channel.label),
                        Value::Mva(channel.mva_config.clone()),
                    )
                    .into(),
                );
                nodes.push(pre_cut_histogram(&particle, channel).into());
                nodes.push(determined_pre_cut(&particle, channel).into());
            }
            nodes
        };

        let mut pipeline = Pipeline::new(FeiConfig::default(), workdir);
        let satisfied = resolve(nodes(), &mut pipeline);
        assert!(!satisfied.contains_key(&Kind::PreCut.of("D0:generic")));

        let makers: Vec<_> = pipeline
            .phase(Phase::Pre)
            .modules()
            .iter()
            .filter(|m| m.kind == "PreCutHistMaker")
            .collect();
        assert_eq!(makers.len(), 2);
        assert_eq!(makers[0].params["customBinning"], json!([1.8, 1.85, 1.9]));
        assert_eq!(makers[0].params["cut"], json!("p > 0.1"));

        // The first channel peaks, the second one only holds background.
        let histograms = [
            r#"{"edges": [1.8, 1.85, 1.9], "signal": [10, 0], "background": [1, 5]}"#,
            r#"{"edges": [1.8, 1.85, 1.9], "signal": [0, 0], "background": [4, 4]}"#,
        ];
        for (maker, content) in makers.iter().zip(histograms) {
            let file = maker.params["fileName"].as_str().unwrap().replace(".root", ".json");
            fs::write(file, content).unwrap();
        }

        let mut pipeline = Pipeline::new(FeiConfig::default(), workdir);
        let satisfied = resolve(nodes(), &mut pipeline);
        assert!(pipeline.phase(Phase::Pre).is_empty());

        let [peaked, empty] = [0, 1].map(|i| Kind::PreCut.of(&particle.channels[i].label));
        assert_eq!(satisfied[&peaked], Value::Cut("1.8 <= M <= 1.85 and [p > 0.1]".into()));
        assert_eq!(satisfied[&empty], Value::None);
    }
}
