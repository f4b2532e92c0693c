use crate::engine::{Resource, Sequence};
use crate::error::ResolveError;
use crate::fei::config::{FeiConfig, Particle};
use crate::fei::key::{Key, Kind};
use crate::fei::path::Pipeline;
use crate::fei::provider::{self, mc_counts_key};
use crate::fei::value::{McCounts, Value};

pub type FeiSequence = Sequence<Key, Value, Pipeline>;

/// Builds the sequence of one stage.
///
/// `carried` holds the lists, vertex fits and probabilities produced by
/// earlier stages, re-entered as plain resources so the daughters of this
/// stage can find them. Particles with a pre cut variable get their channel
/// cuts from histograms instead of the user cut alone.
pub fn build_sequence(
    stage: usize,
    particles: &[&Particle],
    config: &FeiConfig,
    carried: &[(Key, Value)],
    mc_counts: Option<&McCounts>,
) -> Result<FeiSequence, ResolveError> {
    let mut sequence = Sequence::new();

    for (key, value) in carried {
        sequence.push(Resource::new(key.clone(), value.clone()))?;
    }

    if stage == 0 {
        sequence.push(provider::fsp_loader())?;
    }

    if config.training
        && let Some(counts) = mc_counts
    {
        sequence.push(Resource::new(mc_counts_key(), Value::Counts(counts.clone())))?;
    }

    for particle in particles {
        let id = &particle.identifier;

        sequence
            .push(Resource::new(Kind::Name.of(id), Value::from(particle.name.as_str())))?
            .push(Resource::new(Kind::Label.of(id), Value::from(particle.label.as_str())))?
            .push(Resource::new(Kind::Identifier.of(id), Value::from(id.as_str())))?
            .push(Resource::new(
                Kind::MvaConfig.of(id),
                Value::Mva(particle.mva_config.clone()),
            ))?
            .push(Resource::new(
                Kind::PostCutConfig.of(id),
                Value::PostCutConfig(particle.post_cut_config.clone()),
            ))?
            .push(Resource::new(
                Kind::PreCutConfig.of(id),
                Value::PreCutConfig(particle.pre_cut_config.clone()),
            ))?;

        let determined = particle.pre_cut_config.variable.is_some();
        if determined {
            sequence.push(provider::pre_cut_determination(particle))?;
        }

        for channel in &particle.channels {
            let label = &channel.label;

            sequence
                .push(Resource::new(
                    Kind::MvaConfig.of(label),
                    Value::Mva(channel.mva_config.clone()),
                ))?
                .push(Resource::new(
                    Kind::PreCutConfig.of(label),
                    Value::PreCutConfig(channel.pre_cut_config.clone()),
                ))?
                .push(Resource::new(
                    Kind::DecayModeId.of(label),
                    Value::Int(channel.decay_mode_id as i64),
                ))?;

            match determined {
                true => sequence
                    .push(provider::pre_cut_histogram(particle, channel))?
                    .push(provider::determined_pre_cut(particle, channel))?,
                false => sequence.push(provider::pre_cut(channel))?,
            };

            sequence
                .push(provider::make_particle_list(particle, channel))?
                .push(provider::match_particle_list(channel))?
                .push(provider::fit_vertex(particle, channel))?;

            match config.training {
                true => {
                    sequence
                        .push(provider::sampling(particle, channel))?
                        .push(provider::training_data(channel))?
                        .push(provider::trained_mvc(channel))?;
                }
                false => {
                    sequence.push(provider::database_mvc(channel))?;
                }
            }

            sequence.push(provider::channel_signal_probability(channel))?;
        }

        sequence
            .push(provider::post_cut(particle))?
            .push(provider::copy_particle_lists(particle))?
            .push(provider::human_readable_particle_list(particle))?
            .push(provider::particle_signal_probability(particle))?
            .push(provider::particle_vertex_fit(particle))?;

        if !particle.is_self_conjugate() {
            let conjugate = particle.conjugate_identifier();
            sequence
                .push(provider::conjugate_particle_list(particle))?
                .push(
                    Resource::new(Kind::VertexFit.of(&conjugate), Value::from(conjugate.as_str()))
                        .requires(Kind::VertexFit.of(id)),
                )?
                .push(
                    Resource::new(
                        Kind::SignalProbability.of(&conjugate),
                        Value::from(conjugate.as_str()),
                    )
                    .requires(Kind::SignalProbability.of(id)),
                )?;
        }
    }

    Ok(sequence)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fei::config::{MvaConfig, PreCutConfig};

    fn d0() -> Particle {
        let mut d0 = Particle::new("D0", MvaConfig::default());
        d0.add_channel(["K-", "pi+"], None, None).unwrap();
        d0
    }

    #[test]
    fn test_nodes_per_mode() {
        let d0 = d0();
        let training = FeiConfig {
            training: true,
            ..FeiConfig::default()
        };
        let application = FeiConfig {
            training: false,
            ..FeiConfig::default()
        };

        let train = build_sequence(3, &[&d0], &training, &[], None).unwrap();
        let apply = build_sequence(3, &[&d0], &application, &[], None).unwrap();

        // sampling, training data and trained classifier vs. database classifier
        assert_eq!(train.len(), apply.len() + 2);

        let label = &d0.channels[0].label;
        let mvc = train.provider(&Kind::TrainedMvc.of(label)).unwrap();
        assert_eq!(mvc.requirements(), vec![&Kind::TrainingData.of(label)]);
        let mvc = apply.provider(&Kind::TrainedMvc.of(label)).unwrap();
        assert_eq!(mvc.requirements(), vec![&Kind::RawParticleList.of(label)]);

        assert!(train.provider(&Kind::ParticleList.of("anti-D0:generic")).is_some());
        assert!(train.provider(&Kind::ParticleList.of("pi+:FSP")).is_none());
    }

    #[test]
    fn test_fsp_loader_only_in_first_stage() {
        let pi = Particle::new("pi+", MvaConfig::default());
        let config = FeiConfig::default();

        let first = build_sequence(0, &[&pi], &config, &[], None).unwrap();
        assert!(first.provider(&Kind::ParticleList.of("pi+:FSP")).is_some());
        assert!(first.provider(&Kind::ParticleList.of("pi-:FSP")).is_some());

        let carried = vec![(Kind::ParticleList.of("pi+:FSP"), Value::from("pi+:FSP"))];
        let later = build_sequence(1, &[], &config, &carried, None).unwrap();
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn test_duplicate_particle() {
        let err = build_sequence(3, &[&d0(), &d0()], &FeiConfig::default(), &[], None)
            .err()
            .unwrap();
        assert!(matches!(err, ResolveError::DuplicateOutput { .. }));
    }

    #[test]
    fn test_pre_cut_variable_switches_to_histograms() {
        let mut d0 = Particle::new("D0", MvaConfig::default()).with_pre_cut(PreCutConfig {
            variable: Some("M".into()),
            ..PreCutConfig::default()
        });
        d0.add_channel(["K-", "pi+"], None, None).unwrap();
        let label = &d0.channels[0].label;

        let sequence = build_sequence(3, &[&d0], &FeiConfig::default(), &[], None).unwrap();

        let cut = sequence.provider(&Kind::PreCut.of(label)).unwrap();
        assert_eq!(cut.requirements(), vec![&Kind::PreCut.of("D0:generic")]);
        assert!(sequence.provider(&Kind::PreCutHistogram.of(label)).is_some());

        let plain = build_sequence(3, &[&self::d0()], &FeiConfig::default(), &[], None).unwrap();
        let cut = plain.provider(&Kind::PreCut.of(label)).unwrap();
        assert_eq!(cut.requirements(), vec![&Kind::PreCutConfig.of(label)]);
    }

    #[test]
    fn test_training_data_requirements() {
        let mut d0 = Particle::new(
            "D0",
            MvaConfig {
                variables: vec!["chiProb".into()],
                ..MvaConfig::default()
            },
        );
        d0.add_channel(["K-", "pi+"], None, None).unwrap();
        let label = &d0.channels[0].label;

        let sequence = build_sequence(3, &[&d0], &FeiConfig::default(), &[], None).unwrap();

        let data = sequence.provider(&Kind::TrainingData.of(label)).unwrap();
        assert!(data.requirements().contains(&&Kind::VertexFit.of(label)));
        let fit = sequence.provider(&Kind::VertexFit.of(label)).unwrap();
        assert!(fit.requirements().contains(&&Kind::VertexFit.of("pi+:generic")));
        let conjugate = sequence.provider(&Kind::VertexFit.of("anti-D0:generic")).unwrap();
        assert_eq!(conjugate.requirements(), vec![&Kind::VertexFit.of("D0:generic")]);
    }
}
