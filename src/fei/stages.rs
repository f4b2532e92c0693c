use crate::error::FeiError;
use crate::fei::config::Particle;

/// Particle names reconstructed in each stage. The last stage is empty and
/// marks the end of the training.
pub const STAGES: [&[&str]; 7] = [
    &["e+", "K+", "pi+", "mu+", "gamma", "p+", "K_L0"],
    &["pi0", "J/psi", "Lambda0"],
    &["K_S0", "Sigma+"],
    &["D+", "D0", "D_s+", "Lambda_c+"],
    &["D*+", "D*0", "D_s*+"],
    &["B0", "B+", "B_s0"],
    &[],
];

/// Groups the particles by stage, keeping their order within a stage.
///
/// Fails on the first particle whose name is not part of any stage.
pub fn get_stages(particles: &[Particle]) -> Result<Vec<Vec<&Particle>>, FeiError> {
    if let Some(unknown) = particles
        .iter()
        .find(|p| !STAGES.iter().any(|stage| stage.contains(&p.name.as_str())))
    {
        return Err(FeiError::UnknownParticle(unknown.name.clone()));
    }

    Ok(STAGES
        .iter()
        .map(|names| {
            particles
                .iter()
                .filter(|p| names.contains(&p.name.as_str()))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fei::config::MvaConfig;

    #[test]
    fn test_grouping() {
        let particles = vec![
            Particle::new("B+", MvaConfig::default()),
            Particle::new("pi+", MvaConfig::default()),
            Particle::new("D0", MvaConfig::default()),
            Particle::new("K+", MvaConfig::default()),
        ];
        let stages = get_stages(&particles).unwrap();

        assert_eq!(stages.len(), 7);
        let names: Vec<&str> = stages[0].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pi+", "K+"]);
        assert_eq!(stages[3][0].name, "D0");
        assert_eq!(stages[5][0].name, "B+");
        assert!(stages[6].is_empty());
    }

    #[test]
    fn test_unknown_particle() {
        let particles = vec![Particle::new("X+", MvaConfig::default())];
        let err = get_stages(&particles).unwrap_err();
        assert!(matches!(err, FeiError::UnknownParticle(name) if name == "X+"));
    }
}
