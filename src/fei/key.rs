use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// What a key names. Together with an owner it forms a [`Key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Name,
    Label,
    Identifier,
    MvaConfig,
    PreCutConfig,
    PostCutConfig,
    DecayModeId,
    RawParticleList,
    MatchedParticleList,
    VertexFit,
    PreCutHistogram,
    PreCut,
    PostCut,
    Sampling,
    TrainingData,
    TrainedMvc,
    SignalProbability,
    ParticleList,
    HumanReadableParticleList,
    McCounts,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Name => "Name",
            Kind::Label => "Label",
            Kind::Identifier => "Identifier",
            Kind::MvaConfig => "MVAConfig",
            Kind::PreCutConfig => "PreCutConfig",
            Kind::PostCutConfig => "PostCutConfig",
            Kind::DecayModeId => "DecayModeID",
            Kind::RawParticleList => "RawParticleList",
            Kind::MatchedParticleList => "MatchedParticleList",
            Kind::VertexFit => "VertexFit",
            Kind::PreCutHistogram => "PreCutHistogram",
            Kind::PreCut => "PreCut",
            Kind::PostCut => "PostCut",
            Kind::Sampling => "Sampling",
            Kind::TrainingData => "TrainingData",
            Kind::TrainedMvc => "TrainedMVC",
            Kind::SignalProbability => "SignalProbability",
            Kind::ParticleList => "ParticleList",
            Kind::HumanReadableParticleList => "HumanReadableParticleList",
            Kind::McCounts => "mcCounts",
        }
    }

    /// Pairs the kind with an owner.
    pub fn of(self, owner: impl Into<String>) -> Key {
        Key {
            kind: self,
            owner: owner.into(),
        }
    }
}

/// Typed name of a value in the FEI sequence.
///
/// The owner is a particle identifier (`D0:generic`), a channel label
/// (`D0:generic ==> K-:generic pi+:generic`) or a loaded list (`pi+:FSP`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub kind: Kind,
    pub owner: String,
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.kind.as_str(), self.owner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Kind::SignalProbability.of("D0:generic").to_string(),
            "SignalProbability_D0:generic"
        );
        assert_ne!(Kind::ParticleList.of("x"), Kind::RawParticleList.of("x"));
    }
}
