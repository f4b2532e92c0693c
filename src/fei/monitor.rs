//! Histograms and ntuples recorded in monitor mode.

use std::collections::BTreeSet;

use serde_json::{Value as Json, json};

use crate::fei::path::Module;
use crate::utils::remove_jpsi_slash;

/// Histogram binning of a monitored variable, `(bins, low, high)`.
pub fn binning(variable: &str) -> (u32, f64, f64) {
    match variable {
        "mcErrors" => (513, -0.5, 512.5),
        "mcParticleStatus" => (257, -0.5, 256.5),
        "isSignal" | "isSignalAcceptMissingNeutrino" | "isSignalAcceptMissing" => (2, -0.5, 1.5),
        "extraInfo(uniqueSignal)" => (2, -0.5, 1.5),
        "extraInfo(decayModeID)" => (100, -0.5, 99.5),
        "extraInfo(SignalProbability)" | "chiProb" => (100, 0.0, 1.0),
        "extraInfo(preCut_rank)" | "extraInfo(postCut_rank)" => (41, -0.5, 40.5),
        _ => (100, -10.0, 10.0),
    }
}

pub fn variables_to_binnings<S: AsRef<str>>(variables: &[S]) -> Vec<Json> {
    variables
        .iter()
        .map(|v| {
            let v = v.as_ref();
            let (bins, low, high) = binning(v);
            json!([v, bins, low, high])
        })
        .collect()
}

pub fn variables_to_binnings_2d<S: AsRef<str>>(pairs: &[(S, S)]) -> Vec<Json> {
    pairs
        .iter()
        .map(|(x, y)| {
            let (x, y) = (x.as_ref(), y.as_ref());
            let (xbins, xlow, xhigh) = binning(x);
            let (ybins, ylow, yhigh) = binning(y);
            json!([x, xbins, xlow, xhigh, y, ybins, ylow, yhigh])
        })
        .collect()
}

/// Histograms of `variables` over the candidates of `list`, written into
/// `directory` of `file`.
pub fn histograms<S: AsRef<str>>(
    list: &str,
    file: &str,
    directory: &str,
    variables: &[S],
    variables_2d: &[(S, S)],
) -> Module {
    let stem = file.trim_end_matches(".root");
    Module::new("VariablesToHistogram")
        .named(format!("{stem}_{list}"))
        .param("particleList", list)
        .param("variables", variables_to_binnings(variables))
        .param("variables_2d", variables_to_binnings_2d(variables_2d))
        .param("fileName", remove_jpsi_slash(file))
        .param("directory", remove_jpsi_slash(directory))
}

/// Histograms of the number of MC particles per event for every PDG code.
pub fn mc_particle_counts(pdgs: impl IntoIterator<Item = i32>, name: &str, file: &str) -> Module {
    let pdgs: BTreeSet<i32> = pdgs.into_iter().map(i32::abs).collect();
    let variables: Vec<Json> = pdgs
        .iter()
        .map(|code| json!([format!("NumberOfMCParticlesInEvent({code})"), 100, -0.5, 99.5]))
        .collect();

    Module::new("VariablesToHistogram")
        .named(name)
        .param("particleList", "")
        .param("variables", variables)
        .param("fileName", file)
}

/// Ntuple of `variables` over the candidates of `list`.
pub fn ntuple<S: AsRef<str>>(list: &str, file: &str, tree: &str, variables: &[S]) -> Module {
    let variables: Vec<&str> = variables.iter().map(AsRef::as_ref).collect();
    Module::new("VariablesToNtuple")
        .named(format!("{}_{list}", file.trim_end_matches(".root")))
        .param("particleList", list)
        .param("variables", variables)
        .param("fileName", remove_jpsi_slash(file))
        .param("treeName", remove_jpsi_slash(tree))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_binnings() {
        assert_eq!(variables_to_binnings(&["mcErrors"]), vec![json!(["mcErrors", 513, -0.5, 512.5])]);
        assert_eq!(variables_to_binnings(&["default"]), vec![json!(["default", 100, -10.0, 10.0])]);
        assert_eq!(
            variables_to_binnings_2d(&[("mcErrors", "default")]),
            vec![json!(["mcErrors", 513, -0.5, 512.5, "default", 100, -10.0, 10.0])]
        );
    }

    #[test]
    fn test_histograms() {
        let module = histograms(
            "D0:abc",
            "Monitor_PreReconstruction_AfterVertex.root",
            "D0:generic ==> K-:generic pi+:generic",
            &["chiProb"],
            &[("chiProb", "isSignal")],
        );
        assert_eq!(module.name, "Monitor_PreReconstruction_AfterVertex_D0:abc");
        assert_eq!(module.params["variables"], json!([["chiProb", 100, 0.0, 1.0]]));
        assert_eq!(module.params["variables_2d"][0][4], json!("isSignal"));
    }

    #[test]
    fn test_mc_particle_counts() {
        let module = mc_particle_counts([211, -211, 11], "Counts", "counts.root");
        assert_eq!(
            module.params["variables"],
            json!([
                ["NumberOfMCParticlesInEvent(11)", 100, -0.5, 99.5],
                ["NumberOfMCParticlesInEvent(211)", 100, -0.5, 99.5]
            ])
        );
    }
}
