//! Pre cut determination from signal and background histograms.
//!
//! The histograms of every channel of a particle are filled over the same
//! variable. Bins are ranked by their signal to background ratio across all
//! channels, and the best bins are taken until the requested share of the
//! total signal is kept. Every channel then gets the range spanned by its
//! selected bins as cut.

use std::fs;

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::fei::config::PreCutConfig;

/// Summary of the histogram file written by `PreCutHistMaker` for one
/// channel: shared bin edges plus the signal and background content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CutHistogram {
    pub edges: Vec<f64>,
    pub signal: Vec<f64>,
    pub background: Vec<f64>,
}

impl CutHistogram {
    pub fn load(path: &Utf8Path) -> anyhow::Result<Self> {
        let histogram: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        let bins = histogram.edges.len().saturating_sub(1);
        if bins == 0 || histogram.signal.len() != bins || histogram.background.len() != bins {
            anyhow::bail!(
                "Histogram {path} has {} edges, {} signal and {} background bins",
                histogram.edges.len(),
                histogram.signal.len(),
                histogram.background.len()
            );
        }
        Ok(histogram)
    }

    fn bins(&self) -> usize {
        self.signal.len()
    }

    fn ratio(&self, bin: usize) -> f64 {
        match self.background[bin] > 0.0 {
            true => self.signal[bin] / self.background[bin],
            false => f64::INFINITY,
        }
    }
}

/// Cut chosen for one channel, with the expected yields inside the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminedCut {
    pub cut: String,
    pub range: (f64, f64),
    pub signal: f64,
    pub background: f64,
}

/// Determines a common pre cut for the channels of one particle.
///
/// Channels without a selected bin, or whose purity inside the range stays
/// below `config.purity`, are ignored and map to `None`. A non empty user
/// cut is appended to every determined cut.
pub fn calculate_pre_cuts(
    config: &PreCutConfig,
    variable: &str,
    histograms: &[(&str, &CutHistogram)],
) -> IndexMap<String, Option<DeterminedCut>> {
    let total: f64 = histograms.iter().flat_map(|(_, h)| &h.signal).sum();

    let mut ranked: Vec<(f64, f64)> = histograms
        .iter()
        .flat_map(|(_, h)| (0..h.bins()).map(move |bin| (h.ratio(bin), h.signal[bin])))
        .filter(|&(_, signal)| signal > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut threshold = f64::INFINITY;
    let mut kept = 0.0;
    for (ratio, signal) in ranked {
        threshold = ratio;
        kept += signal;
        if kept >= config.efficiency * total {
            break;
        }
    }

    let mut acc = IndexMap::new();
    for (label, histogram) in histograms {
        let selected: Vec<usize> = (0..histogram.bins())
            .filter(|&bin| histogram.signal[bin] > 0.0 && histogram.ratio(bin) >= threshold)
            .collect();

        let cut = match (selected.first(), selected.last()) {
            (Some(&first), Some(&last)) if total > 0.0 => {
                let signal: f64 = histogram.signal[first..=last].iter().sum();
                let background: f64 = histogram.background[first..=last].iter().sum();
                let range = (histogram.edges[first], histogram.edges[last + 1]);

                let purity = signal / (signal + background);
                (purity >= config.purity).then(|| {
                    let mut cut = format!("{} <= {variable} <= {}", range.0, range.1);
                    if !config.user_cut.is_empty() {
                        cut = format!("{cut} and [{}]", config.user_cut);
                    }
                    DeterminedCut {
                        cut,
                        range,
                        signal,
                        background,
                    }
                })
            }
            _ => None,
        };

        if cut.is_none() {
            tracing::info!(channel = %label, "Channel ignored by the pre cut determination");
        }
        acc.insert(label.to_string(), cut);
    }
    acc
}

#[cfg(test)]
mod test {
    use super::*;

    fn histogram(signal: &[f64], background: &[f64]) -> CutHistogram {
        CutHistogram {
            edges: (0..=signal.len()).map(|i| i as f64).collect(),
            signal: signal.to_vec(),
            background: background.to_vec(),
        }
    }

    fn config(efficiency: f64, purity: f64) -> PreCutConfig {
        PreCutConfig {
            variable: Some("M".into()),
            efficiency,
            purity,
            ..PreCutConfig::default()
        }
    }

    #[test]
    fn test_common_ratio_threshold() {
        let peaked = histogram(&[1.0, 8.0, 1.0, 0.0], &[10.0, 2.0, 10.0, 10.0]);
        let flat = histogram(&[2.0, 2.0, 2.0, 2.0], &[1.0, 1.0, 1.0, 1.0]);

        let cuts = calculate_pre_cuts(&config(0.4, 0.0), "M", &[("a", &peaked), ("b", &flat)]);

        // The best bin alone (ratio 4) holds 8 of the 18 signal candidates.
        let a = cuts["a"].as_ref().unwrap();
        assert_eq!(a.range, (1.0, 2.0));
        assert_eq!(a.cut, "1 <= M <= 2");
        assert_eq!(a.signal, 8.0);
        assert!(cuts["b"].is_none());
    }

    #[test]
    fn test_full_efficiency_keeps_every_channel() {
        let peaked = histogram(&[1.0, 8.0, 1.0, 0.0], &[10.0, 2.0, 10.0, 10.0]);
        let flat = histogram(&[2.0, 2.0, 2.0, 2.0], &[1.0, 1.0, 1.0, 1.0]);

        let cuts = calculate_pre_cuts(&config(1.0, 0.0), "M", &[("a", &peaked), ("b", &flat)]);

        assert_eq!(cuts["a"].as_ref().unwrap().range, (0.0, 3.0));
        assert_eq!(cuts["b"].as_ref().unwrap().range, (0.0, 4.0));
    }

    #[test]
    fn test_purity_and_user_cut() {
        let pure = histogram(&[5.0, 5.0], &[0.0, 1.0]);
        let dirty = histogram(&[1.0, 0.0], &[99.0, 0.0]);
        let config = PreCutConfig {
            user_cut: "p > 0.1".into(),
            ..config(1.0, 0.05)
        };

        let cuts = calculate_pre_cuts(&config, "M", &[("pure", &pure), ("dirty", &dirty)]);

        assert_eq!(cuts["pure"].as_ref().unwrap().cut, "0 <= M <= 2 and [p > 0.1]");
        assert!(cuts["dirty"].is_none());
    }

    #[test]
    fn test_no_signal_ignores_everything() {
        let empty = histogram(&[0.0, 0.0], &[3.0, 3.0]);
        let cuts = calculate_pre_cuts(&config(0.9, 0.0), "M", &[("a", &empty)]);
        assert_eq!(cuts.len(), 1);
        assert!(cuts["a"].is_none());
    }

    #[test]
    fn test_load_checks_bins() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("hist.json");

        fs::write(&path, r#"{"edges": [0, 1, 2], "signal": [1, 2], "background": [3, 4]}"#).unwrap();
        assert_eq!(CutHistogram::load(&path).unwrap().signal, vec![1.0, 2.0]);

        fs::write(&path, r#"{"edges": [0, 1], "signal": [1, 2], "background": [3, 4]}"#).unwrap();
        assert!(CutHistogram::load(&path).is_err());
    }
}
