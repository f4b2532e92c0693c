use std::fs;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::TeacherError;
use crate::fei::config::FeiConfig;

/// Classes with fewer expected candidates are not trained.
pub const MINIMUM_SAMPLES: f64 = 500.0;

/// Directory standing in for the condition database.
pub const LOCAL_DB: &str = "localdb";

/// Everything the teacher needs to train the classifier of one channel.
///
/// Written as `{stem}.job` next to the training data by the provider that
/// requests the data, picked up by [`Teacher::do_all_trainings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub label: String,
    pub data: Utf8PathBuf,
    pub weight: Utf8PathBuf,
    pub log: Utf8PathBuf,
    pub tree: String,
    pub method: String,
    pub config: String,
    pub target: String,
    pub variables: Vec<String>,
    /// Expected signal candidates after sampling.
    pub signal: f64,
    /// Expected background candidates after sampling.
    pub background: f64,
}

/// Trains every classifier whose training data exists but whose weight
/// file does not, on a bounded pool of workers.
pub struct Teacher {
    config: FeiConfig,
    workdir: Utf8PathBuf,
}

impl Teacher {
    pub fn new(config: &FeiConfig, workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config: config.clone(),
            workdir: workdir.into(),
        }
    }

    /// Job descriptions found in the working directory, sorted by path.
    pub fn jobs(&self) -> Result<Vec<TrainingJob>, TeacherError> {
        let pattern = format!("{}/*.job", glob::Pattern::escape(self.workdir.as_str()));

        let mut jobs = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            let content = fs::read_to_string(&path)?;
            let job = serde_json::from_str(&content).map_err(|e| TeacherError::Job(path, e))?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    pub fn command(&self, job: &TrainingJob) -> String {
        format!(
            "{teacher} --method '{method}' --target_variable '{target}' --treename '{tree}' \
             --datafile '{data}' --signal_class 1 --variables '{variables}' \
             --identifier '{weight}' {config} > '{log}' 2>&1",
            teacher = self.config.extern_teacher,
            method = job.method,
            target = job.target,
            tree = job.tree,
            data = job.data,
            variables = job.variables.join("' '"),
            weight = job.weight,
            config = job.config,
            log = job.log,
        )
    }

    /// Runs all pending trainings and returns the `(disk, database)` pairs of
    /// every weight file uploaded.
    pub fn do_all_trainings(&self) -> Result<Vec<(Utf8PathBuf, String)>, TeacherError> {
        let mut uploaded = Vec::new();
        let mut pending = Vec::new();

        for job in self.jobs()? {
            if job.weight.exists() {
                continue;
            }
            if !job.data.exists() {
                tracing::warn!(data = %job.data, "Training of MVC failed, couldn't find the training data");
                continue;
            }
            if job.signal < MINIMUM_SAMPLES || job.background < MINIMUM_SAMPLES {
                tracing::warn!(
                    channel = %job.label,
                    signal = job.signal,
                    background = job.background,
                    "Training of MVC failed, too few events. Ignoring channel"
                );
                create_fake_weightfile(&job.weight, &job.label)?;
                uploaded.push(self.upload(&job)?);
                continue;
            }
            pending.push(job);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()?;

        let span = tracing::span!(Level::INFO, "training");
        span.pb_set_length(pending.len() as u64);
        span.pb_set_style(&crate::utils::get_style_bar()?);
        span.pb_set_message("Training classifiers...");
        let _enter = span.enter();

        let results: Vec<_> = pool.install(|| {
            pending
                .par_iter()
                .map(|job| {
                    let command = self.command(job);
                    tracing::info!(channel = %job.label, %command, "Invoking teacher");
                    let status = Command::new("sh").arg("-c").arg(&command).status();
                    span.pb_inc(1);
                    (job, status)
                })
                .collect()
        });

        for (job, status) in results {
            match status {
                Ok(status) if !status.success() => {
                    tracing::warn!(channel = %job.label, %status, "Teacher exited with an error")
                }
                Err(e) => tracing::warn!(channel = %job.label, "Couldn't invoke teacher: {e}"),
                Ok(_) => {}
            }
            if !job.weight.exists() {
                tracing::warn!(log = %job.log, "Training of MVC failed for unknown reasons, check the logfile");
                create_fake_weightfile(&job.weight, &job.label)?;
            }
            uploaded.push(self.upload(job)?);
        }

        Ok(uploaded)
    }

    /// Copies the weight file into the local database as `{prefix}_{label}`.
    pub fn upload(&self, job: &TrainingJob) -> Result<(Utf8PathBuf, String), TeacherError> {
        let identifier = format!("{}_{}", self.config.prefix, job.label);
        let dir = self.workdir.join(LOCAL_DB);
        fs::create_dir_all(&dir)?;
        fs::copy(&job.weight, dir.join(format!("{identifier}.xml")))?;
        Ok((job.weight.clone(), identifier))
    }
}

/// Writes a weight file of the trivial method, which always returns zero.
pub fn create_fake_weightfile(path: &Utf8Path, label: &str) -> std::io::Result<()> {
    let content = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<method>Trivial</method>
<weightfile>{label}.xml</weightfile>
<treename>tree</treename>
<target_variable>isSignal</target_variable>
<weight_variable>__weight__</weight_variable>
<signal_class>1</signal_class>
<max_events>0</max_events>
<number_feature_variables>1</number_feature_variables>
<variable0>M</variable0>
<number_spectator_variables>0</number_spectator_variables>
<number_data_files>1</number_data_files>
<datafile0>train.root</datafile0>
<Trivial_version>1</Trivial_version>
<Trivial_output>0</Trivial_output>
<signal_fraction>0.066082567</signal_fraction>
"#
    );
    fs::write(path, content)
}

/// True for weight files of the trivial method. Unreadable files count as
/// fake.
pub fn is_fake_weightfile(path: &Utf8Path) -> bool {
    fs::read_to_string(path)
        .map(|content| content.lines().any(|l| l.trim() == "<method>Trivial</method>"))
        .unwrap_or(true)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fake_weightfile() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let fake = dir.join("fake.xml");
        create_fake_weightfile(&fake, "pi+:generic ==> pi+:FSP").unwrap();
        assert!(is_fake_weightfile(&fake));

        let real = dir.join("real.xml");
        fs::write(&real, "<method>FastBDT</method>\n").unwrap();
        assert!(!is_fake_weightfile(&real));

        assert!(is_fake_weightfile(&dir.join("missing.xml")));
    }

    #[test]
    fn test_command() {
        let teacher = Teacher::new(&FeiConfig::default(), "work");
        let job = TrainingJob {
            label: "pi0:generic ==> gamma:generic gamma:generic".into(),
            data: "work/pi0.root".into(),
            weight: "work/pi0_FastBDT.xml".into(),
            log: "work/pi0.log".into(),
            tree: "pi0:generic ==> gamma:generic gamma:generic variables".into(),
            method: "FastBDT".into(),
            config: "--nTrees 100".into(),
            target: "isSignal".into(),
            variables: vec!["M".into(), "daughter(0, E)".into()],
            signal: 1e4,
            background: 1e5,
        };

        assert_eq!(
            teacher.command(&job),
            "basf2_mva_teacher --method 'FastBDT' --target_variable 'isSignal' \
             --treename 'pi0:generic ==> gamma:generic gamma:generic variables' \
             --datafile 'work/pi0.root' --signal_class 1 --variables 'M' 'daughter(0, E)' \
             --identifier 'work/pi0_FastBDT.xml' --nTrees 100 > 'work/pi0.log' 2>&1"
        );
    }
}
