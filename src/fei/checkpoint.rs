use std::fs;
use std::io::{BufReader, BufWriter};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PersistError;
use crate::fei::config::{FeiConfig, Particle};

pub const SUMMARY: &str = "Summary.cbor";

const BACKUPS: usize = 9;

/// The `(particles, configuration)` pair of the last pass, persisted in the
/// working directory so that the next pass can resume at the right stage.
#[derive(Debug)]
pub struct Checkpoint {
    path: Utf8PathBuf,
}

impl Checkpoint {
    pub fn new(workdir: &Utf8Path) -> Self {
        Self {
            path: workdir.join(SUMMARY),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<(Vec<Particle>, FeiConfig), PersistError> {
        let reader = BufReader::new(fs::File::open(&self.path)?);
        Ok(ciborium::from_reader(reader)?)
    }

    /// Writes the checkpoint with the given cache level, after rotating the
    /// previous files into `Summary.cbor.backup_0` ... `backup_9`.
    pub fn save(
        &self,
        particles: &[Particle],
        config: &FeiConfig,
        cache: i32,
    ) -> Result<(), PersistError> {
        let config = FeiConfig {
            cache: Some(cache),
            ..config.clone()
        };

        for i in (0..BACKUPS).rev() {
            let backup = self.backup(i);
            if backup.is_file() {
                fs::copy(&backup, self.backup(i + 1))?;
            }
        }
        if self.exists() {
            fs::copy(&self.path, self.backup(0))?;
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(fs::File::create(&self.path)?);
        ciborium::into_writer(&(particles, &config), writer)?;
        Ok(())
    }

    pub fn backup(&self, i: usize) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.backup_{i}", self.path))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fei::config::MvaConfig;

    #[test]
    fn test_round_trip_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = Utf8Path::from_path(dir.path()).unwrap();
        let checkpoint = Checkpoint::new(workdir);

        let mut d0 = Particle::new("D0", MvaConfig::default());
        d0.add_channel(["K-", "pi+"], None, None).unwrap();
        let particles = vec![Particle::new("pi+", MvaConfig::default()), d0];
        let config = FeiConfig {
            prefix: "FEI_CHECKPOINT".into(),
            ..FeiConfig::default()
        };

        checkpoint.save(&particles, &config, 0).unwrap();
        checkpoint.save(&particles, &config, 1).unwrap();
        checkpoint.save(&particles, &config, 2).unwrap();

        let (loaded, loaded_config) = checkpoint.load().unwrap();
        assert_eq!(loaded, particles);
        assert_eq!(loaded_config.cache, Some(2));
        assert_eq!(loaded_config.prefix, "FEI_CHECKPOINT");

        assert!(checkpoint.backup(0).is_file());
        assert!(checkpoint.backup(1).is_file());
        assert!(!checkpoint.backup(2).is_file());
    }
}
