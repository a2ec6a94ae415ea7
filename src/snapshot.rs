//! Files written while a run progresses: JSON world snapshots every few years
//! and the per-location captive age dump.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;
use crate::world::{World, WorldSnapshot};

pub struct SnapshotWriter {
    dir: PathBuf,
    interval_years: u32,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_years: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_years,
        }
    }

    /// Write `snapshot` to `<dir>/<scenario>/year_<year>.json` when
    /// `completed_years` lands on the interval. An interval of 0 disables it.
    pub fn maybe_write(
        &self,
        snapshot: &WorldSnapshot,
        completed_years: u32,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if self.interval_years == 0 || completed_years % self.interval_years != 0 {
            return Ok(None);
        }
        let dir = self.dir.join(&snapshot.scenario);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("year_{}.json", snapshot.year));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)?;
        Ok(Some(path))
    }
}

/// Writes `Ages<Name><year>.data`: one line per current captive of a
/// location, holding that captive's integer age.
pub struct AgeDump {
    dir: PathBuf,
}

impl AgeDump {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and remove any files left by an earlier run.
    pub fn prepare(&self) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn write_year(&self, world: &World) -> Result<Vec<PathBuf>, SnapshotError> {
        let year = world.year();
        let mut written = Vec::with_capacity(world.locations().len());
        for location in world.locations() {
            let path = self.dir.join(age_file_name(location.name(), year));
            let mut out = BufWriter::new(File::create(&path)?);
            for id in location.captives() {
                if let Some(victim) = world.victim(*id) {
                    writeln!(out, "{}", victim.age(year))?;
                }
            }
            out.flush()?;
            written.push(path);
        }
        Ok(written)
    }
}

pub fn age_file_name(location: &str, year: i32) -> String {
    let compact: String = location.chars().filter(|c| !c.is_whitespace()).collect();
    format!("Ages{compact}{year}.data")
}
