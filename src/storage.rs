use anyhow::{anyhow, Result};
use log::warn;
use std::{
    fs::{self, File},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::models::{Preferences, ScoreEntry, Theme};

/// Inserts `entry` into a descending leaderboard and keeps the best `capacity`.
/// Equal scores keep their insertion order.
pub fn rank(mut entries: Vec<ScoreEntry>, entry: ScoreEntry, capacity: usize) -> Vec<ScoreEntry> {
    entries.push(entry);
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries.truncate(capacity);
    entries
}

/// High scores kept in a headerless `score,total,date` CSV file.
#[derive(Clone, Debug)]
pub struct ScoreBoard {
    path: Arc<Mutex<PathBuf>>,
    capacity: usize,
}

impl ScoreBoard {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> ScoreBoard {
        ScoreBoard {
            path: Arc::new(Mutex::new(path.into())),
            capacity,
        }
    }

    /// The current leaderboard. A missing or unreadable file reads as empty.
    pub fn entries(&self) -> Vec<ScoreEntry> {
        match self.path.lock() {
            Ok(path) => read_entries(&path),
            Err(_err) => Vec::new(),
        }
    }

    pub fn record(&self, entry: ScoreEntry) -> Result<Vec<ScoreEntry>> {
        let path = self
            .path
            .lock()
            .map_err(|_err| anyhow!("couldn't lock score board"))?;

        let entries = rank(read_entries(&path), entry, self.capacity);

        let staging = staging_path(&path);
        if let Err(err) = write_entries(&staging, &entries) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::rename(&staging, &*path)?;

        Ok(entries)
    }

    pub fn clear(&self) -> Result<()> {
        let path = self
            .path
            .lock()
            .map_err(|_err| anyhow!("couldn't lock score board"))?;

        match fs::remove_file(&*path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// The board is written next to itself and renamed into place, so a failed
/// write leaves the previous scores untouched.
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

fn write_entries(path: &Path, entries: &[ScoreEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_entries(path: &Path) -> Vec<ScoreEntry> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!("couldn't open score board {}: {}", path.display(), err);
            return Vec::new();
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);

    reader
        .deserialize()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable score entry: {}", err);
                None
            }
        })
        .collect()
}

/// Theme preference kept in a small TOML file.
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: Arc<PathBuf>,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> PreferenceStore {
        PreferenceStore {
            path: Arc::new(path.into()),
        }
    }

    pub fn load(&self) -> Preferences {
        let contents = match fs::read_to_string(&*self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Preferences::default(),
            Err(err) => {
                warn!("couldn't read preferences {}: {}", self.path.display(), err);
                return Preferences::default();
            }
        };

        toml::from_str(&contents).unwrap_or_else(|err| {
            warn!("ignoring malformed preferences {}: {}", self.path.display(), err);
            Preferences::default()
        })
    }

    pub fn save(&self, preferences: &Preferences) -> Result<()> {
        let contents = toml::to_string(preferences)?;
        fs::write(&*self.path, contents)?;
        Ok(())
    }

    pub fn theme(&self) -> Theme {
        self.load().theme
    }
}
