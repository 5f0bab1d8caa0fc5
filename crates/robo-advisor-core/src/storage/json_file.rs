use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use super::PortfolioRepository;
use crate::error::AdvisorError;
use crate::portfolio::Portfolio;
use crate::AdvisorResult;

/// One pretty-printed JSON file per portfolio, named `<id>.json`.
///
/// Writes go to a temporary file that is renamed over the target. The
/// version check and the write happen under one lock, so a single process
/// never loses an update.
#[derive(Debug)]
pub struct JsonFileRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn open(dir: impl AsRef<Path>) -> AdvisorResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids are UUIDs; anything else cannot name a stored file.
    fn path_for(&self, id: &str) -> AdvisorResult<PathBuf> {
        let parsed = Uuid::parse_str(id).map_err(|_| AdvisorError::not_found("Portfolio", id))?;
        Ok(self.dir.join(format!("{}.json", parsed.hyphenated())))
    }

    fn read(&self, path: &Path, id: &str) -> AdvisorResult<Portfolio> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AdvisorError::not_found("Portfolio", id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, path: &Path, portfolio: &Portfolio) -> AdvisorResult<()> {
        let json = serde_json::to_string_pretty(portfolio)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn lock(&self) -> AdvisorResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AdvisorError::Storage("store lock poisoned".into()))
    }
}

impl PortfolioRepository for JsonFileRepository {
    fn get(&self, id: &str) -> AdvisorResult<Portfolio> {
        let path = self.path_for(id)?;
        self.read(&path, id)
    }

    fn list(&self) -> AdvisorResult<Vec<Portfolio>> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<Portfolio>(&text) {
                Ok(p) => all.push(p),
                Err(e) => log::warn!("skipping unreadable portfolio file {}: {e}", path.display()),
            }
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn insert(&self, mut portfolio: Portfolio) -> AdvisorResult<Portfolio> {
        let path = self.path_for(&portfolio.id)?;
        let _guard = self.lock()?;
        if path.exists() {
            let existing = self.read(&path, &portfolio.id)?;
            return Err(AdvisorError::Conflict {
                id: portfolio.id,
                expected: 0,
                found: existing.version,
            });
        }
        portfolio.version = 1;
        self.write(&path, &portfolio)?;
        Ok(portfolio)
    }

    fn update(&self, mut portfolio: Portfolio, expected_version: u64) -> AdvisorResult<Portfolio> {
        let path = self.path_for(&portfolio.id)?;
        let _guard = self.lock()?;
        let stored = self.read(&path, &portfolio.id)?;
        if stored.version != expected_version {
            return Err(AdvisorError::Conflict {
                id: portfolio.id,
                expected: expected_version,
                found: stored.version,
            });
        }
        portfolio.version = expected_version + 1;
        self.write(&path, &portfolio)?;
        Ok(portfolio)
    }
}
