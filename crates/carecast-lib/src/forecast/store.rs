//! Model persistence
//!
//! `JsonModelStore` writes every snapshot into its own `snapshot-*`
//! directory, one JSON artifact per forecast model. The `metadata.json`
//! index at the store root names that directory and carries the feature
//! schema and a SHA-256 checksum for every artifact. The index is replaced
//! by an atomic rename once all artifacts are on disk, so a reader sees
//! either the previous snapshot or the new one.
//!
//! After the switch, snapshot directories other than the new one and the
//! one it replaced are removed.

use super::features::FeatureSchema;
use super::registry::{ForecastModel, RegistrySnapshot};
use crate::error::{Error, Result};
use crate::models::Resource;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Index file name inside the model directory
pub const METADATA_FILE: &str = "metadata.json";

/// Prefix of per-snapshot artifact directories
pub const SNAPSHOT_DIR_PREFIX: &str = "snapshot-";

/// Persistence collaborator for registry snapshots
pub trait ModelStore<M> {
    fn save(&self, snapshot: &RegistrySnapshot<M>) -> Result<()>;
    fn load(&self) -> Result<RegistrySnapshot<M>>;
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub version: String,
    pub trained_at: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
    /// Snapshot directory relative to the store root; absent for artifacts
    /// written directly into the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<String>,
    pub feature_columns: FeatureSchema,
    pub target_columns: Vec<Resource>,
    pub model_names: Vec<String>,
    pub checksums: BTreeMap<String, String>,
}

/// Directory-backed JSON model store
#[derive(Debug, Clone)]
pub struct JsonModelStore {
    dir: PathBuf,
    save_lock: Arc<Mutex<()>>,
}

impl JsonModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True if the directory holds a metadata index
    pub fn exists(&self) -> bool {
        self.dir.join(METADATA_FILE).is_file()
    }

    pub fn read_metadata(&self) -> Result<StoreMetadata> {
        let path = self.dir.join(METADATA_FILE);
        let bytes = fs::read(&path)
            .map_err(|e| Error::persistence(format!("Failed to read {}", path.display()), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::persistence(format!("Failed to parse {}", path.display()), e))
    }

    /// Directory holding the artifacts `metadata` refers to
    pub fn snapshot_dir(&self, metadata: &StoreMetadata) -> Result<PathBuf> {
        let Some(name) = &metadata.artifact_dir else {
            return Ok(self.dir.clone());
        };
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(name)),
            _ => Err(Error::Persistence(format!(
                "Invalid artifact directory {:?} in {}",
                name, METADATA_FILE
            ))),
        }
    }

    /// Path of the artifact for model `name` under `metadata`
    pub fn artifact_path(&self, metadata: &StoreMetadata, name: &str) -> Result<PathBuf> {
        Ok(self.snapshot_dir(metadata)?.join(format!("{}.json", name)))
    }

    /// Remove snapshot directories not named in `keep`. Failures are logged;
    /// the index already points at a complete snapshot.
    fn prune(&self, keep: &[&str]) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Snapshot pruning skipped");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(SNAPSHOT_DIR_PREFIX) || keep.contains(&name.as_str()) {
                continue;
            }
            if !entry.path().is_dir() {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!(snapshot = %name, "Old snapshot directory removed"),
                Err(e) => warn!(snapshot = %name, error = %e, "Failed to remove old snapshot"),
            }
        }
    }
}

impl<M: Serialize + DeserializeOwned + Clone> ModelStore<M> for JsonModelStore {
    fn save(&self, snapshot: &RegistrySnapshot<M>) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let saved_at = Utc::now();
        let tag: String = snapshot
            .version
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let dir_name = format!(
            "{}{}-{}-{}",
            SNAPSHOT_DIR_PREFIX,
            tag,
            saved_at.timestamp_micros(),
            std::process::id()
        );
        let snapshot_dir = self.dir.join(&dir_name);
        fs::create_dir_all(&snapshot_dir).map_err(|e| {
            Error::persistence(
                format!("Failed to create model directory {}", snapshot_dir.display()),
                e,
            )
        })?;

        let mut checksums = BTreeMap::new();
        let mut model_names = Vec::with_capacity(snapshot.len());
        for (key, model) in &snapshot.models {
            let name = key.name();
            let bytes = serde_json::to_vec_pretty(model)
                .map_err(|e| Error::persistence(format!("Failed to serialize {}", name), e))?;
            write_atomic(&snapshot_dir.join(format!("{}.json", name)), &bytes)?;
            checksums.insert(name.clone(), compute_checksum(&bytes));
            model_names.push(name);
        }

        let previous = self.read_metadata().ok().and_then(|m| m.artifact_dir);
        let metadata = StoreMetadata {
            version: snapshot.version.clone(),
            trained_at: snapshot.trained_at,
            saved_at,
            artifact_dir: Some(dir_name.clone()),
            feature_columns: snapshot.schema.clone(),
            target_columns: snapshot.targets.clone(),
            model_names,
            checksums,
        };
        let bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| Error::persistence("Failed to serialize metadata", e))?;
        write_atomic(&self.dir.join(METADATA_FILE), &bytes)?;

        let mut keep = vec![dir_name.as_str()];
        if let Some(previous) = previous.as_deref() {
            keep.push(previous);
        }
        self.prune(&keep);

        info!(
            dir = %snapshot_dir.display(),
            version = %metadata.version,
            models = metadata.model_names.len(),
            "Forecast models saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<RegistrySnapshot<M>> {
        let metadata = self.read_metadata()?;
        let mut models = BTreeMap::new();

        for name in &metadata.model_names {
            let path = self.artifact_path(&metadata, name)?;
            let bytes = fs::read(&path).map_err(|e| {
                Error::persistence(format!("Failed to read model artifact {}", path.display()), e)
            })?;

            let expected = metadata.checksums.get(name).ok_or_else(|| {
                Error::Persistence(format!("No checksum recorded for model {}", name))
            })?;
            let computed = compute_checksum(&bytes);
            if &computed != expected {
                return Err(Error::Persistence(format!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    name, expected, computed
                )));
            }

            let model: ForecastModel<M> = serde_json::from_slice(&bytes)
                .map_err(|e| Error::persistence(format!("Failed to parse {}", name), e))?;
            if &model.key.name() != name {
                return Err(Error::Persistence(format!(
                    "Artifact {} contains model {}",
                    name,
                    model.key.name()
                )));
            }
            debug!(model = %name, checksum = %computed, "Model artifact validated");
            models.insert(model.key, model);
        }

        Ok(RegistrySnapshot {
            version: metadata.version,
            trained_at: metadata.trained_at,
            schema: metadata.feature_columns,
            targets: metadata.target_columns,
            models,
        })
    }
}

/// Write to `<path>.tmp`, sync, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path).map_err(|e| {
        Error::persistence(format!("Failed to create temp file {}", temp_path.display()), e)
    })?;
    file.write_all(bytes)
        .map_err(|e| Error::persistence("Failed to write artifact", e))?;
    file.sync_all()
        .map_err(|e| Error::persistence("Failed to sync artifact", e))?;

    fs::rename(&temp_path, path).map_err(|e| {
        Error::persistence(
            format!("Failed to rename {} to {}", temp_path.display(), path.display()),
            e,
        )
    })
}

/// SHA256 checksum of data, hex encoded
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
