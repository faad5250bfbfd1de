use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use roverlink_frame::MotorId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MappingError;

/// Which physical motors drive the left and right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MotorMapping {
    pub left: MotorId,
    pub right: MotorId,
    /// Swap FORWARD/BACKWARD for the left side.
    pub left_reversed: bool,
    pub right_reversed: bool,
}

impl Default for MotorMapping {
    fn default() -> Self {
        Self {
            left: MotorId::M3,
            right: MotorId::M4,
            left_reversed: false,
            right_reversed: false,
        }
    }
}

impl MotorMapping {
    pub fn new(left: MotorId, right: MotorId) -> Result<Self, MappingError> {
        let mapping = Self {
            left,
            right,
            ..Self::default()
        };
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn with_reversed(mut self, left_reversed: bool, right_reversed: bool) -> Self {
        self.left_reversed = left_reversed;
        self.right_reversed = right_reversed;
        self
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        if self.left == self.right {
            return Err(MappingError::SameMotor(self.left));
        }
        Ok(())
    }
}

/// Persistence collaborator for the motor mapping.
pub trait MappingStore: Send + Sync {
    /// The stored mapping, or the default when nothing usable is stored.
    fn load(&self) -> MotorMapping;

    fn save(&self, mapping: &MotorMapping) -> Result<(), MappingError>;
}

/// Stores the mapping as a small JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<MotorMapping>, MappingError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MappingError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mapping: MotorMapping = serde_json::from_slice(&raw)?;
        mapping.validate()?;
        Ok(Some(mapping))
    }
}

impl MappingStore for JsonFileStore {
    fn load(&self) -> MotorMapping {
        match self.read() {
            Ok(Some(mapping)) => {
                debug!(path = %self.path.display(), ?mapping, "motor mapping loaded");
                mapping
            }
            Ok(None) => MotorMapping::default(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring stored motor mapping");
                MotorMapping::default()
            }
        }
    }

    fn save(&self, mapping: &MotorMapping) -> Result<(), MappingError> {
        mapping.validate()?;
        let io_err = |source| MappingError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(mapping)?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        info!(path = %self.path.display(), left = %mapping.left, right = %mapping.right, "motor mapping saved");
        Ok(())
    }
}

/// Keeps the mapping in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mapping: Mutex<Option<MotorMapping>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved mapping, if any.
    pub fn saved(&self) -> Option<MotorMapping> {
        *self.mapping.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MappingStore for MemoryStore {
    fn load(&self) -> MotorMapping {
        self.saved().unwrap_or_default()
    }

    fn save(&self, mapping: &MotorMapping) -> Result<(), MappingError> {
        mapping.validate()?;
        *self.mapping.lock().unwrap_or_else(PoisonError::into_inner) = Some(*mapping);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!(
                "roverlink-mapping-{}-{}",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .expect("time should be after epoch")
                    .as_nanos()
            ))
            .join(name)
    }

    #[test]
    fn wire_names_are_camel_case() {
        let mapping = MotorMapping::new(MotorId::M1, MotorId::M2)
            .expect("valid mapping")
            .with_reversed(true, false);
        let json = serde_json::to_value(mapping).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"left": 1, "right": 2, "leftReversed": true, "rightReversed": false})
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let mapping: MotorMapping = serde_json::from_str(r#"{"left":2}"#).expect("parse");
        assert_eq!(mapping.left, MotorId::M2);
        assert_eq!(mapping.right, MotorId::M4);
        assert!(!mapping.left_reversed);
    }

    #[test]
    fn out_of_range_motor_rejected() {
        assert!(serde_json::from_str::<MotorMapping>(r#"{"left":7,"right":4}"#).is_err());
    }

    #[test]
    fn same_motor_rejected() {
        assert!(matches!(
            MotorMapping::new(MotorId::M3, MotorId::M3),
            Err(MappingError::SameMotor(MotorId::M3))
        ));
    }

    #[test]
    fn json_store_round_trip() {
        let path = temp_path("mapping.json");
        let store = JsonFileStore::new(&path);
        assert_eq!(store.load(), MotorMapping::default());

        let mapping = MotorMapping::new(MotorId::M1, MotorId::M2)
            .expect("valid mapping")
            .with_reversed(false, true);
        store.save(&mapping).expect("save should succeed");
        assert_eq!(JsonFileStore::new(&path).load(), mapping);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn json_store_ignores_garbage() {
        let path = temp_path("garbage.json");
        std::fs::create_dir_all(path.parent().expect("has parent")).expect("temp dir");
        std::fs::write(&path, b"{not json").expect("write garbage");

        assert_eq!(JsonFileStore::new(&path).load(), MotorMapping::default());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn memory_store_rejects_invalid() {
        let store = MemoryStore::new();
        let bad = MotorMapping {
            left: MotorId::M1,
            right: MotorId::M1,
            ..MotorMapping::default()
        };
        assert!(store.save(&bad).is_err());
        assert!(store.saved().is_none());
    }
}
