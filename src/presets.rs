//! Named filter presets with JSON import/export.
//!
//! The exchange format is a versioned envelope:
//! `{"version": 1, "exportedAt": <ms since epoch>, "presets": [{id, name, filters}]}`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{EditorError, Result};
use crate::ops::filters::{FilterParam, FilterSettings};

/// Highest envelope version this build understands.
pub const PRESET_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub filters: FilterSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetEnvelope {
    pub version: u32,
    pub exported_at: u64,
    pub presets: Vec<Preset>,
}

/// Outcome of an import.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    /// Records whose id collided and were given a fresh one.
    pub reassigned: usize,
    /// Records with at least one value pulled back into range.
    pub clamped: usize,
}

fn builtin(id: &str, name: &str, values: &[(FilterParam, f32)]) -> Preset {
    let mut filters = FilterSettings::default();
    for &(param, v) in values {
        filters.set(param, v);
    }
    Preset {
        id: id.to_string(),
        name: name.to_string(),
        filters,
    }
}

pub fn builtin_presets() -> Vec<Preset> {
    use FilterParam::*;
    vec![
        builtin("builtin-vivid", "Vivid", &[(Saturation, 140.0), (Contrast, 115.0)]),
        builtin("builtin-vintage", "Vintage", &[(Sepia, 45.0), (Contrast, 90.0), (Brightness, 105.0), (Vignette, 30.0)]),
        builtin("builtin-noir", "Noir", &[(Grayscale, 100.0), (Contrast, 135.0)]),
        builtin("builtin-fade", "Fade", &[(Contrast, 80.0), (Brightness, 110.0), (Saturation, 75.0)]),
        builtin("builtin-crisp", "Crisp", &[(Sharpen, 40.0), (Contrast, 110.0)]),
    ]
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Ordered list of presets.
#[derive(Clone, Debug, Default)]
pub struct PresetStore {
    presets: Vec<Preset>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        Self { presets: builtin_presets() }
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Case-insensitive name lookup.
    pub fn find_by_name(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Store the given filters under `name` and return the new id.
    pub fn save(&mut self, name: &str, filters: &FilterSettings) -> String {
        let mut filters = filters.clone();
        filters.clamp_all();
        let id = Uuid::new_v4().to_string();
        self.presets.push(Preset {
            id: id.clone(),
            name: name.trim().to_string(),
            filters,
        });
        id
    }

    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.presets.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.name = name.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.presets.len();
        self.presets.retain(|p| p.id != id);
        self.presets.len() != before
    }

    pub fn export_json(&self) -> Result<String> {
        let envelope = PresetEnvelope {
            version: PRESET_FORMAT_VERSION,
            exported_at: now_millis(),
            presets: self.presets.clone(),
        };
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    /// Merge presets from an exported envelope. Values are clamped into
    /// range and colliding ids are replaced; nothing is added on error.
    pub fn import_json(&mut self, json: &str) -> Result<ImportReport> {
        let envelope: PresetEnvelope = serde_json::from_str(json)?;
        if envelope.version == 0 || envelope.version > PRESET_FORMAT_VERSION {
            return Err(EditorError::Validation(format!(
                "unsupported preset file version {}",
                envelope.version
            )));
        }

        let mut report = ImportReport::default();
        let mut incoming = Vec::with_capacity(envelope.presets.len());
        for mut preset in envelope.presets {
            if preset.filters.clamp_all() {
                report.clamped += 1;
            }
            let taken = |id: &str| {
                self.presets.iter().any(|p| p.id == id) || incoming.iter().any(|p: &Preset| p.id == id)
            };
            if preset.id.is_empty() || taken(&preset.id) {
                preset.id = Uuid::new_v4().to_string();
                report.reassigned += 1;
            }
            if preset.name.trim().is_empty() {
                preset.name = "Untitled preset".to_string();
            }
            incoming.push(preset);
        }
        report.imported = incoming.len();
        self.presets.extend(incoming);
        Ok(report)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let mut store = Self::new();
        store.import_json(&std::fs::read_to_string(path)?)?;
        Ok(store)
    }

    pub fn save_file(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.export_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_then_import_into_empty_store() {
        let store = PresetStore::with_builtins();
        let json = store.export_json().unwrap();
        assert!(json.contains("\"exportedAt\""));

        let mut other = PresetStore::new();
        let report = other.import_json(&json).unwrap();
        assert_eq!(report.imported, store.list().len());
        assert_eq!(report.reassigned, 0);
        assert_eq!(other.list(), store.list());
    }

    #[test]
    fn colliding_ids_are_reassigned() {
        let mut store = PresetStore::with_builtins();
        let json = store.export_json().unwrap();
        let report = store.import_json(&json).unwrap();
        assert_eq!(report.reassigned, builtin_presets().len());
        assert_eq!(store.list().len(), builtin_presets().len() * 2);
    }

    #[test]
    fn import_clamps_out_of_range_values() {
        let json = r#"{"version":1,"exportedAt":0,"presets":[
            {"id":"x","name":"Hot","filters":{"brightness":900,"sepia":-5}}
        ]}"#;
        let mut store = PresetStore::new();
        let report = store.import_json(json).unwrap();
        assert_eq!(report.clamped, 1);
        let p = store.get("x").unwrap();
        assert_eq!(p.filters.brightness, 200.0);
        assert_eq!(p.filters.sepia, 0.0);
        assert_eq!(p.filters.contrast, 100.0);
    }

    #[test]
    fn future_versions_are_rejected() {
        let json = r#"{"version":9,"exportedAt":0,"presets":[]}"#;
        let mut store = PresetStore::new();
        assert!(matches!(store.import_json(json), Err(EditorError::Validation(_))));
        assert!(store.import_json("{not json").is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn save_rename_remove() {
        let mut store = PresetStore::new();
        let id = store.save(" Mine ", &FilterSettings::default());
        assert_eq!(store.find_by_name("mine").map(|p| p.id.clone()), Some(id.clone()));
        assert!(store.rename(&id, "Yours"));
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
    }
}
