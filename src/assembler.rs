//! Merges task outcomes into the final document and persists it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::MobilityError;
use crate::generator::SectionValue;
use crate::sections::SectionSpec;
use crate::state_machine::TaskOutcome;

/// Timestamp format of `generated_at`; sorts lexically.
pub const GENERATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Completion accounting written under the `metadata` key.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub completion_percentage: f64,
    pub missing_sections: Vec<String>,
    pub generated_at: String,
    pub incomplete: bool,
}

/// The assembled research document: every section in catalog order, then metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    sections: Vec<(String, SectionValue)>,
    metadata: DocumentMetadata,
}

impl Document {
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn section(&self, key: &str) -> Option<&SectionValue> {
        self.sections.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn section_keys(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_partial(&self) -> bool {
        self.metadata.incomplete
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Artifact name for `measure`, with the `-partial` marker when incomplete.
    pub fn file_name(&self, measure: &str) -> String {
        let marker = if self.is_partial() { "-partial" } else { "" };
        format!("{}-mobility-measure{marker}.json", slugify(measure))
    }

    /// Write the document under `dir`, creating it if needed.
    pub fn persist(&self, dir: &Path, measure: &str) -> Result<PathBuf, MobilityError> {
        fs::create_dir_all(dir).map_err(|source| MobilityError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(self.file_name(measure));
        let json = self.to_json_pretty()?;
        fs::write(&path, json).map_err(|source| MobilityError::Write {
            path: path.clone(),
            source,
        })?;
        if self.is_partial() {
            warn!(path = %path.display(), missing = self.metadata.missing_sections.len(), "partial document written");
        } else {
            info!(path = %path.display(), "document written");
        }
        Ok(path)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len() + 1))?;
        for (key, value) in &self.sections {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("metadata", &self.metadata)?;
        map.end()
    }
}

/// Lowercase, with spaces and slashes turned into dashes.
pub fn slugify(measure: &str) -> String {
    measure.trim().to_lowercase().replace([' ', '/'], "-")
}

/// `100 * succeeded / total`, rounded to one decimal. An empty catalog is complete.
pub fn completion_percentage(succeeded: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (1000.0 * succeeded as f64 / total as f64).round() / 10.0
}

pub fn assemble(outcomes: &HashMap<String, TaskOutcome>, specs: &[SectionSpec]) -> Document {
    assemble_at(outcomes, specs, Utc::now())
}

/// Build the document in `specs` order. A spec with a failed or absent outcome
/// gets an empty object and is listed in `missing_sections`.
pub fn assemble_at(
    outcomes: &HashMap<String, TaskOutcome>,
    specs: &[SectionSpec],
    now: DateTime<Utc>,
) -> Document {
    let mut sections = Vec::with_capacity(specs.len());
    let mut missing_sections = Vec::new();

    for spec in specs {
        match outcomes.get(&spec.key).and_then(TaskOutcome::value) {
            Some(value) => sections.push((spec.key.clone(), value.clone())),
            None => {
                sections.push((spec.key.clone(), Value::Object(Map::new())));
                missing_sections.push(spec.key.clone());
            }
        }
    }

    let succeeded = specs.len() - missing_sections.len();
    let metadata = DocumentMetadata {
        completion_percentage: completion_percentage(succeeded, specs.len()),
        incomplete: !missing_sections.is_empty(),
        missing_sections,
        generated_at: now.format(GENERATED_AT_FORMAT).to_string(),
    };
    Document { sections, metadata }
}
