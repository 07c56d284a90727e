use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of one extracted block, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptId(String);

impl ScriptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the id from a file written by the extractor. The Blender helper
    /// appends `.py` to every datablock name, so one trailing `.py` is dropped.
    pub fn from_file_name(file_name: &str) -> Self {
        let id = file_name.strip_suffix(".py").unwrap_or(file_name);
        if id.is_empty() {
            Self(file_name.to_string())
        } else {
            Self(id.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedScript {
    pub id: ScriptId,
    pub container_name: String,
    pub block_name: String,
    pub source_text: String,
    pub byte_size: usize,
    pub file_path: PathBuf,
    /// Set when the block was not valid UTF-8 and had to be decoded lossily.
    pub lossy_decoding: bool,
}

impl ExtractedScript {
    pub fn new(
        id: ScriptId,
        container_name: impl Into<String>,
        block_name: impl Into<String>,
        source_text: String,
        file_path: PathBuf,
    ) -> Self {
        Self {
            id,
            container_name: container_name.into(),
            block_name: block_name.into(),
            byte_size: source_text.len(),
            source_text,
            file_path,
            lossy_decoding: false,
        }
    }

    pub fn with_lossy_decoding(mut self, byte_size: usize) -> Self {
        self.lossy_decoding = true;
        self.byte_size = byte_size;
        self
    }

    pub fn line_count(&self) -> usize {
        self.source_text.lines().count()
    }

    pub fn is_blank(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}

/// Catalog of the scripts pulled out of one container, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptInventory {
    container_name: String,
    scripts: Vec<ExtractedScript>,
}

impl ScriptInventory {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            scripts: Vec::new(),
        }
    }

    /// Adds a script; returns `false` and drops it if the id is already taken.
    pub fn insert(&mut self, script: ExtractedScript) -> bool {
        if self.get(&script.id).is_some() {
            return false;
        }
        self.scripts.push(script);
        true
    }

    pub fn get(&self, id: &ScriptId) -> Option<&ExtractedScript> {
        self.scripts.iter().find(|s| &s.id == id)
    }

    pub fn position(&self, id: &ScriptId) -> Option<usize> {
        self.scripts.iter().position(|s| &s.id == id)
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn scripts(&self) -> &[ExtractedScript] {
        &self.scripts
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedScript> {
        self.scripts.iter()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.scripts.iter().map(|s| s.byte_size).sum()
    }
}
