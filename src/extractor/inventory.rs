use crate::error::ExtractionError;
use crate::models::{ExtractedScript, ScriptId, ScriptInventory};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = ".manifest.json";

/// Block list the Blender helper writes next to the extracted files.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    blocks: Vec<ManifestBlock>,
}

#[derive(Debug, Deserialize)]
struct ManifestBlock {
    name: String,
    file: String,
}

/// Reads every regular, non-hidden file in `dir` into an inventory, ordered by
/// file name. An empty directory yields an empty inventory.
pub fn collect_scripts(dir: &Path, container_name: &str) -> Result<ScriptInventory, ExtractionError> {
    let declared = read_manifest(dir);

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }
        files.push((file_name, entry.path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut inventory = ScriptInventory::new(container_name);
    for (file_name, path) in files {
        let bytes = std::fs::read(&path)?;
        let id = unique_id(&inventory, &file_name);
        let block_name = declared
            .as_ref()
            .and_then(|m| m.get(&file_name).cloned())
            .unwrap_or_else(|| id.to_string());

        let script = match String::from_utf8(bytes) {
            Ok(text) => ExtractedScript::new(id, container_name, block_name, text, path),
            Err(e) => {
                let byte_size = e.as_bytes().len();
                warn!("{} is not valid UTF-8; decoding lossily", file_name);
                let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
                ExtractedScript::new(id, container_name, block_name, text, path)
                    .with_lossy_decoding(byte_size)
            }
        };

        debug!("Inventoried {} ({} bytes)", script.id, script.byte_size);
        inventory.insert(script);
    }

    if let Some(declared) = declared {
        for file in declared.keys() {
            if !dir.join(file).is_file() {
                warn!("Manifest lists {} but no such file was written", file);
            }
        }
    }

    Ok(inventory)
}

/// The file stem, falling back to the full file name and then a numeric
/// suffix when an earlier file already claimed it.
fn unique_id(inventory: &ScriptInventory, file_name: &str) -> ScriptId {
    let stem = ScriptId::from_file_name(file_name);
    if inventory.get(&stem).is_none() {
        return stem;
    }

    let full = ScriptId::new(file_name);
    if inventory.get(&full).is_none() {
        warn!("Script id {} already taken; using {}", stem, full);
        return full;
    }

    let mut n = 2;
    loop {
        let candidate = ScriptId::new(format!("{}#{}", file_name, n));
        if inventory.get(&candidate).is_none() {
            warn!("Script id {} already taken; using {}", stem, candidate);
            return candidate;
        }
        n += 1;
    }
}

fn read_manifest(dir: &Path) -> Option<HashMap<String, String>> {
    let path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&path).ok()?;

    match serde_json::from_str::<Manifest>(&raw) {
        Ok(manifest) => Some(
            manifest
                .blocks
                .into_iter()
                .map(|b| (b.file, b.name))
                .collect(),
        ),
        Err(e) => {
            warn!("Ignoring malformed extractor manifest {}: {}", path.display(), e);
            None
        }
    }
}
