use crate::codec;
use crate::errors::StoreResult;
use crate::models::{NoteIndex, NoteSummary, INDEX_VERSION};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const INDEX_FILE: &str = "index.json";
pub const NOTES_DIR: &str = "Notes";

/// Load the index, rebuilding it from the directory tree when the file is
/// absent, unreadable, or structurally invalid. The filesystem is the ground
/// truth; the index is a cache of it.
pub fn load(root: &Path) -> StoreResult<BTreeMap<String, NoteSummary>> {
    let index_path = root.join(INDEX_FILE);
    match codec::read_index_file(&index_path) {
        Ok(index) => {
            let mut entries = BTreeMap::new();
            for summary in index.notes {
                entries.insert(summary.id.clone(), summary);
            }
            Ok(entries)
        }
        Err(error) => {
            tracing::info!(path = %index_path.display(), error = %error, "index unusable, rebuilding from note files");
            rebuild(root)
        }
    }
}

/// Full rebuild: scan one level of date-named subfolders under `Notes/`,
/// plus legacy flat files directly in it. Corrupt files are excluded rather
/// than aborting the scan. When two files carry the same note id, the one
/// with the newest `updatedAt` wins.
pub fn rebuild(root: &Path) -> StoreResult<BTreeMap<String, NoteSummary>> {
    let mut entries: BTreeMap<String, NoteSummary> = BTreeMap::new();
    let notes_root = root.join(NOTES_DIR);

    if notes_root.is_dir() {
        for entry in fs::read_dir(&notes_root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                let folder = entry.file_name().to_string_lossy().to_string();
                for sub_entry in fs::read_dir(&path)? {
                    let sub_path = sub_entry?.path();
                    collect_note(&sub_path, &format!("{}/{}", NOTES_DIR, folder), &mut entries);
                }
            } else {
                // Legacy flat layout: note files directly under Notes/.
                collect_note(&path, NOTES_DIR, &mut entries);
            }
        }
    }

    persist(root, &entries)?;
    tracing::info!(notes = entries.len(), "index rebuilt");
    Ok(entries)
}

fn collect_note(path: &Path, location_dir: &str, entries: &mut BTreeMap<String, NoteSummary>) {
    if path.extension().and_then(|value| value.to_str()) != Some("json") {
        return;
    }
    let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().to_string()) else {
        return;
    };
    let note = match codec::read_note_file(path) {
        Ok(note) => note,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "skipping unreadable note file");
            return;
        }
    };
    let location = format!("{}/{}", location_dir, file_name);
    let summary = NoteSummary::of(&note, &location);
    let keep_existing = entries
        .get(&note.id)
        .is_some_and(|existing| existing.updated_at >= summary.updated_at);
    if keep_existing {
        tracing::warn!(id = %note.id, location = %location, "duplicate note id, keeping newer copy");
    } else {
        entries.insert(note.id.clone(), summary);
    }
}

pub fn persist(root: &Path, entries: &BTreeMap<String, NoteSummary>) -> StoreResult<()> {
    let index = NoteIndex {
        version: INDEX_VERSION,
        notes: entries.values().cloned().collect(),
    };
    codec::write_index_file(&root.join(INDEX_FILE), &index)
}

/// Insert or replace the entry for `entry.id` and persist the whole index.
pub fn upsert(
    root: &Path,
    entries: &mut BTreeMap<String, NoteSummary>,
    entry: NoteSummary,
) -> StoreResult<()> {
    entries.insert(entry.id.clone(), entry);
    persist(root, entries)
}

/// Drop the entry for `id` if present and persist.
pub fn remove(root: &Path, entries: &mut BTreeMap<String, NoteSummary>, id: &str) -> StoreResult<()> {
    if entries.remove(id).is_some() {
        persist(root, entries)?;
    }
    Ok(())
}
