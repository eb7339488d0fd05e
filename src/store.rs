use crate::codec;
use crate::directory::DirectoryAccess;
use crate::errors::{StoreError, StoreResult};
use crate::index::{self, NOTES_DIR};
use crate::models::{CreateNoteRequest, Note, NoteSummary, Section, SectionKind};
use crate::tags;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

const DEFAULT_TITLE: &str = "New Note";
const IMAGE_PLACEHOLDER: &str = "Image";
const DEFAULT_CODE_LANGUAGE: &str = "javascript";

/// The service boundary the UI layer talks to. One instance owns the
/// directory handle, the in-memory index cache, and a per-note lock map so
/// overlapping mutations of the same note apply in issue order instead of
/// interleaving their read-modify-write cycles.
pub struct NoteStore {
    directory: DirectoryAccess,
    index_cache: Mutex<Option<BTreeMap<String, NoteSummary>>>,
    note_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    // tags.txt is a read-modify-write file shared by every note; its writes
    // get their own lock since the per-note locks cannot cover it.
    registry_lock: Mutex<()>,
}

impl NoteStore {
    pub fn new(state_path: PathBuf) -> Self {
        Self::with_directory(DirectoryAccess::new(state_path))
    }

    pub fn with_directory(directory: DirectoryAccess) -> Self {
        Self {
            directory,
            index_cache: Mutex::new(None),
            note_locks: Mutex::new(HashMap::new()),
            registry_lock: Mutex::new(()),
        }
    }

    pub async fn select_directory(&self, path: &Path) -> StoreResult<PathBuf> {
        let root = self.directory.select_directory(path)?;
        // Fresh root, stale cache.
        *self.index_cache.lock().await = None;
        Ok(root)
    }

    pub fn has_selected_directory(&self) -> bool {
        self.directory.has_selected_directory()
    }

    pub fn directory_display_name(&self) -> Option<String> {
        self.directory.display_name()
    }

    pub fn subscribe_directory(&self) -> watch::Receiver<Option<PathBuf>> {
        self.directory.subscribe()
    }

    pub async fn create_note(&self, request: CreateNoteRequest) -> StoreResult<Note> {
        let root = self.root()?;
        let now = Utc::now();
        let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let title = request
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let mut note_tags: Vec<String> = Vec::new();
        for tag in request.tags.unwrap_or_default() {
            let tag = tags::normalize_tag(&tag);
            if !tag.is_empty() && !note_tags.contains(&tag) {
                note_tags.push(tag);
            }
        }

        // The date folder is fixed at creation time for the note's lifetime;
        // later edits never move the file, even across a day boundary.
        let location = format!("{}/{}/{}.json", NOTES_DIR, now.format("%Y-%m-%d"), id);
        let mut note = Note {
            id,
            title,
            tags: note_tags,
            sections: request.sections.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            location: None,
        };

        codec::write_note_file(&root.join(&location), &note)?;

        let mut cache = self.index_cache.lock().await;
        let entries = ensure_index(&mut cache, &root)?;
        index::upsert(&root, entries, NoteSummary::of(&note, &location))?;
        note.location = Some(location);
        tracing::debug!(id = %note.id, "note created");
        Ok(note)
    }

    pub async fn get_note(&self, id: &str) -> StoreResult<Note> {
        let root = self.root()?;
        let mut cache = self.index_cache.lock().await;
        let entries = ensure_index(&mut cache, &root)?;
        let location = entries
            .get(id)
            .map(|entry| entry.location.clone())
            .ok_or_else(|| StoreError::NoteNotFound(id.to_string()))?;
        read_indexed_note(&root, id, &location)
    }

    /// Summaries straight from the index cache; note file contents are never
    /// touched here, which is why every mutation keeps the cache in sync.
    pub async fn list_notes(&self, search: Option<&str>) -> StoreResult<Vec<NoteSummary>> {
        let root = self.root()?;
        let mut cache = self.index_cache.lock().await;
        let entries = ensure_index(&mut cache, &root)?;

        let term = search.map(|term| term.trim().to_lowercase()).filter(|term| !term.is_empty());
        let mut summaries: Vec<NoteSummary> = entries
            .values()
            .filter(|summary| match term.as_deref() {
                None => true,
                Some(term) => {
                    summary.title.to_lowercase().contains(term)
                        || summary.tags.iter().any(|tag| tag.contains(term))
                }
            })
            .cloned()
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    pub async fn update_title(&self, id: &str, title: &str) -> StoreResult<Note> {
        let title = title.to_string();
        self.mutate_note(id, move |note| {
            note.title = title;
            Ok(true)
        })
        .await
    }

    /// Adding a tag the note already carries (case-insensitively) is a no-op.
    /// New tags are also recorded in the directory's tag registry.
    pub async fn add_tag(&self, id: &str, tag: &str) -> StoreResult<Note> {
        let normalized = tags::normalize_tag(tag);
        let apply = {
            let normalized = normalized.clone();
            move |note: &mut Note| {
                if normalized.is_empty() || note.tags.contains(&normalized) {
                    return Ok(false);
                }
                note.tags.push(normalized);
                Ok(true)
            }
        };
        let note = self.mutate_note(id, apply).await?;
        if note.tags.contains(&normalized) {
            let _registry = self.registry_lock.lock().await;
            tags::add_tag(&self.root()?, &normalized)?;
        }
        Ok(note)
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> StoreResult<Note> {
        let normalized = tags::normalize_tag(tag);
        self.mutate_note(id, move |note| {
            let before = note.tags.len();
            note.tags.retain(|existing| existing != &normalized);
            Ok(note.tags.len() != before)
        })
        .await
    }

    pub async fn add_section(&self, id: &str, kind: SectionKind) -> StoreResult<Section> {
        let section = Section {
            id: Uuid::new_v4().to_string(),
            kind,
            title: None,
            content: String::new(),
            language: (kind == SectionKind::Code).then(|| DEFAULT_CODE_LANGUAGE.to_string()),
            image_data: None,
            created_at: Utc::now(),
            x: None,
            y: None,
            width: None,
            height: None,
        };
        let pushed = section.clone();
        self.mutate_note(id, move |note| {
            note.sections.push(pushed);
            Ok(true)
        })
        .await?;
        Ok(section)
    }

    pub async fn add_image_section(&self, id: &str, image_data: &str) -> StoreResult<Section> {
        let payload = image_data
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .unwrap_or(image_data);
        BASE64
            .decode(payload)
            .map_err(|error| StoreError::InvalidImageData(error.to_string()))?;

        let section = Section {
            id: Uuid::new_v4().to_string(),
            kind: SectionKind::Image,
            title: None,
            content: IMAGE_PLACEHOLDER.to_string(),
            language: None,
            image_data: Some(image_data.to_string()),
            created_at: Utc::now(),
            x: None,
            y: None,
            width: None,
            height: None,
        };
        let pushed = section.clone();
        self.mutate_note(id, move |note| {
            note.sections.push(pushed);
            Ok(true)
        })
        .await?;
        Ok(section)
    }

    pub async fn update_section_content(
        &self,
        id: &str,
        section_id: &str,
        content: &str,
        language: Option<&str>,
    ) -> StoreResult<Note> {
        let section_id = section_id.to_string();
        let content = content.to_string();
        let language = language.map(|value| value.to_string());
        self.mutate_note(id, move |note| {
            let section = find_section(note, &section_id)?;
            section.content = content;
            if let Some(language) = language {
                section.language = Some(language);
            }
            Ok(true)
        })
        .await
    }

    pub async fn update_section_title(
        &self,
        id: &str,
        section_id: &str,
        title: &str,
    ) -> StoreResult<Note> {
        let section_id = section_id.to_string();
        let title = title.to_string();
        self.mutate_note(id, move |note| {
            let section = find_section(note, &section_id)?;
            section.title = Some(title);
            Ok(true)
        })
        .await
    }

    pub async fn delete_section(&self, id: &str, section_id: &str) -> StoreResult<Note> {
        let section_id = section_id.to_string();
        self.mutate_note(id, move |note| {
            let before = note.sections.len();
            note.sections.retain(|section| section.id != section_id);
            if note.sections.len() == before {
                return Err(StoreError::SectionNotFound(section_id.clone()));
            }
            Ok(true)
        })
        .await
    }

    /// Idempotent: a missing file or index entry is tolerated silently. The
    /// date subfolders and the legacy flat root are searched in case the
    /// index no longer knows where the file lives.
    pub async fn delete_note(&self, id: &str) -> StoreResult<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let root = self.root()?;
        let mut cache = self.index_cache.lock().await;
        let entries = ensure_index(&mut cache, &root)?;

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(entry) = entries.get(id) {
            candidates.push(root.join(&entry.location));
        }
        candidates.extend(search_note_paths(&root, id)?);

        for path in candidates {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(id, path = %path.display(), "note file deleted"),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }

        index::remove(&root, entries, id)?;
        drop(cache);

        // The note is gone; its lock entry would otherwise live forever.
        // Callers still racing on the old mutex fail NoteNotFound anyway.
        self.note_locks.lock().await.remove(id);
        Ok(())
    }

    pub async fn load_tags(&self) -> StoreResult<Vec<String>> {
        tags::load_tags(&self.root()?)
    }

    pub async fn add_tag_to_registry(&self, tag: &str) -> StoreResult<bool> {
        let _registry = self.registry_lock.lock().await;
        tags::add_tag(&self.root()?, tag)
    }

    fn root(&self) -> StoreResult<PathBuf> {
        self.directory
            .persisted_directory()?
            .ok_or(StoreError::NoDirectorySelected)
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.note_locks.lock().await;
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Load → mutate → bump `updatedAt` → write back to the same location →
    /// upsert index. `apply` reports whether anything changed; a no-op
    /// returns the unchanged note without touching disk.
    async fn mutate_note<F>(&self, id: &str, apply: F) -> StoreResult<Note>
    where
        F: FnOnce(&mut Note) -> StoreResult<bool>,
    {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let root = self.root()?;
        let mut cache = self.index_cache.lock().await;
        let entries = ensure_index(&mut cache, &root)?;
        let location = entries
            .get(id)
            .map(|entry| entry.location.clone())
            .ok_or_else(|| StoreError::NoteNotFound(id.to_string()))?;

        let mut note = read_indexed_note(&root, id, &location)?;
        if !apply(&mut note)? {
            return Ok(note);
        }

        note.updated_at = Utc::now();
        codec::write_note_file(&root.join(&location), &note)?;
        index::upsert(&root, entries, NoteSummary::of(&note, &location))?;
        tracing::debug!(id, "note updated");
        Ok(note)
    }
}

fn ensure_index<'a>(
    cache: &'a mut Option<BTreeMap<String, NoteSummary>>,
    root: &Path,
) -> StoreResult<&'a mut BTreeMap<String, NoteSummary>> {
    if cache.is_none() {
        *cache = Some(index::load(root)?);
    }
    match cache {
        Some(entries) => Ok(entries),
        None => Err(StoreError::Internal("index cache unavailable".to_string())),
    }
}

fn read_indexed_note(root: &Path, id: &str, location: &str) -> StoreResult<Note> {
    match codec::read_note_file(&root.join(location)) {
        Ok(mut note) => {
            note.location = Some(location.to_string());
            Ok(note)
        }
        Err(StoreError::Io(_)) | Err(StoreError::CorruptNoteFile(_)) => {
            tracing::warn!(id, location, "indexed note file missing or unreadable");
            Err(StoreError::NoteNotFound(id.to_string()))
        }
        Err(error) => Err(error),
    }
}

/// All plausible homes for `<id>.json`: every date subfolder plus the legacy
/// flat layout directly under `Notes/`.
fn search_note_paths(root: &Path, id: &str) -> StoreResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let notes_root = root.join(NOTES_DIR);
    if !notes_root.is_dir() {
        return Ok(paths);
    }
    let file_name = format!("{}.json", id);
    let flat = notes_root.join(&file_name);
    if flat.is_file() {
        paths.push(flat);
    }
    for entry in fs::read_dir(&notes_root)? {
        let entry = entry?;
        if entry.path().is_dir() {
            let candidate = entry.path().join(&file_name);
            if candidate.is_file() {
                paths.push(candidate);
            }
        }
    }
    Ok(paths)
}

fn find_section<'a>(note: &'a mut Note, section_id: &str) -> StoreResult<&'a mut Section> {
    note.sections
        .iter_mut()
        .find(|section| section.id == section_id)
        .ok_or_else(|| StoreError::SectionNotFound(section_id.to_string()))
}
