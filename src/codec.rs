use crate::errors::{StoreError, StoreResult};
use crate::models::{Note, NoteIndex};
use std::fs;
use std::path::Path;

/// Pretty JSON with RFC 3339 timestamps; section order is preserved exactly
/// as held in memory.
pub fn encode_note(note: &Note) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(note).map_err(StoreError::from)
}

pub fn decode_note(bytes: &[u8], context: &str) -> StoreResult<Note> {
    serde_json::from_slice(bytes)
        .map_err(|error| StoreError::CorruptNoteFile(format!("{}: {}", context, error)))
}

pub fn read_note_file(path: &Path) -> StoreResult<Note> {
    let bytes = fs::read(path)?;
    decode_note(&bytes, &path.to_string_lossy())
}

pub fn write_note_file(path: &Path, note: &Note) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = encode_note(note)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_index_file(path: &Path) -> StoreResult<NoteIndex> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(StoreError::from)
}

/// Single create-or-truncate write of the whole index document; readers never
/// observe a partially written file through this call.
pub fn write_index_file(path: &Path, index: &NoteIndex) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(index)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Section, SectionKind};
    use chrono::Utc;

    fn sample_note() -> Note {
        let now = Utc::now();
        Note {
            id: "11111111-1111-4111-8111-111111111111".to_string(),
            title: "Sample".to_string(),
            tags: vec!["work".to_string(), "rust".to_string()],
            sections: vec![
                Section {
                    id: "s-1".to_string(),
                    kind: SectionKind::Code,
                    title: Some("Snippet".to_string()),
                    content: "fn main() {}".to_string(),
                    language: Some("rust".to_string()),
                    image_data: None,
                    created_at: now,
                    x: Some(10.0),
                    y: Some(20.0),
                    width: None,
                    height: None,
                },
                Section {
                    id: "s-2".to_string(),
                    kind: SectionKind::Text,
                    title: None,
                    content: "plain".to_string(),
                    language: None,
                    image_data: None,
                    created_at: now,
                    x: None,
                    y: None,
                    width: None,
                    height: None,
                },
            ],
            created_at: now,
            updated_at: now,
            location: None,
        }
    }

    #[test]
    fn note_roundtrip_preserves_structure() {
        let note = sample_note();
        let bytes = encode_note(&note).expect("encode");
        let decoded = decode_note(&bytes, "test").expect("decode");
        assert_eq!(decoded, note);
        assert_eq!(decoded.sections[0].id, "s-1");
        assert_eq!(decoded.sections[1].id, "s-2");
    }

    #[test]
    fn absent_optional_fields_stay_absent() {
        let note = sample_note();
        let bytes = encode_note(&note).expect("encode");
        let raw: serde_json::Value = serde_json::from_slice(&bytes).expect("raw json");
        let text_section = &raw["sections"][1];
        assert!(text_section.get("language").is_none());
        assert!(text_section.get("imageData").is_none());
        assert!(text_section.get("title").is_none());

        let decoded = decode_note(&bytes, "test").expect("decode");
        assert_eq!(decoded.sections[1].language, None);
        assert_eq!(decoded.sections[1].image_data, None);
    }

    #[test]
    fn timestamps_encode_as_rfc3339_strings() {
        let note = sample_note();
        let raw: serde_json::Value =
            serde_json::from_slice(&encode_note(&note).expect("encode")).expect("raw");
        let created = raw["createdAt"].as_str().expect("string timestamp");
        assert!(created.contains('T'));
    }

    #[test]
    fn malformed_json_is_a_corrupt_note_error() {
        let error = decode_note(b"{not json", "Notes/bad.json").expect_err("must fail");
        match error {
            StoreError::CorruptNoteFile(context) => assert!(context.contains("Notes/bad.json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn location_is_not_written_into_note_files() {
        let mut note = sample_note();
        note.location = Some("Notes/2024-01-01/x.json".to_string());
        let raw: serde_json::Value =
            serde_json::from_slice(&encode_note(&note).expect("encode")).expect("raw");
        assert!(raw.get("location").is_none());
    }
}
