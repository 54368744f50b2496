//! Local filesystem recording store
//!
//! Mirrors the shared-drive layout on disk:
//!
//! ```text
//! <inbox_root>/<city>/<team member>/<recording>
//! <processed_folder>/<city>/<team member>/<recording>
//! <quarantine_folder>/<city>/<team member>/<recording>
//! <quarantine_folder>/<city>/<team member>/<recording>.quarantine.json
//! ```
//!
//! A file's id is its path relative to the inbox root, so a restored file keeps
//! its ledger identity. The sidecar next to a quarantined file carries the
//! note and the time it was quarantined.

use crate::error::RemoteError;
use crate::models::{CandidateFile, ContentRef, FileContext, QuarantinedFile};
use crate::types::{ContentStore, Destination, Discovery};
use chrono::{DateTime, Utc};
use mabot_common::config::DriveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Suffix of the note file written next to a quarantined recording
pub const NOTE_SUFFIX: &str = ".quarantine.json";

/// Contents of a quarantine sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuarantineNote {
    file_id: String,
    file_name: String,
    origin: String,
    note: String,
    quarantined_at: DateTime<Utc>,
}

/// Discovery and content store over local folders
pub struct LocalDrive {
    config: DriveConfig,
}

impl LocalDrive {
    pub fn new(config: DriveConfig) -> Self {
        Self { config }
    }

    fn inbox_path(&self, content_ref: &ContentRef) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(&content_ref.0);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(RemoteError::non_retryable(format!(
                "content reference escapes the inbox: {}",
                content_ref
            )));
        }
        Ok(self.config.inbox_root.join(relative))
    }

    fn is_reserved(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        self.config
            .reserved_folder_names
            .iter()
            .any(|r| r.trim().to_lowercase() == lower)
    }

    fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .map(|e| self.config.media_extensions.iter().any(|m| m.eq_ignore_ascii_case(&e)))
            .unwrap_or(false)
    }

    /// Walk `inbox_root/<city>/<member>/` one level deep each
    fn scan(&self) -> Result<Vec<CandidateFile>, RemoteError> {
        let root = &self.config.inbox_root;
        if !root.is_dir() {
            return Err(RemoteError::non_retryable(format!(
                "inbox root is not a directory: {}",
                root.display()
            )));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_entry(|e| self.should_descend(e));

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry during discovery");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_media(entry.path()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                    continue;
                }
            };
            if metadata.len() == 0 {
                debug!(path = %entry.path().display(), "Skipping zero-byte file");
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let [city, member, file_name] = parts.as_slice() else {
                continue;
            };

            let id = parts.join("/");
            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            let mut candidate = CandidateFile::new(
                id.clone(),
                FileContext {
                    city: city.clone(),
                    member: member.clone(),
                    file_name: file_name.clone(),
                },
                ContentRef(id),
            );
            candidate.mime_type = mime_for(entry.path()).map(str::to_string);
            candidate.size_bytes = Some(metadata.len());
            candidate.created_at = created_at;
            candidates.push(candidate);
        }

        // Deterministic order: city, member, creation time, filename
        candidates.sort_by(|a, b| {
            a.context
                .city
                .cmp(&b.context.city)
                .then_with(|| a.context.member.cmp(&b.context.member))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.context.file_name.cmp(&b.context.file_name))
        });

        Ok(candidates)
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if entry.depth() == 0 {
            return true;
        }
        if name.starts_with('.') {
            return false;
        }
        if entry.file_type().is_dir() && self.is_reserved(&name) {
            debug!(folder = %name, "Skipping reserved folder");
            return false;
        }
        true
    }

    fn terminal_root(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Processed => &self.config.processed_folder,
            Destination::Quarantine => &self.config.quarantine_folder,
        }
    }
}

#[async_trait::async_trait]
impl Discovery for LocalDrive {
    async fn list_candidate_files(&self) -> Result<Vec<CandidateFile>, RemoteError> {
        let drive = LocalDrive::new(self.config.clone());
        let candidates = tokio::task::spawn_blocking(move || drive.scan())
            .await
            .map_err(|e| RemoteError::non_retryable(format!("discovery task failed: {}", e)))??;

        info!(count = candidates.len(), "Discovered candidate files");
        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl ContentStore for LocalDrive {
    async fn download(&self, content_ref: &ContentRef) -> Result<Vec<u8>, RemoteError> {
        let path = self.inbox_path(content_ref)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn move_file(
        &self,
        file: &CandidateFile,
        destination: Destination,
        note: Option<&str>,
    ) -> Result<(), RemoteError> {
        let source = self.inbox_path(&file.content_ref)?;
        let target_dir = self
            .terminal_root(destination)
            .join(&file.context.city)
            .join(&file.context.member);
        let target = target_dir.join(file.file_name());

        tokio::fs::create_dir_all(&target_dir).await?;
        // A retried call may find the move already done by the previous attempt
        if !tokio::fs::try_exists(&source).await? && tokio::fs::try_exists(&target).await? {
            debug!(file_id = %file.id, target = %target.display(), "File already at target");
        } else {
            move_path(&source, &target).await?;
        }

        if destination == Destination::Quarantine {
            let sidecar = QuarantineNote {
                file_id: file.id.clone(),
                file_name: file.file_name().to_string(),
                origin: file.context.origin(),
                note: note.unwrap_or_default().to_string(),
                quarantined_at: Utc::now(),
            };
            write_note(&note_path(&target), &sidecar).await?;
        }

        debug!(file_id = %file.id, target = %target.display(), "Moved file");
        Ok(())
    }

    async fn list_quarantined(&self) -> Result<Vec<QuarantinedFile>, RemoteError> {
        let root = self.config.quarantine_folder.clone();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let notes = tokio::task::spawn_blocking(move || -> Vec<PathBuf> {
            WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(NOTE_SUFFIX))
                .map(|e| e.into_path())
                .collect()
        })
        .await
        .map_err(|e| RemoteError::non_retryable(format!("quarantine scan failed: {}", e)))?;

        let mut files = Vec::with_capacity(notes.len());
        for path in notes {
            match read_note(&path).await {
                Ok(note) => files.push(QuarantinedFile {
                    id: note.file_id,
                    file_name: note.file_name,
                    quarantined_at: note.quarantined_at,
                    origin: Some(note.origin),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable quarantine note"),
            }
        }
        files.sort_by(|a, b| a.quarantined_at.cmp(&b.quarantined_at));
        Ok(files)
    }

    async fn restore(&self, file: &QuarantinedFile) -> Result<(), RemoteError> {
        let origin = file
            .origin
            .as_deref()
            .ok_or_else(|| RemoteError::non_retryable(format!("no origin recorded for {}", file.id)))?;

        let quarantined = self.config.quarantine_folder.join(origin).join(&file.file_name);
        let inbox_dir = self.config.inbox_root.join(origin);
        tokio::fs::create_dir_all(&inbox_dir).await?;
        move_path(&quarantined, &inbox_dir.join(&file.file_name)).await?;

        let note = note_path(&quarantined);
        if let Err(e) = tokio::fs::remove_file(&note).await {
            warn!(path = %note.display(), error = %e, "Could not remove quarantine note");
        }
        Ok(())
    }
}

fn note_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(NOTE_SUFFIX);
    PathBuf::from(name)
}

async fn write_note(path: &Path, note: &QuarantineNote) -> Result<(), RemoteError> {
    let json = serde_json::to_string_pretty(note)
        .map_err(|e| RemoteError::non_retryable(format!("encode quarantine note: {}", e)))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn read_note(path: &Path) -> Result<QuarantineNote, RemoteError> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| RemoteError::non_retryable(format!("bad quarantine note: {}", e)))
}

/// Rename, falling back to copy + delete across filesystems
async fn move_path(source: &Path, target: &Path) -> Result<(), RemoteError> {
    if let Err(rename_err) = tokio::fs::rename(source, target).await {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(rename_err.into());
        }
        tokio::fs::copy(source, target).await?;
        tokio::fs::remove_file(source).await?;
    }
    Ok(())
}

/// MIME type for the transcription request, by extension
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}
