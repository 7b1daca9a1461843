//! crates/nexus_core/src/uploads.rs
//!
//! The admin upload flow: guess a category per selected file, let the admin
//! adjust it, then commit the whole batch or discard it.

use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{Document, DocumentCategory, NewDocument};
use crate::ports::{DatabaseService, PortError, StorageService};

/// Suggests a category from the file name and MIME type. First match wins.
pub fn detect_category(file_name: &str, mime_type: &str) -> DocumentCategory {
    let name = file_name.to_lowercase();
    let mime = mime_type.to_lowercase();

    if mime.starts_with("image/") {
        return DocumentCategory::Billeder;
    }
    if name.contains("invoice") || name.contains("faktura") || mime == "application/pdf" {
        return DocumentCategory::Faktura;
    }
    if ["contract", "kontrakt", "agreement"]
        .iter()
        .any(|needle| name.contains(needle))
    {
        return DocumentCategory::Kontrakt;
    }
    DocumentCategory::Andre
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No files selected")]
    Empty,
    #[error("File {0} is not part of this batch")]
    UnknownFile(Uuid),
}

/// A file as it arrives from the browser.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Generated per file; names are not unique within a batch.
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
    pub category: DocumentCategory,
}

/// Title and description typed into the upload form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMeta {
    pub title: String,
    pub description: String,
}

#[derive(Debug)]
pub struct PendingUploadBatch {
    id: Uuid,
    files: Vec<PendingFile>,
    meta: Option<UploadMeta>,
}

impl PendingUploadBatch {
    pub fn new(selected: Vec<SelectedFile>, meta: Option<UploadMeta>) -> Result<Self, UploadError> {
        if selected.is_empty() {
            return Err(UploadError::Empty);
        }
        let files = selected
            .into_iter()
            .map(|f| PendingFile {
                id: Uuid::new_v4(),
                category: detect_category(&f.file_name, &f.mime_type),
                file_name: f.file_name,
                mime_type: f.mime_type,
                data: f.data,
            })
            .collect();
        Ok(Self {
            id: Uuid::new_v4(),
            files,
            meta,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn set_category(&mut self, file_id: Uuid, category: DocumentCategory) -> Result<(), UploadError> {
        let file = self
            .files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or(UploadError::UnknownFile(file_id))?;
        file.category = category;
        Ok(())
    }

    /// Overwrites every file's category.
    pub fn apply_to_all(&mut self, category: DocumentCategory) {
        for file in &mut self.files {
            file.category = category;
        }
    }

    pub fn summary(&self) -> BTreeMap<DocumentCategory, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.files {
            *counts.entry(file.category).or_insert(0) += 1;
        }
        counts
    }

    /// e.g. `"Billeder: 2, Faktura: 1"`.
    pub fn summary_line(&self) -> String {
        self.summary()
            .iter()
            .map(|(category, n)| format!("{}: {}", category, n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Form metadata only applies when exactly one file is uploaded.
    fn title_and_description(&self, file: &PendingFile) -> (String, String) {
        match (&self.meta, self.files.len()) {
            (Some(meta), 1) => {
                let title = if meta.title.trim().is_empty() {
                    file.file_name.clone()
                } else {
                    meta.title.clone()
                };
                (title, meta.description.clone())
            }
            _ => (file.file_name.clone(), String::new()),
        }
    }
}

/// The outcome of a batch commit that stopped at a failing file.
#[derive(Debug, thiserror::Error)]
#[error("Upload of {file_name} failed after {} committed file(s): {source}", .committed.len())]
pub struct CommitError {
    pub file_name: String,
    pub source: PortError,
    /// Files stored before the failure. These are not rolled back.
    pub committed: Vec<Document>,
}

/// Stores each file and records a document row for it, in order.
///
/// Stops at the first failure; files committed before it stay committed.
pub async fn commit_batch(
    batch: PendingUploadBatch,
    storage: &dyn StorageService,
    db: &dyn DatabaseService,
    uploaded_by: Uuid,
    object_path: impl Fn(&PendingFile) -> String,
) -> Result<Vec<Document>, CommitError> {
    info!(batch_id = %batch.id, files = batch.files.len(), "Committing upload batch: {}", batch.summary_line());
    let mut committed = Vec::with_capacity(batch.files.len());

    for file in &batch.files {
        let path = object_path(file);
        let stored = async {
            storage
                .upload(&path, file.data.clone(), &file.mime_type)
                .await?;
            let (title, description) = batch.title_and_description(file);
            db.create_document(NewDocument {
                title,
                description,
                file_name: file.file_name.clone(),
                file_type: file.mime_type.clone(),
                file_size: file.data.len() as i64,
                file_url: storage.public_url(&path),
                category: file.category,
                is_public: true,
                uploaded_by,
            })
            .await
        }
        .await;

        match stored {
            Ok(document) => committed.push(document),
            Err(source) => {
                error!(batch_id = %batch.id, file = %file.file_name, "Upload aborted: {}", source);
                return Err(CommitError {
                    file_name: file.file_name.clone(),
                    source,
                    committed,
                });
            }
        }
    }

    Ok(committed)
}
