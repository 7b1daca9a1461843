//! crates/nexus_core/src/documents.rs
//!
//! Folder view helpers for the admin document archive.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Document, DocumentCategory};

pub const FOLDER_PAGE_SIZE: usize = 10;

/// Number of documents per category. Categories without documents are omitted.
pub fn category_counts(documents: &[Document]) -> BTreeMap<DocumentCategory, usize> {
    let mut counts = BTreeMap::new();
    for doc in documents {
        *counts.entry(doc.category).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderPage {
    pub category: DocumentCategory,
    /// 1-based, clamped to `1..=total_pages`.
    pub page: usize,
    pub total_pages: usize,
    pub documents: Vec<Document>,
}

/// One page of a category folder. An empty folder still has one (empty) page.
pub fn folder_page(documents: &[Document], category: DocumentCategory, page: usize) -> FolderPage {
    let in_folder: Vec<&Document> = documents.iter().filter(|d| d.category == category).collect();
    let total_pages = in_folder.len().div_ceil(FOLDER_PAGE_SIZE).max(1);
    let page = page.clamp(1, total_pages);

    FolderPage {
        category,
        page,
        total_pages,
        documents: in_folder
            .into_iter()
            .skip((page - 1) * FOLDER_PAGE_SIZE)
            .take(FOLDER_PAGE_SIZE)
            .cloned()
            .collect(),
    }
}

/// Human-readable size, e.g. `1.5 KB`. Base 1024, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}
