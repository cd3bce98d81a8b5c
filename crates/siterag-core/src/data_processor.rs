use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::Document;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Loads crawler output from a directory tree into [`Document`]s for one
/// organization.
///
/// - `*.json`: a serialized `Document`; an empty `org_id` is filled in,
///   a different one is skipped
/// - `*.txt` / `*.md`: plain text; title is the file stem, domain `local`,
///   content type the parent directory (or `page` at the root)
pub struct DocumentLoader {
    org_id: String,
}

impl DocumentLoader {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self { org_id: org_id.into() }
    }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        self.load_directory_limited(data_dir, usize::MAX)
    }

    pub fn load_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Document>> {
        let mut files = self.list_files(data_dir);
        if files.is_empty() {
            warn!("No .json/.txt/.md files found under {}", data_dir.display());
            return Ok(vec![]);
        }
        if files.len() > limit {
            files.truncate(limit);
            info!("Limited to first {} files", limit);
        }
        let mut documents = Vec::with_capacity(files.len());
        for file_path in &files {
            if let Some(doc) = self.load_file(file_path, data_dir)? {
                documents.push(doc);
            }
        }
        info!("Loaded {} documents from {} files", documents.len(), files.len());
        Ok(documents)
    }

    fn load_file(&self, file_path: &Path, data_dir: &Path) -> Result<Option<Document>> {
        let content = self.read_file_content(file_path)?;
        if file_path.extension().and_then(|s| s.to_str()) == Some("json") {
            let mut doc: Document = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse document {}", file_path.display()))?;
            if doc.org_id.is_empty() {
                doc.org_id = self.org_id.clone();
            } else if doc.org_id != self.org_id {
                warn!("Skipping {}: belongs to org '{}', not '{}'", file_path.display(), doc.org_id, self.org_id);
                return Ok(None);
            }
            return Ok(Some(doc));
        }

        let extracted_at: DateTime<Utc> = fs::metadata(file_path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(Document {
            id: self.extract_doc_id(file_path, data_dir),
            org_id: self.org_id.clone(),
            domain: "local".to_string(),
            url: format!("file://{}", file_path.display()),
            title: file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
            text: content,
            content_type: self.get_facet_from_path(file_path, data_dir),
            extracted_at,
            crawl_id: None,
            processed: false,
        }))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    /// Relative path without extension, `/`-separated, so ids are stable
    /// across machines.
    fn extract_doc_id(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
        relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect::<Vec<_>>().join("/")
    }

    fn get_facet_from_path(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative_path = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        match relative_path.parent().and_then(|p| p.to_str()) {
            Some(facet) if !facet.is_empty() => facet.to_string(),
            _ => "page".to_string(),
        }
    }

    fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| match p.extension().and_then(|s| s.to_str()) {
                Some("json") => true,
                Some(ext) => TEXT_EXTENSIONS.contains(&ext),
                None => false,
            })
            .collect();
        files.sort();
        files
    }
}
