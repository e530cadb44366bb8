use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePdf {
    pub citation_key: String,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportCounts {
    pub documents_total: usize,
    pub documents_exported: usize,
    pub documents_skipped: usize,
    pub highlights_exported: usize,
    pub notes_exported: usize,
    pub outline_diagnostics: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPaths {
    pub database: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub command: String,
    pub paths: ExportPaths,
    pub counts: ExportCounts,
    pub source_pdfs: Vec<SourcePdf>,
    pub warnings: Vec<String>,
}

pub const MANIFEST_VERSION: u32 = 1;
pub const MANIFEST_FILENAME: &str = "export_run.json";
