use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ExportRunManifest, MANIFEST_FILENAME};
use crate::store::MendeleyStore;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(db_path = %args.db_path.display(), "status requested");

    let store = MendeleyStore::open(&args.db_path)?;
    let counts = store.counts()?;
    info!(
        documents = counts.documents,
        notes = counts.notes,
        highlights = counts.highlights,
        "database counts"
    );

    let manifest_path = args.output_dir.join(MANIFEST_FILENAME);
    if manifest_path.exists() {
        let raw = fs::read(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: ExportRunManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        info!(
            run_id = %manifest.run_id,
            started_at = %manifest.started_at,
            finished_at = %manifest.finished_at,
            documents_exported = manifest.counts.documents_exported,
            documents_skipped = manifest.counts.documents_skipped,
            highlights_exported = manifest.counts.highlights_exported,
            notes_exported = manifest.counts.notes_exported,
            outline_diagnostics = manifest.counts.outline_diagnostics,
            warnings = manifest.warnings.len(),
            "loaded last export run manifest"
        );
        for warning in &manifest.warnings {
            warn!(warning = %warning, "recorded warning");
        }
    } else {
        warn!(path = %manifest_path.display(), "no export run manifest found");
    }

    Ok(())
}
