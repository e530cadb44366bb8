use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::{ExportArgs, Include};
use crate::colors;
use crate::model::{
    ExportCounts, ExportPaths, ExportRunManifest, MANIFEST_FILENAME, MANIFEST_VERSION, SourcePdf,
};
use crate::outline::{ChapterFormatter, ChapterLocation, OutlineIndex, PageFormatter};
use crate::pdf::PdfDocument;
use crate::store::{AnnotationKind, AnnotationRecord, DocumentRecord, MendeleyStore};
use crate::util;

const RULE_WIDTH: usize = 80;
const TEXT_WIDTH: usize = 80;
const TAG_WIDTH: usize = 73;

struct PlacedAnnotation {
    record: AnnotationRecord,
    location: ChapterLocation,
    color_label: String,
}

struct DocumentExport {
    meta: DocumentRecord,
    annotations: Vec<PlacedAnnotation>,
    color_confidences: Vec<(String, f64)>,
}

pub fn run(args: ExportArgs) -> Result<()> {
    let started_at = Utc::now();
    let run_id = util::utc_compact_string(started_at);

    info!(
        db_path = %args.db_path.display(),
        output_dir = %args.output_dir.display(),
        include = args.include.as_str(),
        run_id = %run_id,
        "starting export"
    );

    let store = MendeleyStore::open(&args.db_path)?;
    let documents = store.documents(args.folder.as_deref())?;
    util::ensure_directory(&args.output_dir)?;

    let mut counts = ExportCounts {
        documents_total: documents.len(),
        ..ExportCounts::default()
    };
    let mut warnings = Vec::new();
    let mut source_pdfs = Vec::new();
    let mut exports = Vec::new();

    for meta in documents {
        let export = match assemble_document(&store, meta, args.include, &mut warnings, &mut counts)
        {
            Ok(export) => export,
            Err(err) => {
                warnings.push(format!("failed to assemble document: {err:#}"));
                counts.documents_skipped += 1;
                continue;
            }
        };

        let Some(export) = export else {
            counts.documents_skipped += 1;
            continue;
        };

        if let Some(path) = &export.meta.pdf_path {
            if path.exists() {
                source_pdfs.push(SourcePdf {
                    citation_key: export.meta.citation_key.clone(),
                    path: path.display().to_string(),
                    sha256: util::sha256_file(path)?,
                });
            }
        }

        counts.documents_exported += 1;
        counts.highlights_exported += export
            .annotations
            .iter()
            .filter(|anno| anno.record.kind == AnnotationKind::Highlight)
            .count();
        counts.notes_exported += export
            .annotations
            .iter()
            .filter(|anno| anno.record.kind == AnnotationKind::Note)
            .count();
        exports.push(export);
    }

    write_reports(&args, &exports)?;

    let manifest = ExportRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        started_at: started_at.to_rfc3339(),
        finished_at: util::now_utc_string(),
        command: std::env::args().collect::<Vec<_>>().join(" "),
        paths: ExportPaths {
            database: args.db_path.display().to_string(),
            output_dir: args.output_dir.display().to_string(),
        },
        counts: counts.clone(),
        source_pdfs,
        warnings: warnings.clone(),
    };
    let manifest_path = args.output_dir.join(MANIFEST_FILENAME);
    util::write_json_pretty(&manifest_path, &manifest)?;

    for warning in &warnings {
        warn!(warning = %warning, "export warning");
    }
    info!(path = %manifest_path.display(), "wrote export run manifest");
    info!(
        documents = counts.documents_exported,
        highlights = counts.highlights_exported,
        notes = counts.notes_exported,
        skipped = counts.documents_skipped,
        "export completed"
    );

    Ok(())
}

/// Gather one document's annotations and attach chapter placements.
/// Returns `None` when the document has nothing to export.
fn assemble_document(
    store: &MendeleyStore,
    meta: DocumentRecord,
    include: Include,
    warnings: &mut Vec<String>,
    counts: &mut ExportCounts,
) -> Result<Option<DocumentExport>> {
    let mut records = Vec::new();
    if include.highlights() {
        records.extend(store.highlights(meta.id)?);
    }
    if include.notes() {
        records.extend(store.notes(meta.id)?);
    }
    if records.is_empty() {
        debug!(citation_key = %meta.citation_key, "no annotations; skipping");
        return Ok(None);
    }
    records.sort_by_key(|record| record.page);

    // A missing or unparsable PDF degrades to an empty index: every lookup
    // then answers with the synthetic No TOC marker.
    let index = match &meta.pdf_path {
        Some(path) if path.exists() => match PdfDocument::open(path) {
            Ok(pdf) => OutlineIndex::build(&pdf),
            Err(err) => {
                warnings.push(format!(
                    "{}: failed to open PDF, exporting without chapters: {err:#}",
                    meta.citation_key
                ));
                OutlineIndex::default()
            }
        },
        Some(path) => {
            warnings.push(format!(
                "{}: PDF not found at {}",
                meta.citation_key,
                path.display()
            ));
            OutlineIndex::default()
        }
        None => {
            warnings.push(format!("{}: no PDF on record", meta.citation_key));
            OutlineIndex::default()
        }
    };

    for diagnostic in index.diagnostics() {
        counts.outline_diagnostics += 1;
        warn!(citation_key = %meta.citation_key, diagnostic = %diagnostic, "outline diagnostic");
    }

    let highlight_colors: Vec<String> = records
        .iter()
        .filter(|record| record.kind == AnnotationKind::Highlight)
        .map(|record| record.color.clone())
        .collect();
    let color_confidences = colors::color_confidences(&highlight_colors)?;

    let mut annotations = Vec::new();
    for record in records {
        let location = index.lookup(record.page, true)?;
        let color_label = colors::color_label(&record.color)?;
        annotations.push(PlacedAnnotation {
            record,
            location,
            color_label,
        });
    }

    Ok(Some(DocumentExport {
        meta,
        annotations,
        color_confidences,
    }))
}

fn write_reports(args: &ExportArgs, exports: &[DocumentExport]) -> Result<()> {
    if args.separate {
        for export in exports {
            let stem = util::sanitize_filename(&export.meta.citation_key)?;
            let prefix = match args.include {
                Include::Highlights => "Highlights",
                Include::Notes => "Notes",
                Include::Both => "Anno",
            };
            let path = args.output_dir.join(format!("{prefix}_{stem}.txt"));
            let mut out = create_report_file(&path)?;
            write_document_report(&mut out, export)?;
            out.flush()?;
            info!(path = %path.display(), "wrote report");
        }
    } else {
        let path = args
            .output_dir
            .join(format!("Mendeley_{}.txt", args.include.as_str()));
        let mut out = create_report_file(&path)?;
        for export in exports {
            write_document_report(&mut out, export)?;
        }
        out.flush()?;
        info!(path = %path.display(), documents = exports.len(), "wrote combined report");
    }

    if args.by_tags {
        let path = args
            .output_dir
            .join(format!("Mendeley_{}_by_tags.txt", args.include.as_str()));
        let mut out = create_report_file(&path)?;
        write_by_tags_report(&mut out, exports)?;
        out.flush()?;
        info!(path = %path.display(), "wrote by-tags report");
    }

    if args.by_colors {
        let path = args
            .output_dir
            .join(format!("Mendeley_{}_by_colors.txt", args.include.as_str()));
        let mut out = create_report_file(&path)?;
        write_by_colors_report(&mut out, exports)?;
        out.flush()?;
        info!(path = %path.display(), "wrote by-colors report");
    }

    Ok(())
}

fn create_report_file(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create report: {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// One document's block: a ruled `# title` header followed by `>` highlight
/// and `-` note entries with metadata bullets.
fn write_document_report(out: &mut impl Write, export: &DocumentExport) -> Result<()> {
    writeln!(out, "\n\n{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out, "# {}", export.meta.title)?;

    for anno in &export.annotations {
        let marker = match anno.record.kind {
            AnnotationKind::Highlight => '>',
            AnnotationKind::Note => '-',
        };
        let body = util::wrap_text(annotation_body(&anno.record), TEXT_WIDTH, "\t  ");
        writeln!(out, "\n\t{marker} {body}")?;
        write_metadata_bullets(out, export, anno)?;
    }

    Ok(())
}

fn annotation_body(record: &AnnotationRecord) -> &str {
    if record.text.is_empty() {
        "(highlight, text not extracted)"
    } else {
        &record.text
    }
}

fn write_metadata_bullets(
    out: &mut impl Write,
    export: &DocumentExport,
    anno: &PlacedAnnotation,
) -> Result<()> {
    let tags = export
        .meta
        .tags
        .iter()
        .map(|tag| format!("@{tag}"))
        .collect::<Vec<_>>()
        .join(", ");

    writeln!(out, "\n\t\t- @{}", export.meta.citation_key)?;
    writeln!(out, "\t\t- Tags: {}", util::wrap_text(&tags, TAG_WIDTH, "\t\t  "))?;
    writeln!(out, "\t\t- Ctime: {}", anno.record.ctime)?;
    writeln!(out, "\t\t- Page: {}", anno.record.page)?;
    writeln!(out, "\t\t- Color: {}", anno.color_label)?;
    writeln!(out, "\t\t- In Chapter: {}", chapter_line(&anno.location))?;
    Ok(())
}

fn chapter_line(location: &ChapterLocation) -> String {
    // lookup always yields a non-empty path
    let innermost = &location.path[0];
    let marker = if location.ambiguous { "[ambig!] " } else { "" };
    format!("{marker}{} (p. {})", innermost.title, innermost.pageno)
}

/// Annotations regrouped under each `@tag` across documents; untagged
/// documents collect under `@None`, sorted last.
fn write_by_tags_report(out: &mut impl Write, exports: &[DocumentExport]) -> Result<()> {
    let mut grouped: BTreeMap<String, Vec<(&DocumentExport, &PlacedAnnotation)>> = BTreeMap::new();
    for export in exports {
        let tags = if export.meta.tags.is_empty() {
            vec!["None".to_string()]
        } else {
            export.meta.tags.clone()
        };
        for tag in tags {
            let bucket = grouped.entry(tag).or_default();
            for anno in &export.annotations {
                bucket.push((export, anno));
            }
        }
    }

    let mut tags: Vec<&String> = grouped.keys().collect();
    tags.sort_by_key(|&tag| (tag == "None", tag.as_str()));

    for tag in tags {
        writeln!(out, "\n\n{}", "-".repeat(RULE_WIDTH))?;
        writeln!(out, "# @{tag}")?;

        let mut last_key: Option<&str> = None;
        for (export, anno) in &grouped[tag] {
            if last_key != Some(export.meta.citation_key.as_str()) {
                writeln!(out, "\n\n\t@{}:", export.meta.citation_key)?;
                last_key = Some(export.meta.citation_key.as_str());
            }
            let marker = match anno.record.kind {
                AnnotationKind::Highlight => '>',
                AnnotationKind::Note => '-',
            };
            let body = util::wrap_text(annotation_body(&anno.record), TEXT_WIDTH - 10, "\t\t  ");
            writeln!(out, "\n\t\t{marker} {body}")?;
            writeln!(out, "\n\t\t\t- Title: {}", export.meta.title)?;
            writeln!(out, "\t\t\t- Ctime: {}", anno.record.ctime)?;
        }
    }

    Ok(())
}

/// Per-document color grouping with chapter/page headers deduplicated by
/// the presentation trackers; the chapter changing forces the page header
/// so the context is re-anchored.
fn write_by_colors_report(out: &mut impl Write, exports: &[DocumentExport]) -> Result<()> {
    let mut ordered: Vec<&DocumentExport> = exports.iter().collect();
    ordered.sort_by(|a, b| a.meta.citation_key.cmp(&b.meta.citation_key));

    for export in ordered {
        writeln!(out, "\n\n{}", "-".repeat(RULE_WIDTH))?;
        writeln!(out, "[@{}]: {}", export.meta.citation_key, export.meta.title)?;

        for kind in [AnnotationKind::Highlight, AnnotationKind::Note] {
            for (label, group) in color_groups(&export.annotations, kind) {
                writeln!(out, "\n\n\t:{} {}s:", label.to_uppercase(), kind.as_str())?;

                let mut chapter_formatter = ChapterFormatter::new();
                let mut page_formatter = PageFormatter::new();

                for anno in group {
                    let chapter_block = chapter_formatter.render(&anno.location, false, "\t\t");
                    out.write_all(chapter_block.as_bytes())?;
                    let page_block =
                        page_formatter.render(anno.record.page, !chapter_block.is_empty(), "\t\t");
                    out.write_all(page_block.as_bytes())?;

                    let marker = match anno.record.kind {
                        AnnotationKind::Highlight => '>',
                        AnnotationKind::Note => '-',
                    };
                    let body =
                        util::wrap_text(annotation_body(&anno.record), TEXT_WIDTH - 25, "\t\t\t  ");
                    writeln!(out, "\n\t\t\t{marker} {body}")?;
                    writeln!(out, "\t\t\t\t- Ctime: {}", anno.record.ctime)?;

                    if kind == AnnotationKind::Highlight {
                        if let Some((_, confidence)) = export
                            .color_confidences
                            .iter()
                            .find(|(name, _)| *name == label)
                        {
                            if *confidence < 1.0 {
                                writeln!(
                                    out,
                                    "\t\t\t\t- Color confidence: {:.0}%",
                                    confidence * 100.0
                                )?;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Group one kind's annotations by color label: palette order first, then
/// unknown labels in first-seen order.
fn color_groups(
    annotations: &[PlacedAnnotation],
    kind: AnnotationKind,
) -> Vec<(String, Vec<&PlacedAnnotation>)> {
    let of_kind: Vec<&PlacedAnnotation> = annotations
        .iter()
        .filter(|anno| anno.record.kind == kind)
        .collect();

    let mut labels: Vec<String> = colors::COLOR_LABELS
        .iter()
        .map(|(_, label)| (*label).to_string())
        .collect();
    for anno in &of_kind {
        if !labels.contains(&anno.color_label) {
            labels.push(anno.color_label.clone());
        }
    }

    labels
        .into_iter()
        .filter_map(|label| {
            let group: Vec<&PlacedAnnotation> = of_kind
                .iter()
                .copied()
                .filter(|anno| anno.color_label == label)
                .collect();
            if group.is_empty() { None } else { Some((label, group)) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rusqlite::Connection;

    use super::*;
    use crate::outline::ChapterEntry;
    use crate::store::fixtures;

    fn placed(kind: AnnotationKind, page: usize, text: &str, chapter: &str) -> PlacedAnnotation {
        PlacedAnnotation {
            record: AnnotationRecord {
                kind,
                page,
                text: text.to_string(),
                color: "#fff5ad".to_string(),
                author: None,
                ctime: "2020-01-01T00:00:00Z".to_string(),
            },
            location: ChapterLocation {
                path: vec![ChapterEntry {
                    level: 1,
                    title: chapter.to_string(),
                    pageno: page,
                }],
                ambiguous: false,
            },
            color_label: "Yellow".to_string(),
        }
    }

    fn sample_export() -> DocumentExport {
        DocumentExport {
            meta: DocumentRecord {
                id: 1,
                citation_key: "smith2020".to_string(),
                title: "On Things".to_string(),
                pdf_path: None,
                tags: vec!["methods".to_string()],
            },
            annotations: vec![
                placed(AnnotationKind::Note, 3, "check derivation", "Intro"),
                placed(AnnotationKind::Highlight, 6, "", "Intro"),
            ],
            color_confidences: vec![("Yellow".to_string(), 1.0)],
        }
    }

    #[test]
    fn document_report_contains_header_and_bullets() {
        let mut buffer = Vec::new();
        write_document_report(&mut buffer, &sample_export()).unwrap();
        let report = String::from_utf8(buffer).unwrap();

        assert!(report.contains("# On Things"));
        assert!(report.contains("\t- check derivation"));
        assert!(report.contains("\t> (highlight, text not extracted)"));
        assert!(report.contains("- @smith2020"));
        assert!(report.contains("- Tags: @methods"));
        assert!(report.contains("- In Chapter: Intro (p. 3)"));
    }

    #[test]
    fn by_colors_report_prints_chapter_header_once_per_run() {
        let mut export = sample_export();
        export.annotations = vec![
            placed(AnnotationKind::Highlight, 6, "", "Intro"),
            placed(AnnotationKind::Highlight, 6, "", "Intro"),
            placed(AnnotationKind::Highlight, 9, "", "Results"),
        ];

        let mut buffer = Vec::new();
        write_by_colors_report(&mut buffer, &[export]).unwrap();
        let report = String::from_utf8(buffer).unwrap();

        assert_eq!(report.matches("In chapter: Intro").count(), 1);
        assert_eq!(report.matches("In chapter: Results").count(), 1);
        assert_eq!(report.matches("Page 6:").count(), 1);
        assert_eq!(report.matches("Page 9:").count(), 1);
        assert!(report.contains(":YELLOW highlights:"));
    }

    #[test]
    fn by_tags_report_sorts_none_last() {
        let tagged = sample_export();
        let mut untagged = sample_export();
        untagged.meta.citation_key = "doe2021".to_string();
        untagged.meta.tags.clear();

        let mut buffer = Vec::new();
        write_by_tags_report(&mut buffer, &[tagged, untagged]).unwrap();
        let report = String::from_utf8(buffer).unwrap();

        let methods_at = report.find("# @methods").unwrap();
        let none_at = report.find("# @None").unwrap();
        assert!(methods_at < none_at);
        assert!(report.contains("@doe2021:"));
    }

    #[test]
    fn run_exports_fixture_database_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mendeley.sqlite");
        let conn = Connection::open(&db_path).unwrap();
        fixtures::seed(&conn);
        drop(conn);

        let output_dir = dir.path().join("out");
        let args = ExportArgs {
            db_path,
            output_dir: output_dir.clone(),
            folder: None,
            include: Include::Both,
            separate: false,
            by_tags: true,
            by_colors: true,
        };
        run(args).unwrap();

        let combined = fs::read_to_string(output_dir.join("Mendeley_annotations.txt")).unwrap();
        assert!(combined.contains("# On Things"));
        assert!(combined.contains("- @smith2020"));
        // fixture PDF path does not exist, so placements fall back to No TOC
        assert!(combined.contains("In Chapter: No TOC (p. 0)"));

        assert!(output_dir.join("Mendeley_annotations_by_tags.txt").exists());
        assert!(output_dir.join("Mendeley_annotations_by_colors.txt").exists());

        let manifest: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(output_dir.join(MANIFEST_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["counts"]["documents_total"], 2);
        assert_eq!(manifest["counts"]["documents_exported"], 1);
        assert_eq!(manifest["counts"]["documents_skipped"], 1);
        assert_eq!(manifest["counts"]["highlights_exported"], 1);
        assert_eq!(manifest["counts"]["notes_exported"], 1);
        assert!(!manifest["warnings"].as_array().unwrap().is_empty());
    }
}
