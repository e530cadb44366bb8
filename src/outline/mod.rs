//! Outline resolution and chapter lookup.
//!
//! Converts a document's raw bookmark hierarchy into a page-indexed chapter
//! arena and answers point queries of the form "which chapter(s) contain
//! this page". Resolution failures degrade to diagnostics; the only
//! caller-visible error is a lookup with a page number below 1.

mod dest;
mod format;

pub use format::{ChapterFormatter, PageFormatter};

use anyhow::{Result, ensure};

use crate::pdf::PdfDocument;

/// One resolved outline entry. `pageno` is 0-based; `parent_index` points
/// at the nearest preceding entry one level up, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: usize,
    pub title: String,
    pub pageno: usize,
    pub parent_index: Option<usize>,
}

/// The human-addressed form of a [`TocEntry`]: page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    pub level: usize,
    pub title: String,
    pub pageno: usize,
}

/// A lookup result: the chapter path from innermost to outermost, plus a
/// flag marking placements where a nested chapter starts exactly on the
/// queried page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterLocation {
    pub path: Vec<ChapterEntry>,
    pub ambiguous: bool,
}

/// Immutable page-indexed chapter structure, built once per document.
#[derive(Debug, Default)]
pub struct OutlineIndex {
    toc: Vec<TocEntry>,
    // (0-based pageno, arena index), sorted ascending by pageno with
    // traversal order preserved among equal pages.
    page_keys: Vec<(usize, usize)>,
    diagnostics: Vec<String>,
}

impl OutlineIndex {
    /// Build the index from a document's raw outline. Never fails: a
    /// missing outline or unresolvable entries only add diagnostics.
    pub fn build(doc: &PdfDocument) -> Self {
        let mut resolved = Vec::new();
        let mut diagnostics = Vec::new();

        match doc.raw_outline() {
            None => diagnostics.push("document has no outline".to_string()),
            Some(entries) => {
                for entry in entries {
                    match dest::resolve_entry_page(doc, &entry) {
                        Ok(pageno) => {
                            resolved.push((entry.level, sanitize_title(&entry.title), pageno));
                        }
                        Err(err) => diagnostics.push(format!(
                            "outline entry '{}' dropped: {err:#}",
                            sanitize_title(&entry.title)
                        )),
                    }
                }
            }
        }

        Self::assemble(resolved, diagnostics)
    }

    /// Build directly from resolved `(level, title, 0-based pageno)`
    /// triples in traversal order.
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, String, usize)>) -> Self {
        Self::assemble(entries.into_iter().collect(), Vec::new())
    }

    fn assemble(entries: Vec<(usize, String, usize)>, mut diagnostics: Vec<String>) -> Self {
        let mut toc: Vec<TocEntry> = entries
            .into_iter()
            .map(|(level, title, pageno)| TocEntry {
                level: level.max(1),
                title,
                pageno,
                parent_index: None,
            })
            .collect();

        // Back-fill parent links from per-level latest indices.
        let mut latest: Vec<Option<usize>> = Vec::new();
        for index in 0..toc.len() {
            let level = toc[index].level;
            if latest.len() < level {
                latest.resize(level, None);
            }
            toc[index].parent_index = if level >= 2 { latest[level - 2] } else { None };
            latest[level - 1] = Some(index);
        }

        // Outlines are normally authored in page-increasing order; when one
        // is not, re-sort the key array only. Arena order, and with it the
        // parent links and last-wins tie-break, stays untouched.
        let mut page_keys: Vec<(usize, usize)> = toc
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.pageno, index))
            .collect();
        if page_keys.windows(2).any(|pair| pair[0].0 > pair[1].0) {
            diagnostics.push("outline page order not monotonic; keys re-sorted for lookup".to_string());
            page_keys.sort_by_key(|&(pageno, _)| pageno);
        }

        OutlineIndex {
            toc,
            page_keys,
            diagnostics,
        }
    }

    /// Find the chapter(s) containing a 1-based page number.
    ///
    /// With `full_path`, the result walks parent links from the innermost
    /// enclosing chapter outward; otherwise only the innermost entry is
    /// returned. Always yields a non-empty path: an empty index answers
    /// with a synthetic `No TOC` chapter, and pages before the first
    /// declared chapter answer with `[COVER]`.
    pub fn lookup(&self, pageno: usize, full_path: bool) -> Result<ChapterLocation> {
        ensure!(pageno >= 1, "page number must be 1-based, got {pageno}");

        if self.toc.is_empty() {
            return Ok(ChapterLocation {
                path: vec![ChapterEntry {
                    level: 1,
                    title: "No TOC".to_string(),
                    pageno: 0,
                }],
                ambiguous: false,
            });
        }

        let target = pageno - 1;
        let upper = self.page_keys.partition_point(|&(page, _)| page <= target);
        if upper == 0 {
            // Front matter: the page precedes every declared chapter.
            return Ok(ChapterLocation {
                path: vec![ChapterEntry {
                    level: 1,
                    title: "[COVER]".to_string(),
                    pageno: 1,
                }],
                ambiguous: false,
            });
        }

        let (found_page, found_index) = self.page_keys[upper - 1];
        // A nested chapter starting exactly on the queried page could also
        // be read as still belonging to its parent.
        let ambiguous = found_page == target && self.toc[found_index].level != 1;

        let mut path = Vec::new();
        let mut cursor = Some(found_index);
        while let Some(index) = cursor {
            let entry = &self.toc[index];
            path.push(ChapterEntry {
                level: entry.level,
                title: entry.title.clone(),
                pageno: entry.pageno + 1,
            });
            if !full_path {
                break;
            }
            cursor = entry.parent_index;
        }

        Ok(ChapterLocation { path, ambiguous })
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.toc
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.toc.is_empty()
    }

    pub fn len(&self) -> usize {
        self.toc.len()
    }
}

/// Control characters below U+0020 corrupt single-line display.
fn sanitize_title(title: &str) -> String {
    title.chars().filter(|ch| *ch >= ' ').collect()
}
