//! Thin wrapper around `lopdf` exposing the pieces the outline engine needs:
//! ordered page enumeration, the raw outline tree, and the two resolution
//! primitives (one-hop dereference and named-destination lookup).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use lopdf::{Dictionary, Object, ObjectId};

const MAX_OUTLINE_DEPTH: usize = 64;
const MAX_OUTLINE_SIBLINGS: usize = 10_000;
const MAX_NAME_TREE_DEPTH: usize = 16;

/// One raw outline entry as declared by the document, before any
/// destination resolution. `level` starts at 1 for top-level bookmarks.
#[derive(Debug, Clone)]
pub struct RawOutlineEntry {
    pub level: usize,
    pub title: String,
    pub dest: Option<Object>,
    pub action: Option<Object>,
}

pub struct PdfDocument {
    doc: lopdf::Document,
    page_ids: Vec<ObjectId>,
    page_index: HashMap<ObjectId, usize>,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let doc = lopdf::Document::load(path)
            .with_context(|| format!("failed to parse PDF: {}", path.display()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: lopdf::Document) -> Self {
        // get_pages keys are 1-based and already in document order.
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        let page_index = page_ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();

        PdfDocument {
            doc,
            page_ids,
            page_index,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// 0-based sequence position of a page object, if it is a page.
    pub fn page_index(&self, id: ObjectId) -> Option<usize> {
        self.page_index.get(&id).copied()
    }

    /// The document's raw outline entries in traversal order, or `None`
    /// when the catalog declares no outline.
    pub fn raw_outline(&self) -> Option<Vec<RawOutlineEntry>> {
        let catalog = self.catalog().ok()?;
        let outlines = self.deref_dict(catalog.get(b"Outlines").ok()?).ok()?;
        let first = match outlines.get(b"First").ok()? {
            Object::Reference(id) => *id,
            _ => return None,
        };

        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        self.walk_outline(first, 1, &mut visited, &mut entries);
        Some(entries)
    }

    fn walk_outline(
        &self,
        first_id: ObjectId,
        level: usize,
        visited: &mut HashSet<ObjectId>,
        entries: &mut Vec<RawOutlineEntry>,
    ) {
        if level > MAX_OUTLINE_DEPTH {
            return;
        }

        let mut current = Some(first_id);
        let mut siblings = 0;

        while let Some(node_id) = current {
            if !visited.insert(node_id) || siblings >= MAX_OUTLINE_SIBLINGS {
                break;
            }
            siblings += 1;

            let Ok(node) = self.doc.get_dictionary(node_id) else {
                break;
            };

            let title = node
                .get(b"Title")
                .ok()
                .and_then(|obj| self.resolve_once(obj).ok())
                .and_then(|obj| match obj {
                    Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
                    _ => None,
                })
                .unwrap_or_default();

            entries.push(RawOutlineEntry {
                level,
                title,
                dest: node.get(b"Dest").ok().cloned(),
                action: node.get(b"A").ok().cloned(),
            });

            if let Ok(Object::Reference(child_id)) = node.get(b"First") {
                self.walk_outline(*child_id, level + 1, visited, entries);
            }

            current = match node.get(b"Next") {
                Ok(Object::Reference(next_id)) => Some(*next_id),
                _ => None,
            };
        }
    }

    /// Follow a single level of indirection. Non-references pass through.
    pub fn resolve_once<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        match obj {
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .with_context(|| format!("failed to dereference object {:?}", id)),
            other => Ok(other),
        }
    }

    /// Look up a named destination in the catalog's `/Names -> /Dests` name
    /// tree, falling back to the legacy `/Dests` dictionary.
    pub fn named_destination(&self, name: &str) -> Result<Object> {
        let catalog = self.catalog()?;

        if let Ok(names) = catalog.get(b"Names") {
            if let Ok(names) = self.deref_dict(names) {
                if let Ok(dests) = names.get(b"Dests") {
                    if let Ok(dests) = self.deref_dict(dests) {
                        if let Some(found) = self.lookup_name_tree(dests, name, 0) {
                            return Ok(found);
                        }
                    }
                }
            }
        }

        if let Ok(dests) = catalog.get(b"Dests") {
            if let Ok(dests) = self.deref_dict(dests) {
                if let Ok(found) = dests.get(name.as_bytes()) {
                    let found = self.resolve_once(found)?;
                    return Ok(found.clone());
                }
            }
        }

        bail!("named destination '{}' not found", name);
    }

    fn lookup_name_tree(&self, node: &Dictionary, name: &str, depth: usize) -> Option<Object> {
        if depth >= MAX_NAME_TREE_DEPTH {
            return None;
        }

        if let Ok(Object::Array(pairs)) = node.get(b"Names").map(|obj| self.follow(obj)) {
            for pair in pairs.chunks(2) {
                let [key, value] = pair else { continue };
                if let Object::String(bytes, _) = key {
                    if decode_pdf_string(bytes) == name {
                        return Some(self.follow(value).clone());
                    }
                }
            }
        }

        if let Ok(Object::Array(kids)) = node.get(b"Kids").map(|obj| self.follow(obj)) {
            for kid in kids {
                if let Ok(kid) = self.follow(kid).as_dict() {
                    if let Some(found) = self.lookup_name_tree(kid, name, depth + 1) {
                        return Some(found);
                    }
                }
            }
        }

        None
    }

    fn catalog(&self) -> Result<&Dictionary> {
        let root = self
            .doc
            .trailer
            .get(b"Root")
            .context("document trailer has no Root entry")?;
        self.resolve_once(root)?
            .as_dict()
            .context("document catalog is not a dictionary")
    }

    fn deref_dict<'a>(&'a self, obj: &'a Object) -> Result<&'a Dictionary> {
        self.resolve_once(obj)?
            .as_dict()
            .context("expected a dictionary")
    }

    /// Infallible one-hop follow used where a broken reference should read
    /// as "not the shape we wanted" rather than an error.
    fn follow<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }
}

/// Decode a PDF text string: UTF-16BE when the BOM is present, otherwise
/// UTF-8 with a Latin-1 fallback.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}


#[cfg(test)]
mod tests {
    use super::testdoc::{DocBuilder, Target};
    use super::*;

    #[test]
    fn page_index_follows_document_order() {
        let builder = DocBuilder::new(3);
        let first = builder.page_ids[0];
        let last = builder.page_ids[2];
        let pdf = PdfDocument::from_document(builder.doc);

        assert_eq!(pdf.page_count(), 3);
        assert_eq!(pdf.page_index(first), Some(0));
        assert_eq!(pdf.page_index(last), Some(2));
        assert_eq!(pdf.page_index((9999, 0)), None);
    }

    #[test]
    fn raw_outline_reports_nesting_levels_in_traversal_order() {
        let mut builder = DocBuilder::new(5);
        let d0 = builder.direct_dest(0);
        let d1 = builder.direct_dest(1);
        let d2 = builder.direct_dest(2);
        let d3 = builder.direct_dest(4);
        builder.set_outline(vec![
            (1, "Intro", Target::Dest(d0)),
            (1, "Methods", Target::Dest(d1)),
            (2, "Data", Target::Dest(d2)),
            (1, "Results", Target::Dest(d3)),
        ]);

        let pdf = PdfDocument::from_document(builder.doc);
        let entries = pdf.raw_outline().expect("outline present");

        let shape: Vec<(usize, &str)> = entries
            .iter()
            .map(|entry| (entry.level, entry.title.as_str()))
            .collect();
        assert_eq!(
            shape,
            vec![(1, "Intro"), (1, "Methods"), (2, "Data"), (1, "Results")]
        );
        assert!(entries.iter().all(|entry| entry.dest.is_some()));
    }

    #[test]
    fn missing_outline_yields_none() {
        let builder = DocBuilder::new(2);
        let pdf = PdfDocument::from_document(builder.doc);
        assert!(pdf.raw_outline().is_none());
    }

    #[test]
    fn named_destination_resolves_through_name_tree() {
        let mut builder = DocBuilder::new(2);
        let dest = builder.direct_dest(1);
        builder.set_name_tree_dest("chapter.one", dest);

        let pdf = PdfDocument::from_document(builder.doc);
        let found = pdf.named_destination("chapter.one").unwrap();
        assert!(matches!(found, Object::Array(_)));
        assert!(pdf.named_destination("missing").is_err());
    }

    #[test]
    fn named_destination_falls_back_to_legacy_dests() {
        let mut builder = DocBuilder::new(2);
        let dest = builder.direct_dest(0);
        builder.set_legacy_named_dest("legacy", dest);

        let pdf = PdfDocument::from_document(builder.doc);
        let found = pdf.named_destination("legacy").unwrap();
        assert!(matches!(found, Object::Array(_)));
    }

    #[test]
    fn decode_pdf_string_handles_utf16_bom() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42];
        assert_eq!(decode_pdf_string(&bytes), "AB");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }
}
