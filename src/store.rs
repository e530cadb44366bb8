//! Read-only access to a Mendeley desktop SQLite database: documents,
//! tags, sticky notes, and highlight placements. Highlight *text* lives in
//! the page content and is out of scope here; highlight records carry
//! placement and color only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use rusqlite::{Connection, OpenFlags, params};

/// Decided when the record is read, never inferred later from value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Highlight,
    Note,
}

impl AnnotationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlight => "highlight",
            Self::Note => "note",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub citation_key: String,
    pub title: String,
    pub pdf_path: Option<PathBuf>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnnotationRecord {
    pub kind: AnnotationKind,
    /// 1-based page number as stored by Mendeley.
    pub page: usize,
    /// Note text; empty for highlights.
    pub text: String,
    /// Raw color value, usually a hex code from the Mendeley palette.
    pub color: String,
    pub author: Option<String>,
    pub ctime: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub documents: i64,
    pub notes: i64,
    pub highlights: i64,
}

pub struct MendeleyStore {
    conn: Connection,
}

impl MendeleyStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open Mendeley database: {}", path.display()))?;
        Ok(MendeleyStore { conn })
    }

    #[cfg(test)]
    pub fn from_connection(conn: Connection) -> Self {
        MendeleyStore { conn }
    }

    /// Documents with their citation key, title, tags, and local PDF path,
    /// optionally restricted to one Mendeley folder.
    pub fn documents(&self, folder: Option<&str>) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();

        let mut collect = |statement: &mut rusqlite::Statement<'_>,
                           bind: &[&dyn rusqlite::ToSql]|
         -> Result<Vec<(i64, Option<String>, Option<String>)>> {
            let rows = statement
                .query_map(bind, |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })
                .context("failed to query documents")?;
            let mut raw = Vec::new();
            for row in rows {
                raw.push(row.context("failed to read document row")?);
            }
            Ok(raw)
        };

        let raw = match folder {
            Some(name) => {
                let mut statement = self.conn.prepare(
                    "
                    SELECT d.id, d.citationKey, d.title
                    FROM Documents d
                    JOIN DocumentFolders df ON df.documentId = d.id
                    JOIN Folders f ON f.id = df.folderId
                    WHERE f.name = ?1
                    ORDER BY d.id
                    ",
                )?;
                collect(&mut statement, &[&name])?
            }
            None => {
                let mut statement = self.conn.prepare(
                    "SELECT d.id, d.citationKey, d.title FROM Documents d ORDER BY d.id",
                )?;
                collect(&mut statement, &[])?
            }
        };

        for (id, citation_key, title) in raw {
            records.push(DocumentRecord {
                id,
                citation_key: citation_key
                    .filter(|key| !key.is_empty())
                    .unwrap_or_else(|| format!("doc{id}")),
                title: title.unwrap_or_else(|| "Untitled".to_string()),
                pdf_path: self.document_pdf_path(id)?,
                tags: self.document_tags(id)?,
            });
        }

        Ok(records)
    }

    fn document_pdf_path(&self, doc_id: i64) -> Result<Option<PathBuf>> {
        let url: Option<String> = self
            .conn
            .query_row(
                "
                SELECT Files.localUrl
                FROM Files
                JOIN DocumentFiles ON DocumentFiles.hash = Files.hash
                WHERE DocumentFiles.documentId = ?1
                LIMIT 1
                ",
                params![doc_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("failed to query document file")?
            .flatten();

        Ok(url.as_deref().and_then(local_url_to_path))
    }

    fn document_tags(&self, doc_id: i64) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT tag FROM DocumentTags WHERE documentId = ?1 ORDER BY tag")?;
        let rows = statement
            .query_map(params![doc_id], |row| row.get::<_, String>(0))
            .context("failed to query document tags")?;

        let mut tags = Vec::new();
        for tag in rows {
            tags.push(tag.context("failed to read tag row")?);
        }
        Ok(tags)
    }

    /// Sticky notes for one document, in page order.
    pub fn notes(&self, doc_id: i64) -> Result<Vec<AnnotationRecord>> {
        let mut statement = self.conn.prepare(
            "
            SELECT page, note, color, author, modifiedTime
            FROM FileNotes
            WHERE documentId = ?1
            ORDER BY page, id
            ",
        )?;
        let rows = statement
            .query_map(params![doc_id], |row| {
                Ok(AnnotationRecord {
                    kind: AnnotationKind::Note,
                    page: row.get::<_, i64>(0)?.max(1) as usize,
                    text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    color: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    author: row.get(3)?,
                    ctime: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })
            .context("failed to query notes")?;

        let mut notes = Vec::new();
        for note in rows {
            notes.push(note.context("failed to read note row")?);
        }
        Ok(notes)
    }

    /// Highlight placements for one document, in page order. Multi-rect
    /// highlights collapse to their first page.
    pub fn highlights(&self, doc_id: i64) -> Result<Vec<AnnotationRecord>> {
        let mut statement = self.conn.prepare(
            "
            SELECT MIN(FileHighlightRects.page) AS page,
                   FileHighlights.color,
                   FileHighlights.createdTime,
                   FileHighlights.author
            FROM FileHighlights
            JOIN FileHighlightRects
              ON FileHighlightRects.highlightId = FileHighlights.id
            WHERE FileHighlights.documentId = ?1
            GROUP BY FileHighlights.id
            ORDER BY page, FileHighlights.id
            ",
        )?;
        let rows = statement
            .query_map(params![doc_id], |row| {
                Ok(AnnotationRecord {
                    kind: AnnotationKind::Highlight,
                    page: row.get::<_, i64>(0)?.max(1) as usize,
                    text: String::new(),
                    color: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    author: row.get(2)?,
                    ctime: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })
            .context("failed to query highlights")?;

        let mut highlights = Vec::new();
        for highlight in rows {
            highlights.push(highlight.context("failed to read highlight row")?);
        }
        Ok(highlights)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            documents: self.count("SELECT COUNT(*) FROM Documents")?,
            notes: self.count("SELECT COUNT(*) FROM FileNotes")?,
            highlights: self.count("SELECT COUNT(*) FROM FileHighlights")?,
        })
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let count = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("failed to run count query: {sql}"))?;
        Ok(count)
    }
}

/// Mendeley stores PDF locations as percent-encoded `file://` URLs.
fn local_url_to_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file://")?;
    let decoded = percent_decode_str(rest).decode_utf8().ok()?;
    Some(PathBuf::from(decoded.into_owned()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rusqlite::Connection;

    /// Minimal slice of the Mendeley desktop schema with two documents:
    /// `smith2020` (tagged, in a folder, one note and one highlight) and an
    /// untagged document with no annotations.
    pub(crate) fn seed(conn: &Connection) {
        conn.execute_batch(
            "
            CREATE TABLE Documents (id INTEGER PRIMARY KEY, citationKey TEXT, title TEXT);
            CREATE TABLE DocumentTags (documentId INTEGER, tag TEXT);
            CREATE TABLE Folders (id INTEGER PRIMARY KEY, name TEXT);
            CREATE TABLE DocumentFolders (documentId INTEGER, folderId INTEGER);
            CREATE TABLE Files (hash TEXT PRIMARY KEY, localUrl TEXT);
            CREATE TABLE DocumentFiles (documentId INTEGER, hash TEXT);
            CREATE TABLE FileNotes (
                id INTEGER PRIMARY KEY, documentId INTEGER, page INTEGER,
                note TEXT, color TEXT, author TEXT, modifiedTime TEXT);
            CREATE TABLE FileHighlights (
                id INTEGER PRIMARY KEY, documentId INTEGER, color TEXT,
                createdTime TEXT, author TEXT);
            CREATE TABLE FileHighlightRects (
                highlightId INTEGER, page INTEGER,
                x1 REAL, y1 REAL, x2 REAL, y2 REAL);

            INSERT INTO Documents VALUES (1, 'smith2020', 'On Things');
            INSERT INTO Documents VALUES (2, NULL, 'Untagged Paper');
            INSERT INTO DocumentTags VALUES (1, 'methods');
            INSERT INTO DocumentTags VALUES (1, 'classic');
            INSERT INTO Folders VALUES (10, 'thesis');
            INSERT INTO DocumentFolders VALUES (1, 10);
            INSERT INTO Files VALUES ('h1', 'file:///papers/On%20Things.pdf');
            INSERT INTO DocumentFiles VALUES (1, 'h1');
            INSERT INTO FileNotes VALUES
                (1, 1, 3, 'check derivation', '#fff5ad', 'me', '2020-05-01T10:00:00Z');
            INSERT INTO FileHighlights VALUES (1, 1, '#bae2ff', '2020-05-02T09:00:00Z', 'me');
            INSERT INTO FileHighlightRects VALUES (1, 6, 0, 0, 1, 1);
            INSERT INTO FileHighlightRects VALUES (1, 7, 0, 0, 1, 1);
            ",
        )
        .unwrap();
    }
}
