use std::io::{BufWriter, Write};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::TocArgs;
use crate::outline::OutlineIndex;
use crate::pdf::PdfDocument;

const PAGE_COLUMN: usize = 80;

pub fn run(args: TocArgs) -> Result<()> {
    let pdf = PdfDocument::open(&args.pdf_path)?;
    let index = OutlineIndex::build(&pdf);

    info!(
        path = %args.pdf_path.display(),
        pages = pdf.page_count(),
        entries = index.len(),
        "inspecting outline"
    );
    for diagnostic in index.diagnostics() {
        warn!(diagnostic = %diagnostic, "outline diagnostic");
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for entry in index.entries() {
        writeln!(out, "{}", format_line(entry, args.padding))?;
    }
    out.flush()?;

    Ok(())
}

/// One aligned line per entry: indented title, padding run, 1-based page,
/// and the parent's arena slot for structure debugging.
fn format_line(entry: &crate::outline::TocEntry, padding: char) -> String {
    let indent = "  ".repeat(entry.level.saturating_sub(1));
    let page = (entry.pageno + 1).to_string();
    let parent = match entry.parent_index {
        Some(index) => index.to_string(),
        None => "-".to_string(),
    };

    let head = format!("{indent}{}", entry.title);
    let used = head.chars().count() + page.chars().count();
    let fill = PAGE_COLUMN.saturating_sub(used).max(1);

    format!("{head}{}{page} (->[{parent}])", padding.to_string().repeat(fill))
}
