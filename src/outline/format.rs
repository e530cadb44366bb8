use super::ChapterLocation;

/// Suppress-if-unchanged chapter header for sequential report emission.
/// Remembers the last location actually emitted; a fresh instance is
/// created per export pass.
#[derive(Debug, Default)]
pub struct ChapterFormatter {
    last: Option<ChapterLocation>,
}

impl ChapterFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the formatted chapter block, or an empty string when the
    /// location matches the last emission and `force` is unset. State is
    /// updated only on non-empty output.
    pub fn render(&mut self, location: &ChapterLocation, force: bool, indent: &str) -> String {
        if !force && self.last.as_ref() == Some(location) {
            return String::new();
        }
        let Some(innermost) = location.path.first() else {
            return String::new();
        };

        self.last = Some(location.clone());
        let marker = if location.ambiguous { "[ambig!] " } else { "" };
        format!(
            "\n\n{indent}In chapter: {marker}{} (p. {})\n",
            innermost.title, innermost.pageno
        )
    }
}

/// Same contract as [`ChapterFormatter`], for page headers. `force` lets a
/// chapter change re-anchor the page context even when the page number is
/// unchanged.
#[derive(Debug, Default)]
pub struct PageFormatter {
    last: Option<usize>,
}

impl PageFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, page: usize, force: bool, indent: &str) -> String {
        if !force && self.last == Some(page) {
            return String::new();
        }
        self.last = Some(page);
        format!("\n{indent}Page {page}:\n")
    }
}
