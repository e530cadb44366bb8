use anyhow::{Context, Result};
use regex::Regex;

/// Mendeley's fixed highlighter palette, hex code to display label.
pub const COLOR_LABELS: [(&str, &str); 8] = [
    ("#fff5ad", "Yellow"),
    ("#dcffb0", "Green"),
    ("#bae2ff", "Blue"),
    ("#d3c2ff", "Purple"),
    ("#ffc4fb", "Pink"),
    ("#ffb5b6", "Red"),
    ("#ffdeb4", "Orange"),
    ("#dbdbdb", "Grey"),
];

/// Normalize a raw color value to lowercase `#rrggbb` form.
/// Values that are not six-digit hex codes are passed through trimmed.
pub fn normalize_color_code(raw: &str) -> Result<String> {
    let hex = Regex::new(r"^#?([0-9a-fA-F]{6})$").context("failed to compile color regex")?;
    let trimmed = raw.trim();

    match hex.captures(trimmed) {
        Some(captures) => Ok(format!("#{}", captures[1].to_ascii_lowercase())),
        None => Ok(trimmed.to_string()),
    }
}

/// Map a raw color value to its palette label, or echo the normalized code
/// back when it is not in the palette.
pub fn color_label(raw: &str) -> Result<String> {
    let code = normalize_color_code(raw)?;
    let label = COLOR_LABELS
        .iter()
        .find(|(hex, _)| *hex == code)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or(code);
    Ok(label)
}

/// Classify a document's highlight colors as `(label, confidence)` pairs,
/// confidence being the fraction of highlights carrying that label.
/// Sorted by descending confidence, label as tie-break.
pub fn color_confidences(raw_colors: &[String]) -> Result<Vec<(String, f64)>> {
    if raw_colors.is_empty() {
        return Ok(Vec::new());
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for raw in raw_colors {
        let label = color_label(raw)?;
        match counts.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    let total = raw_colors.len() as f64;
    let mut confidences: Vec<(String, f64)> = counts
        .into_iter()
        .map(|(label, count)| (label, count as f64 / total))
        .collect();

    confidences.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    Ok(confidences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_hit_is_case_insensitive() {
        assert_eq!(color_label("#FFF5AD").unwrap(), "Yellow");
        assert_eq!(color_label("dcffb0").unwrap(), "Green");
    }

    #[test]
    fn unknown_codes_pass_through_normalized() {
        assert_eq!(color_label("#ABCDEF").unwrap(), "#abcdef");
        assert_eq!(color_label("not-a-color").unwrap(), "not-a-color");
    }

    #[test]
    fn confidences_sum_to_one() {
        let colors = vec![
            "#fff5ad".to_string(),
            "#fff5ad".to_string(),
            "#bae2ff".to_string(),
            "#ffb5b6".to_string(),
        ];
        let confidences = color_confidences(&colors).unwrap();
        let total: f64 = confidences.iter().map(|(_, c)| c).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(confidences[0].0, "Yellow");
        assert!((confidences[0].1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_no_confidences() {
        assert!(color_confidences(&[]).unwrap().is_empty());
    }
}
