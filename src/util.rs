use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

/// Greedy word wrap with a hanging indent on continuation lines.
/// Tabs in the indent count as one column.
pub fn wrap_text(text: &str, width: usize, subsequent_indent: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut line_len = 0_usize;

    for word in words {
        if line_len == 0 {
            out.push_str(word);
            line_len = word.chars().count();
            continue;
        }

        if line_len + 1 + word.chars().count() > width {
            out.push('\n');
            out.push_str(subsequent_indent);
            out.push_str(word);
            line_len = subsequent_indent.chars().count() + word.chars().count();
        } else {
            out.push(' ');
            out.push_str(word);
            line_len += 1 + word.chars().count();
        }
    }

    out
}

pub fn sanitize_filename(name: &str) -> Result<String> {
    let disallowed = Regex::new(r"[^A-Za-z0-9._-]+").context("failed to compile filename regex")?;
    let cleaned = disallowed.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('_').to_string();

    if cleaned.is_empty() {
        Ok("untitled".to_string())
    } else {
        Ok(cleaned)
    }
}
