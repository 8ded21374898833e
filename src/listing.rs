//! Directory-listing extraction.
//!
//! The server renders directory contents as HTML; each image entry repeats a
//! fixed fragment exposing the stream path, the display name and a
//! human-readable size. Only entries typed as images are extracted -
//! directories and other files never reach the thumbnail grid. A malformed
//! entry is skipped without aborting the rest of the listing.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker opening an image entry. Entry blocks can span multiple lines.
const IMAGE_ITEM_MARKER: &str = r#"<div class="file-item" data-type="image">"#;
const ITEM_MARKER: &str = r#"<div class="file-item""#;

/// One parsed listing entry. `path` is the stable identity key for caching
/// and for delete/download targeting. It is stored exactly as found in the
/// markup - the server already percent-encoded it, so decoding or re-encoding
/// it would break every subsequent request for this entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub is_dir: bool,
    pub path: String,
    pub file_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    Kb,
    Mb,
    Gb,
}

impl SizeUnit {
    pub fn from_label(label: &str) -> Option<SizeUnit> {
        match label {
            "B" => Some(SizeUnit::B),
            "KB" => Some(SizeUnit::Kb),
            "MB" => Some(SizeUnit::Mb),
            "GB" => Some(SizeUnit::Gb),
            _ => None,
        }
    }

    pub fn multiplier(&self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::Kb => 1024,
            SizeUnit::Mb => 1024 * 1024,
            SizeUnit::Gb => 1024 * 1024 * 1024,
        }
    }
}

/// Parse a `"{number} {unit}"` size string into bytes, rounding down.
///
/// Any malformed input (wrong token count, non-numeric value, unknown unit)
/// yields 0 - a bad size must not drop the entry.
pub fn parse_size(size_str: &str) -> u64 {
    let parts: Vec<&str> = size_str.trim().split(' ').collect();
    if parts.len() != 2 {
        return 0;
    }

    let value: f64 = match parts[0].parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };

    match SizeUnit::from_label(parts[1]) {
        Some(unit) => (value * unit.multiplier() as f64) as u64,
        None => 0,
    }
}

/// Extract image entries from a listing body, in document order.
///
/// Never fails: a block missing one of its fields is skipped and scanning
/// continues with the next block.
pub fn parse_listing(html: &str) -> Vec<FileRecord> {
    let path_re = Regex::new(r#"src="/stream/([^"]+)""#).unwrap();
    let name_re = Regex::new(r#"<a href="/view/[^"]+">([^<]+)</a>"#).unwrap();
    let size_re = Regex::new(r#"<div class="file-size">([^<]+)</div>"#).unwrap();

    let mut records = Vec::new();

    for chunk in html.split(IMAGE_ITEM_MARKER).skip(1) {
        // Cap the block at the next entry so one malformed block cannot
        // swallow its neighbour's fields.
        let block = match chunk.find(ITEM_MARKER) {
            Some(end) => &chunk[..end],
            None => chunk,
        };

        let path = path_re.captures(block).and_then(|cap| cap.get(1));
        let name = name_re.captures(block).and_then(|cap| cap.get(1));
        let size_str = size_re.captures(block).and_then(|cap| cap.get(1));

        let (Some(path), Some(name), Some(size_str)) = (path, name, size_str) else {
            log::debug!("Skipping malformed listing entry");
            continue;
        };

        records.push(FileRecord {
            name: html_escape::decode_html_entities(name.as_str()).to_string(),
            is_dir: false,
            // Keep the percent-encoded path byte-for-byte
            path: path.as_str().to_string(),
            file_type: Some("image".to_string()),
            size: parse_size(size_str.as_str()),
        });
    }

    records
}
