// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Flat-file counter snapshot
//!
//! One record per line, `attributeId relationId counter`, separated by
//! whitespace. This is the format older deployments wrote to `seq_attr.txt`,
//! and it doubles as the compacted snapshot of the counter log.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::core::{Error, FrequencyEntry, FrequencyKey, Result};

/// Snapshot file name inside a store directory
pub const SNAPSHOT_FILE: &str = "seq_attr.txt";

/// Parse one line; `None` for blank lines
pub fn parse_line(line: &str) -> Result<Option<FrequencyEntry>> {
    let mut fields = line.split_whitespace();
    let Some(attr) = fields.next() else {
        return Ok(None);
    };
    let (Some(rel), Some(counter), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::parse(format!(
            "expected 'attributeId relationId counter', got '{}'",
            line.trim()
        )));
    };

    let attribute_id = attr
        .parse()
        .map_err(|e| Error::parse(format!("invalid attribute id '{}': {}", attr, e)))?;
    let relation_id = rel
        .parse()
        .map_err(|e| Error::parse(format!("invalid relation id '{}': {}", rel, e)))?;
    let counter = counter
        .parse()
        .map_err(|e| Error::parse(format!("invalid counter '{}': {}", counter, e)))?;

    Ok(Some(FrequencyEntry {
        relation_id,
        attribute_id,
        counter,
    }))
}

/// Format one entry as a line (without the newline)
pub fn format_entry(entry: &FrequencyEntry) -> String {
    format!(
        "{} {} {}",
        entry.attribute_id, entry.relation_id, entry.counter
    )
}

/// Parse a whole file body, merging duplicate keys by keeping the larger value
pub fn parse(contents: &str) -> Result<Vec<FrequencyEntry>> {
    let mut merged: FxHashMap<FrequencyKey, u64> = FxHashMap::default();
    for (lineno, line) in contents.lines().enumerate() {
        let entry = parse_line(line)
            .map_err(|e| Error::parse(format!("line {}: {}", lineno + 1, e)))?;
        if let Some(entry) = entry {
            let slot = merged.entry(entry.key()).or_insert(0);
            *slot = (*slot).max(entry.counter);
        }
    }

    let mut entries: Vec<FrequencyEntry> = merged
        .into_iter()
        .map(|(key, counter)| FrequencyEntry::new(key, counter))
        .collect();
    entries.sort_by_key(|e| e.key());
    Ok(entries)
}

/// Read a snapshot file; a missing file is an empty snapshot
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<FrequencyEntry>> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => parse(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::store_unavailable(format!(
            "failed to read snapshot {:?}: {}",
            path, e
        ))),
    }
}

/// Atomically replace the snapshot at `path` with `entries`.
///
/// Writes a sibling temp file, fsyncs it, then renames it over the target, so
/// a crash leaves either the old or the new snapshot intact.
pub fn write_file(path: impl AsRef<Path>, entries: &[FrequencyEntry]) -> Result<()> {
    let path = path.as_ref();
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut sorted: Vec<&FrequencyEntry> = entries.iter().filter(|e| e.counter > 0).collect();
    sorted.sort_by_key(|e| e.key());

    let mut body = String::with_capacity(sorted.len() * 16);
    for entry in sorted {
        body.push_str(&format_entry(entry));
        body.push('\n');
    }

    let write_tmp = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()
    };
    write_tmp()
        .map_err(|e| Error::store_unavailable(format!("failed to write snapshot: {}", e)))?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::store_unavailable(format!("failed to install snapshot: {}", e)))?;

    sync_parent_dir(path);
    Ok(())
}

/// Persist a rename by syncing the containing directory
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(dir) = path.parent().and_then(|p| File::open(p).ok()) {
        dir.sync_all().ok();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_line() {
        let entry = parse_line("3 16384 12").unwrap().unwrap();
        assert_eq!(entry.attribute_id, 3);
        assert_eq!(entry.relation_id, 16384);
        assert_eq!(entry.counter, 12);

        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("3\t16384   12  ").unwrap().is_some());
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert!(parse_line("3 16384").is_err());
        assert!(parse_line("3 16384 12 99").is_err());
        assert!(parse_line("x 16384 12").is_err());
        assert!(parse_line("3 16384 -1").is_err());
    }

    #[test]
    fn test_format_matches_legacy_order() {
        let entry = FrequencyEntry::new(FrequencyKey::new(16384, 3), 12);
        assert_eq!(format_entry(&entry), "3 16384 12");
    }

    #[test]
    fn test_parse_merges_duplicates() {
        let entries = parse("1 10 4\n2 10 1\n1 10 9\n\n").unwrap();
        assert_eq!(
            entries,
            vec![
                FrequencyEntry::new(FrequencyKey::new(10, 1), 9),
                FrequencyEntry::new(FrequencyKey::new(10, 2), 1),
            ]
        );
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse("1 10 4\nbad line here now\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let entries = vec![
            FrequencyEntry::new(FrequencyKey::new(20, 1), 5),
            FrequencyEntry::new(FrequencyKey::new(10, 2), 7),
            FrequencyEntry::new(FrequencyKey::new(30, 1), 0),
        ];

        write_file(&path, &entries).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2 10 7\n1 20 5\n");
        assert!(!dir.path().join("seq_attr.txt.tmp").exists());

        let read = read_file(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].counter, 7);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(read_file(dir.path().join("missing.txt")).unwrap().is_empty());
    }
}
