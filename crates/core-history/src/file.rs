//! History file codec.
//!
//! Two formats exist in the wild. The current one is line-oriented,
//! YAML-looking but not YAML:
//!
//! ```text
//! - cmd: echo hi\nthere
//!   when: 1700000000
//!   paths:
//!     - /tmp/file
//! ```
//!
//! with exactly two escapes: backslash doubles itself and a newline
//! becomes `\n`. The legacy format (a `#`-prefixed timestamp comment
//! followed by the command with backslash-continued newlines) is detected
//! by the first non-blank byte of the file and read, never written.
//!
//! Offsets returned by the scanners stay valid only while the snapshot
//! they were computed against is alive; [`FileIdentity`] is how the store
//! notices the underlying file was swapped out.

use std::fs::File;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::HistoryItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `- cmd:` items.
    Current,
    /// fish-1.x style `# <timestamp>` comment blocks.
    Legacy,
}

/// Identity of an on-disk file: device, inode, size, mtime. Offsets into a
/// snapshot survive a reload only when the identity is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub mtime: i64,
}

impl FileIdentity {
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
            size: meta.size(),
            mtime: meta.mtime(),
        })
    }
}

/// An owned snapshot of the history file plus its parsed offsets.
#[derive(Debug, Default)]
pub struct FileContents {
    pub data: Vec<u8>,
    pub format: FileFormat,
    pub identity: FileIdentity,
}

impl Default for FileFormat {
    fn default() -> Self {
        FileFormat::Current
    }
}

impl FileContents {
    /// Snapshot `path`. Returns `None` for missing or empty files.
    pub fn load(path: &Path) -> std::io::Result<Option<Self>> {
        let identity = FileIdentity::of(path);
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        let format = detect_format(&data);
        Ok(Some(Self {
            data,
            format,
            identity: identity.unwrap_or_default(),
        }))
    }

    pub fn decode_item(&self, offset: usize) -> HistoryItem {
        match self.format {
            FileFormat::Current => decode_item_current(&self.data[offset..]),
            FileFormat::Legacy => decode_item_legacy(&self.data[offset..]),
        }
    }

    /// All item offsets in file order, honoring the timestamp cutoff
    /// (0 = no cutoff): items stamped strictly after the cutoff belong to
    /// sessions started later and are skipped.
    pub fn scan_offsets(&self, cutoff_timestamp: i64) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut cursor = 0usize;
        loop {
            let next = match self.format {
                FileFormat::Current => {
                    offset_of_next_item_current(&self.data, &mut cursor, cutoff_timestamp)
                }
                FileFormat::Legacy => offset_of_next_item_legacy(&self.data, &mut cursor),
            };
            match next {
                Some(off) => offsets.push(off),
                None => break,
            }
        }
        offsets
    }
}

/// The first non-blank byte decides: `#` marks the legacy format.
pub fn detect_format(data: &[u8]) -> FileFormat {
    match data.iter().find(|&&b| b != b'\n' && b != b' ' && b != b'\t') {
        Some(b'#') => FileFormat::Legacy,
        _ => FileFormat::Current,
    }
}

fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape_yaml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Serialize one item in the current format.
pub fn append_item(item: &HistoryItem, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(b"- cmd: ");
    buffer.extend_from_slice(escape_yaml(&item.text).as_bytes());
    buffer.push(b'\n');
    buffer.extend_from_slice(format!("  when: {}\n", item.timestamp).as_bytes());
    if !item.required_paths.is_empty() {
        buffer.extend_from_slice(b"  paths:\n");
        for path in &item.required_paths {
            buffer.extend_from_slice(b"    - ");
            buffer.extend_from_slice(escape_yaml(path).as_bytes());
            buffer.push(b'\n');
        }
    }
}

fn line_at(data: &[u8], cursor: usize) -> (&[u8], usize) {
    let rest = &data[cursor..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(nl) => (&rest[..nl], nl + 1),
        None => (rest, rest.len()),
    }
}

fn leading_spaces(line: &[u8]) -> usize {
    line.iter().take_while(|&&b| b == b' ').count()
}

/// Split `key: value`, unescaping both halves.
fn split_key_value(line: &str) -> Option<(String, String)> {
    let colon = line.find(':')?;
    let key = &line[..colon];
    let mut value = &line[colon + 1..];
    if let Some(stripped) = value.strip_prefix(' ') {
        value = stripped;
    }
    Some((unescape_yaml(key), unescape_yaml(value)))
}

fn decode_item_current(data: &[u8]) -> HistoryItem {
    let mut cursor = 0usize;
    let (first, advance) = line_at(data, cursor);
    let first = String::from_utf8_lossy(first);
    let trimmed = first.trim_start();

    let mut item = HistoryItem::default();
    let Some((key, value)) = split_key_value(trimmed) else {
        return item;
    };
    if key != "- cmd" {
        return item;
    }
    item.text = value;
    cursor += advance;

    let mut indent = 0usize;
    loop {
        let (line, advance) = line_at(data, cursor);
        if line.is_empty() && advance == 0 {
            break;
        }
        let this_indent = leading_spaces(line);
        if indent == 0 {
            indent = this_indent;
        }
        if this_indent == 0 || this_indent != indent {
            break;
        }
        let text = String::from_utf8_lossy(&line[this_indent..]).into_owned();
        let Some((key, value)) = split_key_value(&text) else {
            break;
        };
        cursor += advance;

        match key.as_str() {
            "when" => {
                item.timestamp = value.trim().parse::<i64>().unwrap_or(0);
            }
            "paths" => loop {
                let (path_line, advance) = line_at(data, cursor);
                if leading_spaces(path_line) <= indent {
                    break;
                }
                let path_text = String::from_utf8_lossy(path_line).trim_start().to_string();
                let Some(stripped) = path_text.strip_prefix("- ") else {
                    break;
                };
                cursor += advance;
                item.required_paths.push(unescape_yaml(stripped));
            },
            _ => {}
        }
    }
    item
}

fn offset_of_next_item_current(
    data: &[u8],
    cursor: &mut usize,
    cutoff_timestamp: i64,
) -> Option<usize> {
    while *cursor < data.len() {
        let line_start = *cursor;
        let rest = &data[line_start..];
        let newline = rest.iter().position(|&b| b == b'\n')?;
        *cursor = line_start + newline + 1;
        let line = &rest[..newline];

        // Interior lines of an item are indented.
        if line.first() == Some(&b' ') {
            continue;
        }
        if line.len() < 3 {
            continue;
        }
        // Tolerate YAML front matter some tools prepend.
        if line.starts_with(b"%") || line.starts_with(b"---") || line.starts_with(b"...") {
            continue;
        }
        if !line.starts_with(b"- cmd:") {
            continue;
        }

        if cutoff_timestamp != 0 {
            // Peek at the interior lines for a timestamp; an item stamped
            // after the cutoff belongs to a later session. Items are
            // mostly sorted but clock changes mean we keep scanning
            // instead of stopping at the first rejection.
            let mut probe = *cursor;
            let mut stamped_after_cutoff = false;
            while probe < data.len() {
                let (interior, advance) = line_at(data, probe);
                if interior.first() != Some(&b' ') || advance == 0 {
                    break;
                }
                probe += advance;
                *cursor = probe;
                let text = String::from_utf8_lossy(interior);
                let trimmed = text.trim_start();
                if let Some(value) = trimmed.strip_prefix("when:") {
                    if let Ok(when) = value.trim().parse::<i64>() {
                        stamped_after_cutoff = when > cutoff_timestamp;
                    }
                    break;
                }
            }
            if stamped_after_cutoff {
                continue;
            }
        }

        return Some(line_start);
    }
    None
}

fn decode_item_legacy(data: &[u8]) -> HistoryItem {
    let text = String::from_utf8_lossy(data);
    let mut out = String::new();
    let mut timestamp = 0i64;
    let mut was_backslash = false;
    let mut first_char = true;
    let mut timestamp_mode = false;

    for c in text.chars() {
        if c == '\n' {
            if timestamp_mode {
                let digits: String = out.chars().skip_while(|c| !c.is_ascii_digit()).collect();
                if let Ok(when) = digits.trim().parse::<i64>()
                    && when >= 0
                {
                    timestamp = when;
                }
                out.clear();
                timestamp_mode = false;
                continue;
            }
            if !was_backslash {
                break;
            }
        }
        if first_char {
            first_char = false;
            if c == '#' {
                timestamp_mode = true;
            }
        }
        out.push(c);
        was_backslash = c == '\\' && !was_backslash;
    }

    // Strip the backslashes that continued newlines.
    let mut unescaped = String::with_capacity(out.len());
    let mut chars = out.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'\n') {
            continue;
        }
        unescaped.push(c);
    }

    HistoryItem {
        text: unescaped,
        timestamp,
        required_paths: Vec::new(),
    }
}

fn offset_of_next_item_legacy(data: &[u8], cursor: &mut usize) -> Option<usize> {
    if *cursor >= data.len() {
        return None;
    }
    let result = *cursor;
    let mut ignore_newline = false;
    let mut at_line_start = true;
    let mut pos = *cursor;
    let mut complete = false;

    while pos < data.len() {
        let b = data[pos];
        if at_line_start {
            ignore_newline = b == b'#';
            at_line_start = false;
        }
        if b == b'\\' {
            pos += 1; // skip the escaped byte
        } else if b == b'\n' {
            if !ignore_newline {
                pos += 1;
                complete = true;
                break;
            }
            ignore_newline = false;
            at_line_start = true;
        }
        pos += 1;
    }

    if !complete {
        // No trailing newline: incomplete trailing item, ignore it.
        return None;
    }
    *cursor = pos;
    Some(result)
}
