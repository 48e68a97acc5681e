//! The ledger is a plain text file, newest record first:
//!
//! ```text
//! 20240115 FrozenLake_1920x1080.jpg Ice on the lake\x3b it\x27s thick.
//! 20240114 Dunes_1920x1080.jpg Sand dunes at dusk.
//! ```
//!
//! Descriptions are escaped so a record always fits on one line and never
//! carries characters that shell or `sed` based tooling would choke on.

use crate::model::WallpaperRecord;
use crate::{Result, SyncError};
use chrono::NaiveDate;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub const DATE_LAYOUT: &str = "%Y%m%d";
const DATE_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerWrite {
    /// The line as written, without its terminator.
    pub line: String,
    /// Whether re-reading the file's first line gave back `line`.
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Date of the newest record. `None` when there is no ledger yet or it
    /// only holds the blank placeholder line.
    pub fn read_last_date(&self) -> Result<Option<NaiveDate>> {
        let Some(first) = self.first_line()? else {
            return Ok(None);
        };
        if first.trim().is_empty() {
            return Ok(None);
        }

        let head: String = first.chars().take(DATE_WIDTH).collect();
        if head.len() != DATE_WIDTH || !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.corrupt(head));
        }
        NaiveDate::parse_from_str(&head, DATE_LAYOUT)
            .map(Some)
            .map_err(|_| self.corrupt(head))
    }

    /// Creates the ledger with a single blank line if it does not exist.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, "\n")?;
        Ok(())
    }

    /// Prepends `record` as the new first line.
    ///
    /// The whole file is rewritten into a sibling temp file which then
    /// replaces the ledger, so a crash leaves either the old or the new
    /// contents behind. A first line that does not read back as written is
    /// reported through `LedgerWrite::verified`, not as an error.
    pub fn append(&self, record: &WallpaperRecord) -> Result<LedgerWrite> {
        let line = format_line(record)?;

        let mut existing = Vec::new();
        match std::fs::File::open(&self.path) {
            Ok(mut file) => {
                file.read_to_end(&mut existing)?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let tmp_path = self.tmp_path();
        let written = write_new_contents(&tmp_path, &line, &existing)
            .and_then(|()| replace_file(&tmp_path, &self.path));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }

        let verified = match self.first_line() {
            Ok(Some(first)) => first == line,
            Ok(None) => false,
            Err(err) => {
                log::warn!("could not re-read ledger {}: {err}", self.path.display());
                false
            }
        };
        if !verified {
            log::warn!(
                "ledger {} first line does not match the record just written",
                self.path.display()
            );
        }

        Ok(LedgerWrite { line, verified })
    }

    /// Every record, newest first. Blank lines are skipped.
    pub fn records(&self) -> Result<Vec<WallpaperRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_line(&line).ok_or_else(|| {
                SyncError::InvalidRecord(format!(
                    "{} line {}: {line:?}",
                    self.path.display(),
                    index + 1
                ))
            })?;
            out.push(record);
        }
        Ok(out)
    }

    fn first_line(&self) -> Result<Option<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut first = String::new();
        BufReader::new(file).read_line(&mut first)?;
        let trimmed = first.trim_end_matches(['\n', '\r']);
        Ok(Some(trimmed.to_string()))
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("ledger");
        self.path.with_file_name(format!("{name}.tmp"))
    }

    fn corrupt(&self, head: String) -> SyncError {
        SyncError::CorruptLedger {
            path: self.path.clone(),
            head,
        }
    }
}

fn write_new_contents(tmp_path: &Path, line: &str, existing: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp_path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.write_all(existing)?;
    file.flush()?;
    file.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Windows refuses to rename over an existing file.
        Err(_) if cfg!(windows) && to.exists() => {
            std::fs::remove_file(to)?;
            std::fs::rename(from, to)
        }
        Err(err) => Err(err),
    }
}

pub fn format_line(record: &WallpaperRecord) -> Result<String> {
    let filename = record.filename.as_str();
    if filename.is_empty() || filename.chars().any(char::is_whitespace) {
        return Err(SyncError::InvalidRecord(format!(
            "file name {filename:?} cannot be stored in the ledger"
        )));
    }
    Ok(format!(
        "{} {} {}",
        record.date.format(DATE_LAYOUT),
        filename,
        escape_description(&record.description)
    ))
}

pub fn parse_line(line: &str) -> Option<WallpaperRecord> {
    let mut fields = line.splitn(3, ' ');
    let date = fields.next()?;
    if date.len() != DATE_WIDTH {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, DATE_LAYOUT).ok()?;
    let filename = fields.next().filter(|f| !f.is_empty())?;
    let description = unescape_description(fields.next().unwrap_or(""));
    Some(WallpaperRecord {
        date,
        filename: filename.to_string(),
        description,
    })
}

pub fn escape_description(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '&' | '\'' | ';' => out.push_str(&format!("\\x{:02x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_description`]. Unknown escapes are kept verbatim.
pub fn unescape_description(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') => {
                let hex: String = chars.clone().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 && byte.is_ascii() => {
                        out.push(byte as char);
                        chars.next();
                        chars.next();
                    }
                    _ => out.push_str("\\x"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
