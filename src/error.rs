use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch failed for {url}: {detail}")]
    Fetch { url: String, detail: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ledger {path} is corrupt: leading bytes {head:?} are not a YYYYMMDD date")]
    CorruptLedger { path: PathBuf, head: String },

    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid ledger record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
