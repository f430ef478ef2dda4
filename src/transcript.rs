//! Raw session transcripts and their persistence.
//!
//! A transcript is a header followed by one block per executed command. It is
//! written once, atomically, after the job succeeded.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::HarvestError;
use crate::job::Target;
use crate::session::ReadStatus;
use crate::vendor::Vendor;

/// Characters replaced by `_` in file name components.
static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| match Regex::new(r"[:/\\ ]") {
    Ok(re) => re,
    Err(err) => panic!("invalid UNSAFE_FILE_CHARS regex: {err}"),
});

/// Output of one command, in the order it was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    /// Position of the command in the vendor command list.
    pub index: usize,
    pub command: String,
    pub output: String,
    pub status: ReadStatus,
}

/// Captured text of one session with one device.
#[derive(Debug, Clone)]
pub struct Transcript {
    target: Target,
    vendor: Vendor,
    started_at: DateTime<Local>,
    blocks: Vec<CommandBlock>,
}

impl Transcript {
    pub fn new(target: &Target, vendor: Vendor, started_at: DateTime<Local>) -> Self {
        Self {
            target: target.clone(),
            vendor,
            started_at,
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, index: usize, command: &str, output: String, status: ReadStatus) {
        self.blocks.push(CommandBlock {
            index,
            command: command.to_string(),
            output,
            status,
        });
    }

    pub fn blocks(&self) -> &[CommandBlock] {
        &self.blocks
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// File name for this transcript: `name__address__vendor__protocol__HHMMSS.txt`.
    pub fn file_name(&self) -> String {
        format!(
            "{}__{}__{}__{}__{}.txt",
            sanitize(&self.target.name),
            sanitize(&self.target.address),
            self.vendor,
            self.target.protocol,
            self.started_at.format("%H%M%S")
        )
    }

    /// Writes the rendered transcript into `dir` atomically.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, HarvestError> {
        let path = dir.join(self.file_name());
        write_atomic(&path, self.to_string().as_bytes()).map_err(|source| {
            HarvestError::Persist {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "### ASSET={} IP={} VENDOR={} PROTOCOL={} TIME={} ###\n\n",
            self.target.name,
            self.target.address,
            self.vendor,
            self.target.protocol,
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        for block in &self.blocks {
            write!(f, "\n\n==== CMD: {} ====\n{}", block.command, block.output)?;
        }
        Ok(())
    }
}

/// Makes a value safe to use as a file name component.
pub fn sanitize(value: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(value.trim(), "_").into_owned()
}

/// Writes `data` to a temporary file next to `path`, then renames it over `path`.
///
/// Readers never observe a half-written transcript.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-collect-")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
