//! Binary patch stream assembly.
//!
//! Wire format (big endian):
//!
//! ```text
//! header  : magic "PFLP", version u8 = 1
//! entry   : kind u8        1 = modified, 2 = deleted
//!           path u32 len + UTF-8 bytes (repository path)
//!   modified only:
//!           content u64 len + raw bytes
//! trailer : kind u8 = 0    end-of-stream
//! ```
//!
//! Entries are emitted in ChangeSet order, so two assemblies over an
//! unchanged set are byte-identical. A resource whose local file no longer
//! exists becomes a `Deleted` entry; unreadable content fails the whole
//! assembly. The trailer is written and the sink flushed exactly once, even
//! when entry writing fails partway.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::changeset::ChangeSet;
use crate::core::errors::RunError;

const MAGIC: &[u8; 4] = b"PFLP";
const VERSION: u8 = 1;

const KIND_END: u8 = 0;
const KIND_MODIFIED: u8 = 1;
const KIND_DELETED: u8 = 2;

/// Entry counts reported back for user-facing confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub modified: usize,
    pub deleted: usize,
}

impl PatchSummary {
    pub fn describe(&self) -> String {
        match (self.modified, self.deleted) {
            (m, 0) => format!("{m} new/modified file(s)"),
            (0, d) => format!("{d} deleted file(s)"),
            (m, d) => format!("{m} new/modified file(s), {d} deleted file(s)"),
        }
    }
}

/// Serializes the change set into `sink`. The trailer and flush are
/// attempted even on failure, and the first error wins (finalize, then
/// propagate).
pub fn assemble<W: Write>(change_set: &ChangeSet, sink: W) -> Result<PatchSummary, RunError> {
    let mut writer = BufWriter::new(sink);

    let body = write_entries(change_set, &mut writer);
    let finalized = finalize(&mut writer);

    let summary = body.map_err(RunError::PatchIo)?;
    finalized.map_err(RunError::PatchIo)?;
    Ok(summary)
}

/// Assembles into a named temporary file, the artifact the upload stage
/// streams to the server.
pub fn assemble_to_temp(change_set: &ChangeSet) -> Result<(NamedTempFile, PatchSummary), RunError> {
    let mut artifact = NamedTempFile::with_prefix("pfl-patch-").map_err(RunError::PatchIo)?;
    let summary = assemble(change_set, artifact.as_file_mut())?;
    debug!(
        patch = %artifact.path().display(),
        modified = summary.modified,
        deleted = summary.deleted,
        "patch assembled"
    );
    Ok((artifact, summary))
}

fn write_entries<W: Write>(change_set: &ChangeSet, out: &mut W) -> io::Result<PatchSummary> {
    out.write_all(MAGIC)?;
    out.write_u8(VERSION)?;

    let mut summary = PatchSummary::default();
    for resource in change_set {
        if resource.local.is_file() {
            debug!(repo = %resource.repository_path, "+ modified");
            write_modified(out, &resource.repository_path, &resource.local)?;
            summary.modified += 1;
        } else {
            debug!(repo = %resource.repository_path, "- deleted");
            write_path_entry(out, KIND_DELETED, &resource.repository_path)?;
            summary.deleted += 1;
        }
    }
    Ok(summary)
}

fn write_modified<W: Write>(out: &mut W, repository_path: &str, local: &Path) -> io::Result<()> {
    let file = File::open(local)?;
    let declared = file.metadata()?.len();

    write_path_entry(out, KIND_MODIFIED, repository_path)?;
    out.write_u64::<BigEndian>(declared)?;

    // Streamed copy; the declared length is part of the entry, so a file
    // that changed size mid-read corrupts the stream and must fail.
    let copied = io::copy(&mut BufReader::new(file), out)?;
    if copied != declared {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "\"{}\" changed while streaming: declared {declared} bytes, read {copied}",
                local.display()
            ),
        ));
    }
    Ok(())
}

fn write_path_entry<W: Write>(out: &mut W, kind: u8, repository_path: &str) -> io::Result<()> {
    out.write_u8(kind)?;
    let bytes = repository_path.as_bytes();
    out.write_u32::<BigEndian>(bytes.len() as u32)?;
    out.write_all(bytes)
}

/// End-of-stream marker plus flush; the server-side patch reader relies on
/// the trailer to detect truncated uploads.
fn finalize<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_u8(KIND_END)?;
    out.flush()
}

/// Decoded patch entry, used by tests and troubleshooting of retained
/// artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchEntry {
    Modified {
        repository_path: String,
        content: Vec<u8>,
    },
    Deleted {
        repository_path: String,
    },
}

/// Reads a full patch stream back. Fails on a bad header, a truncated
/// stream, or an unknown entry kind.
pub fn read_patch<R: Read>(mut input: R) -> io::Result<Vec<PatchEntry>> {
    use byteorder::ReadBytesExt;

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    let version = input.read_u8()?;
    if &magic != MAGIC || version != VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad patch header"));
    }

    let mut entries = Vec::new();
    loop {
        let kind = input.read_u8()?;
        if kind == KIND_END {
            return Ok(entries);
        }
        let path_len = input.read_u32::<BigEndian>()? as usize;
        let mut path = vec![0u8; path_len];
        input.read_exact(&mut path)?;
        let repository_path = String::from_utf8(path)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        match kind {
            KIND_MODIFIED => {
                let len = input.read_u64::<BigEndian>()? as usize;
                let mut content = vec![0u8; len];
                input.read_exact(&mut content)?;
                entries.push(PatchEntry::Modified {
                    repository_path,
                    content,
                });
            }
            KIND_DELETED => entries.push(PatchEntry::Deleted { repository_path }),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown patch entry kind {other}"),
                ));
            }
        }
    }
}

/// Keeps or discards the temporary artifact once the upload finished.
/// Returns the retained path when keeping.
pub fn dispose_artifact(artifact: NamedTempFile, keep: bool) -> Option<PathBuf> {
    if keep {
        match artifact.keep() {
            Ok((_file, path)) => Some(path),
            Err(err) => {
                tracing::warn!(error = %err, "could not retain patch artifact");
                None
            }
        }
    } else {
        // Dropping the handle removes the file.
        None
    }
}
