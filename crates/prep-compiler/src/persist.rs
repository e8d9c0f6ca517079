//! On-disk artifact format.
//!
//! A persisted artifact is a 16-byte header followed by a JSON body:
//!
//! | bytes  | field                              |
//! |--------|------------------------------------|
//! | 0..4   | magic `PREP`                       |
//! | 4..8   | compatibility tag, u32 LE          |
//! | 8..12  | build time in epoch seconds, u32 LE |
//! | 12..16 | body length, u32 LE                |
//!
//! Files are published by writing a temporary file in the target directory
//! and renaming it over the destination, so readers see either the old or
//! the new artifact in full.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use prep_types::Procedure;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::checksum::compat_tag;

pub const MAGIC: &[u8; 4] = b"PREP";
pub const HEADER_LEN: usize = 16;

/// Body of a persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub name: String,
    pub checksum: String,
    pub compiler_version: String,
    pub procedure: Procedure,
}

/// Result of decoding a persisted artifact.
#[derive(Debug)]
pub enum Decoded {
    /// Built by another compiler or not an artifact at all; treated as absent.
    Foreign(&'static str),
    Valid {
        timestamp: u32,
        artifact: PersistedArtifact,
    },
}

/// Current time as stored in the header.
pub fn timestamp_now() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    (secs & 0xFFFF_FFFF) as u32
}

pub fn encode(artifact: &PersistedArtifact, timestamp: u32) -> serde_json::Result<Vec<u8>> {
    encode_tagged(artifact, timestamp, compat_tag())
}

fn encode_tagged(artifact: &PersistedArtifact, timestamp: u32, tag: u32) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(artifact)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&tag.to_le_bytes());
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

/// Decode a persisted artifact. Errors describe a body that cannot be
/// trusted even though the header is ours.
pub fn decode(bytes: &[u8]) -> Result<Decoded, String> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Ok(Decoded::Foreign("not a prep artifact"));
    }
    if read_u32(bytes, 4) != compat_tag() {
        return Ok(Decoded::Foreign("built by an incompatible compiler"));
    }
    let timestamp = read_u32(bytes, 8);
    let length = read_u32(bytes, 12) as usize;
    let body = &bytes[HEADER_LEN..];
    if body.len() != length {
        return Err(format!(
            "body is {} bytes but the header records {length}",
            body.len()
        ));
    }
    let artifact = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    Ok(Decoded::Valid { timestamp, artifact })
}

/// Read a persisted artifact, `None` if it does not exist.
pub fn read(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replace `path` with `contents` in one rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
