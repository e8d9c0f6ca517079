//! Batch compilation and cleanup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::artifact::TemplateHandle;
use crate::cache::ArtifactCache;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};

/// Compile `target`: a template file, every template under a directory, or
/// the files of one directory matching a `*`/`?` pattern.
pub fn compile_path(cache: &Arc<ArtifactCache>, target: &Path) -> CompileResult<Vec<TemplateHandle>> {
    let files = if target.is_file() {
        vec![target.to_path_buf()]
    } else if target.is_dir() {
        templates_under(cache.config(), target)?
    } else {
        matching_files(target)?
    };
    let mut artifacts = Vec::with_capacity(files.len());
    for file in files {
        let (name, directory) = split(&file);
        debug!(path = %file.display(), "compiling");
        artifacts.push(cache.obtain_file(&name, &directory)?);
    }
    info!(target = %target.display(), count = artifacts.len(), "batch compiled");
    Ok(artifacts)
}

/// Delete the artifacts and generated code of every template under `dir`.
/// Returns the files removed.
pub fn clean_dir(config: &CompilerConfig, dir: &Path) -> CompileResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for source in templates_under(config, dir)? {
        let name = source.to_string_lossy();
        let stem = &name[..name.len() - config.source_extension.len()];
        for extension in [&config.artifact_extension, &config.generated_extension] {
            let derived = PathBuf::from(format!("{stem}{extension}"));
            match fs::remove_file(&derived) {
                Ok(()) => {
                    debug!(path = %derived.display(), "removed");
                    removed.push(derived);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CompileError::io(derived.display().to_string(), "remove", e))
                }
            }
        }
    }
    info!(dir = %dir.display(), count = removed.len(), "cleaned");
    Ok(removed)
}

/// Template sources under `dir`, recursively, in path order.
fn templates_under(config: &CompilerConfig, dir: &Path) -> CompileResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry
            .map_err(|e| CompileError::io(dir.display().to_string(), "walk directory", e.into()))?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .ends_with(config.source_extension.as_str())
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Files in the pattern's directory whose names match its last component.
fn matching_files(pattern: &Path) -> CompileResult<Vec<PathBuf>> {
    let identity = pattern.display().to_string();
    let directory = match pattern.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let glob = pattern
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let regex = glob_regex(&glob).map_err(|source| CompileError::Pattern {
        identity: identity.clone(),
        source,
    })?;
    let entries = fs::read_dir(&directory)
        .map_err(|e| CompileError::io(identity.clone(), "read directory", e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CompileError::io(identity.clone(), "read directory", e))?;
        let path = entry.path();
        if path.is_file() && regex.is_match(&entry.file_name().to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn glob_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

fn split(file: &Path) -> (String, PathBuf) {
    let name = file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let directory = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (name, directory)
}
