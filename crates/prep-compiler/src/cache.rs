//! The artifact cache.
//!
//! Templates are obtained either by name from a search directory (file
//! identities) or from source text held in memory (text identities).
//!
//! A text identity is keyed by its checksum and never touches the disk: a
//! second request for the same text returns the artifact already built.
//!
//! A file identity is checked on every request. The source is read and
//! checksummed; the artifact held in memory, or failing that the one
//! persisted beside the source, is reused only when its checksum matches.
//! Persisted artifacts from another compiler version, or built before the
//! compiler was last modified, count as absent.
//!
//! Concurrent requests for one stale file identity may both rebuild. Each
//! publishes a complete artifact by rename and the last one wins.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

use prep_codegen::{generate, print_procedure, CodegenOptions};
use prep_lexer::LexOptions;
use prep_parser::parse_template;
use prep_types::{Procedure, SourceFile};
use tracing::{debug, info};

use crate::artifact::{Artifact, TemplateHandle};
use crate::checksum::{checksum, COMPILER_VERSION};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::persist::{self, Decoded, PersistedArtifact};

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// A template file: a logical name, which may carry a directory and the
    /// source extension, looked up in `directory`.
    File { name: String, directory: PathBuf },
    /// Template source held in memory. `bytes` marks a byte-string template,
    /// whose default quoting produces bytes.
    Text { source: String, bytes: bool },
}

impl Identity {
    pub fn file(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::File {
            name: name.into(),
            directory: directory.into(),
        }
    }

    pub fn text(source: impl Into<String>) -> Self {
        Self::Text {
            source: source.into(),
            bytes: false,
        }
    }

    pub fn byte_text(source: impl Into<String>) -> Self {
        Self::Text {
            source: source.into(),
            bytes: true,
        }
    }
}

/// Paths derived from a file identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// File name without directory or extension.
    pub stem: String,
    pub directory: PathBuf,
    pub source: PathBuf,
    pub artifact: PathBuf,
    pub generated: PathBuf,
}

/// Compiles templates and keeps what it built for the life of the cache.
pub struct ArtifactCache {
    config: CompilerConfig,
    compiler_time: Option<u64>,
    texts: RwLock<HashMap<(bool, String), Arc<Artifact>>>,
    files: RwLock<HashMap<PathBuf, Arc<Artifact>>>,
}

impl ArtifactCache {
    pub fn new(config: CompilerConfig) -> Arc<Self> {
        let compiler_time = config.compiler_time.or_else(executable_time);
        Arc::new(Self {
            config,
            compiler_time,
            texts: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Obtain the artifact for `identity`, compiling it if needed.
    pub fn obtain(self: &Arc<Self>, identity: &Identity) -> CompileResult<TemplateHandle> {
        match identity {
            Identity::File { name, directory } => self.obtain_file(name, directory),
            Identity::Text { source, bytes } => self.obtain_text(source, *bytes),
        }
    }

    /// Split `name` into directory and stem, and derive the source,
    /// artifact and generated-code paths. Only a trailing source extension
    /// is trimmed; any other dot belongs to the stem. The directory is made
    /// absolute and, when it exists, canonical, so every spelling of one
    /// file shares a key.
    pub fn resolve(&self, name: &str, directory: &Path) -> ResolvedFile {
        let path = Path::new(name);
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => directory.join(parent),
            _ => directory.to_path_buf(),
        };
        let directory = normalize(&directory);
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = &self.config.source_extension;
        let stem = match file_name.strip_suffix(extension.as_str()) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        };
        ResolvedFile {
            source: directory.join(format!("{stem}{extension}")),
            artifact: directory.join(format!("{stem}{}", self.config.artifact_extension)),
            generated: directory.join(format!("{stem}{}", self.config.generated_extension)),
            stem,
            directory,
        }
    }

    /// Obtain a file template by name.
    pub fn obtain_file(self: &Arc<Self>, name: &str, directory: &Path) -> CompileResult<TemplateHandle> {
        let artifact = self.file_artifact(name, directory)?;
        Ok(TemplateHandle::new(self.clone(), artifact))
    }

    /// Obtain a template from source text. Identical text always yields the
    /// artifact built first.
    pub fn obtain_text(self: &Arc<Self>, source: &str, bytes: bool) -> CompileResult<TemplateHandle> {
        let artifact = self.text_artifact(source, bytes)?;
        Ok(TemplateHandle::new(self.clone(), artifact))
    }

    fn file_artifact(&self, name: &str, directory: &Path) -> CompileResult<Arc<Artifact>> {
        let file = self.resolve(name, directory);
        let identity = file.source.display().to_string();

        let existing = match self.remembered(&file.source) {
            Some(artifact) => Some(artifact),
            None => match self.load_persisted(&file, &identity) {
                Ok(artifact) => artifact.map(Arc::new),
                Err(err) if self.config.force => {
                    debug!(%identity, error = %err, "ignoring unreadable artifact");
                    None
                }
                Err(err) => return Err(err),
            },
        };

        let source = match fs::read_to_string(&file.source) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return match existing {
                    Some(artifact) => {
                        debug!(%identity, "source missing, reusing artifact");
                        self.remember(&file.source, &artifact);
                        Ok(artifact)
                    }
                    None => Err(CompileError::MissingSource {
                        identity,
                        path: file.source,
                    }),
                };
            }
            Err(e) => return Err(CompileError::io(identity, "read source", e)),
        };

        let checksum = checksum(&source);
        if let Some(artifact) = existing {
            if self.config.force {
                debug!(%identity, "forced rebuild");
            } else if artifact.checksum() == checksum {
                debug!(%identity, "artifact is current");
                self.remember(&file.source, &artifact);
                return Ok(artifact);
            } else {
                debug!(%identity, "source changed since the artifact was built");
            }
        }
        self.rebuild(&file, &identity, &source, checksum)
    }

    fn text_artifact(&self, source: &str, bytes: bool) -> CompileResult<Arc<Artifact>> {
        let checksum = checksum(source);
        let key = (bytes, checksum);
        if let Some(artifact) = self.read_texts().get(&key) {
            debug!(checksum = %key.1, "text template cached");
            return Ok(artifact.clone());
        }
        let name = format!("text-{}", &key.1[..12]);
        let procedure = self.compile(&name, source, bytes, "<text>")?;
        info!(checksum = %key.1, "compiled text template");
        let artifact = Arc::new(Artifact::new(
            name,
            key.1.clone(),
            procedure,
            PathBuf::from("."),
            self.config.step_limit,
        ));
        let mut texts = self.write_texts();
        Ok(texts.entry(key).or_insert(artifact).clone())
    }

    /// Lex, parse and generate `source` into a procedure.
    pub fn compile(&self, name: &str, source: &str, bytes: bool, identity: &str) -> CompileResult<Procedure> {
        let file = SourceFile::new(identity, source);
        let options = LexOptions {
            pattern_matching: self.config.pattern_matching,
        };
        let template = parse_template(&file, options).map_err(|source| CompileError::Template {
            identity: identity.to_string(),
            source,
        })?;
        let options = CodegenOptions {
            name: name.to_string(),
            bytes,
        };
        generate(&template, &options).map_err(|err| CompileError::Template {
            identity: identity.to_string(),
            source: err.to_prep_error(&file),
        })
    }

    fn rebuild(
        &self,
        file: &ResolvedFile,
        identity: &str,
        source: &str,
        checksum: String,
    ) -> CompileResult<Arc<Artifact>> {
        let procedure = self.compile(&file.stem, source, false, identity)?;
        if self.config.save_artifact {
            let persisted = PersistedArtifact {
                name: file.stem.clone(),
                checksum: checksum.clone(),
                compiler_version: COMPILER_VERSION.to_string(),
                procedure: procedure.clone(),
            };
            let bytes = persist::encode(&persisted, persist::timestamp_now()).map_err(|e| {
                CompileError::io(identity, "encode artifact", io::Error::other(e))
            })?;
            persist::write_atomic(&file.artifact, &bytes)
                .map_err(|e| CompileError::io(identity, "persist artifact", e))?;
            debug!(path = %file.artifact.display(), "persisted artifact");
        }
        if self.config.save_generated {
            persist::write_atomic(&file.generated, print_procedure(&procedure).as_bytes())
                .map_err(|e| CompileError::io(identity, "write generated code", e))?;
        }
        info!(%identity, "compiled");
        let artifact = Arc::new(self.artifact(file, checksum, procedure));
        self.remember(&file.source, &artifact);
        Ok(artifact)
    }

    /// Load the artifact persisted for `file`, `None` when absent, foreign
    /// or outdated.
    fn load_persisted(&self, file: &ResolvedFile, identity: &str) -> CompileResult<Option<Artifact>> {
        let Some(bytes) = persist::read(&file.artifact)
            .map_err(|e| CompileError::io(identity, "read artifact", e))?
        else {
            return Ok(None);
        };
        let decoded = persist::decode(&bytes).map_err(|reason| CompileError::Malformed {
            identity: identity.to_string(),
            reason,
        })?;
        match decoded {
            Decoded::Foreign(reason) => {
                debug!(%identity, reason, "discarding persisted artifact");
                Ok(None)
            }
            Decoded::Valid { timestamp, .. } if self.is_outdated(timestamp) => {
                debug!(%identity, timestamp, "artifact predates the compiler");
                Ok(None)
            }
            Decoded::Valid { artifact, .. } => Ok(Some(self.artifact(
                file,
                artifact.checksum,
                artifact.procedure,
            ))),
        }
    }

    fn is_outdated(&self, timestamp: u32) -> bool {
        match self.compiler_time {
            Some(compiler_time) => u64::from(timestamp) < (compiler_time & 0xFFFF_FFFF),
            None => true,
        }
    }

    fn artifact(&self, file: &ResolvedFile, checksum: String, procedure: Procedure) -> Artifact {
        Artifact::new(
            file.stem.clone(),
            checksum,
            procedure,
            file.directory.clone(),
            self.config.step_limit,
        )
    }

    fn remembered(&self, path: &Path) -> Option<Arc<Artifact>> {
        self.read_files().get(path).cloned()
    }

    fn remember(&self, path: &Path, artifact: &Arc<Artifact>) {
        self.write_files().insert(path.to_path_buf(), artifact.clone());
    }

    // A poisoned lock still guards a consistent map: entries are inserted whole.

    fn read_texts(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(bool, String), Arc<Artifact>>> {
        self.texts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_texts(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<(bool, String), Arc<Artifact>>> {
        self.texts.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_files(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Arc<Artifact>>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_files(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Arc<Artifact>>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// `directory` as an absolute path, resolved through the file system when
/// it exists.
fn normalize(directory: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(directory) {
        return canonical;
    }
    std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf())
}

/// Modification time of the running executable, in epoch seconds.
fn executable_time() -> Option<u64> {
    let path = std::env::current_exe().ok()?;
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs())
}
