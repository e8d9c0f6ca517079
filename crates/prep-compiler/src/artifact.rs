//! Compiled templates and how hosts invoke them.
//!
//! An [`Artifact`] is the immutable compiled form. A [`TemplateHandle`] is
//! what the cache hands out: the artifact together with the cache that
//! built it, which `include()` goes through.

use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use prep_codegen::print_procedure;
use prep_eval::{CallArgs, Dict, EvalResult, Interpreter, Invocation, TemplateLoader, Value};
use prep_types::Procedure;

use crate::cache::ArtifactCache;

/// A compiled template: its procedure plus the checksum of the source it
/// was built from. Immutable once built.
#[derive(Debug)]
pub struct Artifact {
    name: String,
    checksum: String,
    procedure: Arc<Procedure>,
    /// Where `include()` looks for other templates.
    directory: PathBuf,
    step_limit: u64,
}

impl Artifact {
    pub(crate) fn new(
        name: String,
        checksum: String,
        procedure: Procedure,
        directory: PathBuf,
        step_limit: u64,
    ) -> Self {
        Self {
            name,
            checksum,
            procedure: Arc::new(procedure),
            directory,
            step_limit,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_callable(&self) -> bool {
        self.procedure.is_callable()
    }

    /// The generated code in readable form.
    pub fn generated_code(&self) -> String {
        print_procedure(&self.procedure)
    }
}

/// An artifact bound to the cache it came from. Holding a handle keeps the
/// cache alive, so `include()` works for as long as the handle does.
#[derive(Clone)]
pub struct TemplateHandle {
    cache: Arc<ArtifactCache>,
    artifact: Arc<Artifact>,
}

impl TemplateHandle {
    pub(crate) fn new(cache: Arc<ArtifactCache>, artifact: Arc<Artifact>) -> Self {
        Self { cache, artifact }
    }

    pub fn artifact(&self) -> &Arc<Artifact> {
        &self.artifact
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Run a plain template.
    pub fn run(&self, invocation: Invocation) -> EvalResult<()> {
        self.interpreter().run(&self.artifact.procedure, invocation)
    }

    /// Run a plain template and return everything it wrote.
    pub fn get_output(
        &self,
        params: Dict,
        quote: Option<Value>,
        lquote: Option<Value>,
    ) -> EvalResult<Value> {
        self.interpreter()
            .get_output(&self.artifact.procedure, params, quote, lquote)
    }

    /// [`get_output`](Self::get_output) with the parameters given as
    /// keyword pairs.
    pub fn get_output_from_keywords<K: AsRef<str>>(
        &self,
        keywords: impl IntoIterator<Item = (K, Value)>,
        quote: Option<Value>,
        lquote: Option<Value>,
    ) -> EvalResult<Value> {
        let mut params = Dict::new();
        for (key, value) in keywords {
            params.insert_str(key.as_ref(), value);
        }
        self.get_output(params, quote, lquote)
    }

    /// Call a callable template.
    pub fn call(&self, args: CallArgs) -> EvalResult<Value> {
        self.interpreter().call(&self.artifact.procedure, args)
    }

    fn interpreter(&self) -> Interpreter {
        Interpreter::new(self.artifact.step_limit).with_loader(Rc::new(CacheLoader {
            cache: self.cache.clone(),
            directory: self.artifact.directory.clone(),
        }))
    }
}

impl Deref for TemplateHandle {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.artifact
    }
}

impl fmt::Debug for TemplateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateHandle")
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

/// Resolves `include()` through the cache that built the including template.
struct CacheLoader {
    cache: Arc<ArtifactCache>,
    directory: PathBuf,
}

impl TemplateLoader for CacheLoader {
    fn load(&self, name: &str) -> Result<Arc<Procedure>, Box<dyn Error + Send + Sync>> {
        let handle = self.cache.obtain_file(name, &self.directory)?;
        Ok(handle.artifact.procedure.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Identity;
    use crate::config::CompilerConfig;
    use prep_eval::EvalError;

    fn obtain(source: &str) -> TemplateHandle {
        ArtifactCache::new(CompilerConfig::default())
            .obtain(&Identity::text(source))
            .unwrap()
    }

    #[test]
    fn test_get_output() {
        let artifact = obtain("Hello {{2+2}} World");
        let out = artifact.get_output(Dict::new(), None, None).unwrap();
        assert_eq!(out, Value::from("Hello 4 World"));
    }

    #[test]
    fn test_get_output_from_keywords() {
        let artifact = obtain("{{if sex=='m'}}guy{{elif sex=='f'}}gal{{else}}neuter{{endif}}");
        let out = artifact
            .get_output_from_keywords([("sex", Value::from("f"))], None, None)
            .unwrap();
        assert_eq!(out, Value::from("gal"));
    }

    #[test]
    fn test_call() {
        let artifact = obtain("{{def(a)}}Hello{{a}}");
        assert!(artifact.is_callable());
        let out = artifact.call(CallArgs::new(vec![Value::from(1)])).unwrap();
        assert_eq!(out, Value::from("Hello1"));
        let err = artifact.call(CallArgs::default()).unwrap_err();
        assert!(matches!(err, EvalError::Signature(_)));
    }

    #[test]
    fn test_run_callable_is_wrong_kind() {
        let artifact = obtain("{{def()}}x");
        let err = artifact.get_output(Dict::new(), None, None).unwrap_err();
        assert!(matches!(err, EvalError::WrongKind(_)));
    }

    #[test]
    fn test_generated_code_names_entry() {
        let artifact = obtain("{{def(a)}}{{a}}");
        assert!(artifact
            .generated_code()
            .contains("def get(a, **__kwds__):"));
    }

    #[test]
    fn test_handle_keeps_cache_alive() {
        let handle = obtain("x");
        let weak = Arc::downgrade(handle.cache());
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
    }
}
