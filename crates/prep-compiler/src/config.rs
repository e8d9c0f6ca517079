//! Compiler configuration.

use serde::Deserialize;

use prep_eval::DEFAULT_STEP_LIMIT;

/// Settings shared by every artifact an [`ArtifactCache`](crate::ArtifactCache)
/// builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Extension of template sources, used when a name carries none.
    pub source_extension: String,
    /// Extension of persisted artifacts.
    pub artifact_extension: String,
    /// Extension of the human-readable generated code.
    pub generated_extension: String,
    /// Persist compiled file templates next to their source.
    pub save_artifact: bool,
    /// Also write the generated code as text.
    pub save_generated: bool,
    /// Rebuild file templates on every access.
    pub force: bool,
    /// Recognise `match`/`case`/`endmatch` directives.
    pub pattern_matching: bool,
    /// Last-modified time of the compiler, in seconds since the epoch.
    /// Persisted artifacts built earlier are stale. `None` means the
    /// modification time of the running executable.
    pub compiler_time: Option<u64>,
    pub step_limit: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            source_extension: ".prep".into(),
            artifact_extension: ".prepc".into(),
            generated_extension: ".prep.txt".into(),
            save_artifact: true,
            save_generated: false,
            force: false,
            pattern_matching: true,
            compiler_time: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

impl CompilerConfig {
    /// Defaults overlaid with `PREP_FORCE`, `PREP_SAVE_ARTIFACT` and
    /// `PREP_PATTERN_MATCHING` from the environment.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(force) = var("PREP_FORCE").and_then(|v| flag(&v)) {
            self.force = force;
        }
        if let Some(save) = var("PREP_SAVE_ARTIFACT").and_then(|v| flag(&v)) {
            self.save_artifact = save;
        }
        if let Some(enabled) = var("PREP_PATTERN_MATCHING").and_then(|v| flag(&v)) {
            self.pattern_matching = enabled;
        }
        self
    }
}

fn flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.source_extension, ".prep");
        assert_eq!(config.artifact_extension, ".prepc");
        assert!(config.save_artifact);
        assert!(!config.force);
        assert!(config.pattern_matching);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("PREP_FORCE", "1"),
            ("PREP_SAVE_ARTIFACT", "0"),
            ("PREP_PATTERN_MATCHING", "bogus"),
        ]
        .into_iter()
        .collect();
        let config = CompilerConfig::default().overlay(|key| vars.get(key).map(|v| v.to_string()));
        assert!(config.force);
        assert!(!config.save_artifact);
        assert!(config.pattern_matching);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CompilerConfig =
            serde_json::from_str(r#"{"source_extension": ".tmpl", "save_generated": true}"#).unwrap();
        assert_eq!(config.source_extension, ".tmpl");
        assert!(config.save_generated);
        assert_eq!(config.artifact_extension, ".prepc");
        assert_eq!(config.step_limit, DEFAULT_STEP_LIMIT);
    }
}
