//! Artifact cache behaviour against real files.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use prep_compiler::batch::{clean_dir, compile_path};
use prep_compiler::persist::{self, Decoded, HEADER_LEN};
use prep_compiler::{ArtifactCache, CompileError, CompilerConfig, Identity};
use prep_eval::Value;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn config() -> CompilerConfig {
    CompilerConfig {
        compiler_time: Some(0),
        ..CompilerConfig::default()
    }
}

fn cache() -> Arc<ArtifactCache> {
    ArtifactCache::new(config())
}

/// A cache that also writes generated code, so a rebuild leaves a
/// `.prep.txt` file behind and a reuse does not.
fn tracing_cache() -> Arc<ArtifactCache> {
    ArtifactCache::new(CompilerConfig {
        save_generated: true,
        ..config()
    })
}

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

fn render(cache: &Arc<ArtifactCache>, name: &str, dir: &Path, params: &[(&str, &str)]) -> Value {
    cache
        .obtain_file(name, dir)
        .unwrap()
        .get_output_from_keywords(params.iter().map(|(k, v)| (*k, Value::from(*v))), None, None)
        .unwrap()
}

fn rebuilt(dir: &Path, stem: &str) -> bool {
    dir.join(format!("{stem}.prep.txt")).exists()
}

// ══════════════════════════════════════════════════════════════════════════════
// Text identities
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_text_round_trip_reuses_artifact() {
    let cache = cache();
    let first = cache.obtain(&Identity::text("Hello {{2+2}} World")).unwrap();
    let second = cache.obtain(&Identity::text("Hello {{2+2}} World")).unwrap();
    assert_eq!(first.checksum(), second.checksum());
    assert!(Arc::ptr_eq(first.artifact(), second.artifact()));
    assert_eq!(
        second.get_output(Default::default(), None, None).unwrap(),
        Value::from("Hello 4 World")
    );
}

#[test]
fn test_text_checksum_is_stable_across_caches() {
    let a = cache().obtain(&Identity::text("x{{1}}")).unwrap();
    let b = cache().obtain(&Identity::text("x{{1}}")).unwrap();
    assert_eq!(a.checksum(), b.checksum());
}

// ══════════════════════════════════════════════════════════════════════════════
// File identities
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_file_compiles_and_persists() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "Hello {{name}}");
    let out = render(&cache(), "page", dir.path(), &[("name", "bob")]);
    assert_eq!(out, Value::from("Hello bob"));

    let bytes = fs::read(dir.path().join("page.prepc")).unwrap();
    assert!(bytes.len() > HEADER_LEN);
    assert!(matches!(persist::decode(&bytes), Ok(Decoded::Valid { .. })));
    assert!(!rebuilt(dir.path(), "page"));
}

#[test]
fn test_persisted_artifact_is_reused() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "Hello {{name}}");
    let first = cache().obtain_file("page", dir.path()).unwrap();

    let fresh = tracing_cache();
    let second = fresh.obtain_file("page.prep", dir.path()).unwrap();
    assert_eq!(first.checksum(), second.checksum());
    assert!(!rebuilt(dir.path(), "page"));
}

#[test]
fn test_edit_forces_rebuild_and_revert_restores_checksum() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "v{{1}}");
    let cache = cache();
    let original = cache.obtain_file("page", dir.path()).unwrap();

    write(dir.path(), "page.prep", "v{{2}}");
    let edited = cache.obtain_file("page", dir.path()).unwrap();
    assert_ne!(original.checksum(), edited.checksum());
    assert_eq!(
        edited.get_output(Default::default(), None, None).unwrap(),
        Value::from("v2")
    );

    write(dir.path(), "page.prep", "v{{1}}");
    let reverted = ArtifactCache::new(config()).obtain_file("page", dir.path()).unwrap();
    assert_eq!(reverted.checksum(), original.checksum());
    assert_eq!(
        reverted.get_output(Default::default(), None, None).unwrap(),
        Value::from("v1")
    );
}

#[test]
fn test_incompatible_artifact_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "x");
    cache().obtain_file("page", dir.path()).unwrap();

    let path = dir.path().join("page.prepc");
    let mut bytes = fs::read(&path).unwrap();
    bytes[4] = bytes[4].wrapping_add(1);
    fs::write(&path, &bytes).unwrap();

    tracing_cache().obtain_file("page", dir.path()).unwrap();
    assert!(rebuilt(dir.path(), "page"));
    let bytes = fs::read(&path).unwrap();
    assert!(matches!(persist::decode(&bytes), Ok(Decoded::Valid { .. })));
}

#[test]
fn test_artifact_older_than_compiler_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "x");
    cache().obtain_file("page", dir.path()).unwrap();

    let upgraded = ArtifactCache::new(CompilerConfig {
        compiler_time: Some(u64::from(u32::MAX)),
        save_generated: true,
        ..CompilerConfig::default()
    });
    upgraded.obtain_file("page", dir.path()).unwrap();
    assert!(rebuilt(dir.path(), "page"));
}

#[test]
fn test_missing_source_reuses_artifact() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "kept {{x}}");
    cache().obtain_file("page", dir.path()).unwrap();
    fs::remove_file(dir.path().join("page.prep")).unwrap();

    let out = render(&cache(), "page", dir.path(), &[("x", "1")]);
    assert_eq!(out, Value::from("kept 1"));
}

#[test]
fn test_missing_source_and_artifact_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = cache().obtain_file("nothing", dir.path()).unwrap_err();
    assert!(matches!(err, CompileError::MissingSource { .. }));
    assert!(err.identity().ends_with("nothing.prep"));
}

#[test]
fn test_malformed_artifact_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "x");
    cache().obtain_file("page", dir.path()).unwrap();

    let path = dir.path().join("page.prepc");
    let mut bytes = fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 1);
    fs::write(&path, &bytes).unwrap();

    let err = cache().obtain_file("page", dir.path()).unwrap_err();
    assert!(matches!(err, CompileError::Malformed { .. }));

    let forced = ArtifactCache::new(CompilerConfig {
        force: true,
        ..config()
    });
    forced.obtain_file("page", dir.path()).unwrap();
    assert!(cache().obtain_file("page", dir.path()).is_ok());
}

#[test]
fn test_force_rebuilds_every_time() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "x");
    let forced = ArtifactCache::new(CompilerConfig {
        force: true,
        ..config()
    });
    let first = forced.obtain_file("page", dir.path()).unwrap();
    let second = forced.obtain_file("page", dir.path()).unwrap();
    assert!(!Arc::ptr_eq(first.artifact(), second.artifact()));
    assert_eq!(first.checksum(), second.checksum());
}

#[test]
fn test_unsaved_artifact_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "x");
    let cache = ArtifactCache::new(CompilerConfig {
        save_artifact: false,
        ..config()
    });
    cache.obtain_file("page", dir.path()).unwrap();
    assert!(!dir.path().join("page.prepc").exists());
}

#[test]
fn test_file_compile_error_names_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bad.prep", "{{for x in y}}never closed");
    let err = cache().obtain_file("bad", dir.path()).unwrap_err();
    assert!(matches!(err, CompileError::Template { .. }));
    assert!(err.identity().ends_with("bad.prep"));
    assert!(!dir.path().join("bad.prepc").exists());
}

#[test]
fn test_name_with_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    write(&dir.path().join("sub"), "page.prep", "deep");
    let out = render(&cache(), "sub/page", dir.path(), &[]);
    assert_eq!(out, Value::from("deep"));
    assert!(dir.path().join("sub/page.prepc").exists());
}

// ══════════════════════════════════════════════════════════════════════════════
// include()
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_include_through_cache() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "part.prep", "hi {{who}}");
    write(dir.path(), "greet.prep", "{{def(who)}}<{{who}}>");
    write(
        dir.path(),
        "page.prep",
        "{{include('part', who='x')}} {{include('greet.prep', 'y')}}",
    );
    let out = render(&cache(), "page", dir.path(), &[]);
    assert_eq!(out, Value::from("hi x <y>"));
    assert!(dir.path().join("part.prepc").exists());
}

#[test]
fn test_include_after_cache_binding_is_dropped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "part.prep", "part");
    write(dir.path(), "page.prep", "[{{include('part')}}]");
    let page = cache().obtain_file("page", dir.path()).unwrap();
    assert_eq!(
        page.get_output(Default::default(), None, None).unwrap(),
        Value::from("[part]")
    );
}

#[test]
fn test_include_missing_template_fails() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "{{include('absent')}}");
    let artifact = cache().obtain_file("page", dir.path()).unwrap();
    let err = artifact.get_output(Default::default(), None, None).unwrap_err();
    assert!(err.to_string().contains("cannot include 'absent'"));
    assert!(!err.to_string().contains("without a template loader"));
}

#[test]
fn test_dotted_name_and_spellings_share_one_artifact() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    write(&dir.path().join("sub"), "v1.2.prep", "dotted");
    let cache = cache();
    let first = cache.obtain_file("v1.2", &dir.path().join("sub")).unwrap();
    let second = cache
        .obtain_file("./sub/v1.2.prep", dir.path())
        .unwrap();
    assert!(Arc::ptr_eq(first.artifact(), second.artifact()));
    assert_eq!(first.name(), "v1.2");
    assert!(dir.path().join("sub/v1.2.prepc").exists());
}

// ══════════════════════════════════════════════════════════════════════════════
// Concurrency
// ══════════════════════════════════════════════════════════════════════════════

/// Concurrent builds of one identity are not serialized: both build and
/// publish, and the survivor on disk is a complete artifact.
#[test]
fn test_concurrent_rebuilds_agree() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "shared {{1+1}}");
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let cache = ArtifactCache::new(CompilerConfig {
                    compiler_time: Some(0),
                    ..CompilerConfig::default()
                });
                let artifact = cache.obtain_file("page", &path).unwrap();
                artifact.checksum().to_string()
            })
        })
        .collect();
    let checksums: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(checksums.windows(2).all(|w| w[0] == w[1]));

    let bytes = fs::read(dir.path().join("page.prepc")).unwrap();
    match persist::decode(&bytes) {
        Ok(Decoded::Valid { artifact, .. }) => assert_eq!(artifact.checksum, checksums[0]),
        other => panic!("expected a complete artifact, got {other:?}"),
    }
}

#[test]
fn test_shared_cache_across_threads() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.prep", "t");
    let cache = cache();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            let path = dir.path().to_path_buf();
            thread::spawn(move || cache.obtain_file("page", &path).is_ok())
        })
        .collect();
    assert!(handles.into_iter().all(|h| h.join().unwrap()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Batch tooling
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_directory_recursively() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    write(dir.path(), "a.prep", "a");
    write(dir.path(), "notes.txt", "not a template");
    write(&dir.path().join("nested"), "b.prep", "b");

    let artifacts = compile_path(&cache(), dir.path()).unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(dir.path().join("nested/b.prepc").exists());
    assert!(!dir.path().join("notes.prepc").exists());
}

#[test]
fn test_compile_pattern() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "one.prep", "1");
    write(dir.path(), "two.prep", "2");
    write(dir.path(), "other.tmpl", "3");

    let artifacts = compile_path(&cache(), &dir.path().join("t*.prep")).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name(), "two");
}

#[test]
fn test_compile_single_file_and_clean() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.prep", "a");
    write(dir.path(), "b.prep", "b");
    compile_path(&tracing_cache(), &dir.path().join("a.prep")).unwrap();
    compile_path(&cache(), &dir.path().join("b.prep")).unwrap();
    assert!(dir.path().join("a.prepc").exists());
    assert!(dir.path().join("a.prep.txt").exists());

    let mut removed = clean_dir(&config(), dir.path()).unwrap();
    removed.sort();
    assert_eq!(
        removed,
        vec![
            dir.path().join("a.prep.txt"),
            dir.path().join("a.prepc"),
            dir.path().join("b.prepc"),
        ]
    );
    assert!(dir.path().join("a.prep").exists());
    assert!(!dir.path().join("b.prepc").exists());
}
