//! Command implementations.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use prep_compiler::batch::{clean_dir, compile_path};
use prep_compiler::{ArtifactCache, CompilerConfig, Identity, TemplateHandle};
use prep_eval::format::to_str;
use prep_eval::{CallArgs, Dict, Invocation, Value};
use tracing::info;

/// `KEY=VALUE` arguments as string parameters. Other arguments are skipped.
pub fn parse_params(args: &[String]) -> Vec<(String, String)> {
    args.iter()
        .filter_map(|arg| arg.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn run(name: &str, args: &[String]) -> Result<()> {
    let cache = ArtifactCache::new(CompilerConfig::from_env());
    let template = cache
        .obtain(&Identity::file(name, current_dir()?))
        .with_context(|| format!("cannot load template '{name}'"))?;
    execute(&template, args)
}

pub fn stdin(args: &[String]) -> Result<()> {
    let mut source = String::new();
    io::stdin()
        .read_to_string(&mut source)
        .context("cannot read template from stdin")?;
    let cache = ArtifactCache::new(CompilerConfig::from_env());
    let template = cache.obtain(&Identity::text(source))?;
    execute(&template, args)
}

pub fn compile(targets: &[PathBuf], force: bool, print: bool) -> Result<()> {
    let mut config = CompilerConfig::from_env();
    config.force |= force;
    config.save_generated |= print;
    let cache = ArtifactCache::new(config);
    for target in targets {
        let artifacts = compile_path(&cache, target)?;
        info!(target = %target.display(), count = artifacts.len(), "compiled");
    }
    Ok(())
}

pub fn clean(dirs: &[PathBuf]) -> Result<()> {
    let config = CompilerConfig::from_env();
    for dir in dirs {
        let removed = clean_dir(&config, dir)?;
        info!(dir = %dir.display(), count = removed.len(), "cleaned");
    }
    Ok(())
}

fn execute(template: &TemplateHandle, args: &[String]) -> Result<()> {
    let params = parse_params(args);
    if template.is_callable() {
        let keywords = params
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect();
        let out = template.call(CallArgs {
            positional: Vec::new(),
            keywords,
        })?;
        return print_value(&out);
    }
    let mut dict = Dict::new();
    for (key, value) in params {
        dict.insert_str(&key, Value::from(value));
    }
    template.run(Invocation::new(dict))?;
    Ok(())
}

fn print_value(value: &Value) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match value {
        Value::Str(text) => stdout.write_all(text.as_bytes())?,
        Value::Bytes(bytes) => stdout.write_all(bytes)?,
        Value::None => {}
        other => stdout.write_all(to_str(other).as_bytes())?,
    }
    stdout.flush()?;
    Ok(())
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("cannot determine the current directory")
}
