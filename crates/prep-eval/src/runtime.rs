//! Template invocation.
//!
//! A plain procedure is entered with its parameter mapping, a sink and the
//! two quote overrides bound. Each piece it writes reaches the host as soon
//! as it is written, so output produced before an error is not lost. A callable procedure is entered like a function and
//! returns its joined output. `include` runs another template inside the
//! current invocation, sharing its step budget and call depth.

use std::cell::RefCell;
use std::error::Error;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

use prep_types::procedure::names;
use prep_types::{Procedure, ProcedureKind};

use crate::builtins::str_arg;
use crate::env::{Env, Scope};
use crate::error::{raise, EvalError, EvalResult, Flow, Unwind};
use crate::exceptions::ExcKind;
use crate::format::to_str;
use crate::interpreter::{bind_args, Interpreter};
use crate::ops;
use crate::quote;
use crate::value::{CallArgs, Dict, Value};

/// Name a callable template's function carries in error messages.
const CALLABLE_NAME: &str = "get";

/// Resolves template names for `include()`.
pub trait TemplateLoader {
    fn load(&self, name: &str) -> Result<Arc<Procedure>, Box<dyn Error + Send + Sync>>;
}

/// Options for running a plain template.
///
/// Output goes to `write` when given, else to `output`, else to standard
/// output. Giving both is a configuration error.
#[derive(Default)]
pub struct Invocation {
    pub params: Dict,
    pub quote: Option<Value>,
    pub lquote: Option<Value>,
    pub write: Option<Box<dyn FnMut(&Value)>>,
    pub output: Option<Box<dyn Write>>,
}

impl Invocation {
    pub fn new(params: Dict) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_write(mut self, write: impl FnMut(&Value) + 'static) -> Self {
        self.write = Some(Box::new(write));
        self
    }

    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }
}

/// Where the sink of a running plain template delivers its pieces.
enum Target {
    Collect(Vec<Value>),
    Callback(Box<dyn FnMut(&Value)>),
    Stream(Box<dyn Write>),
}

impl Target {
    fn accept(&mut self, pieces: Vec<Value>) -> io::Result<()> {
        match self {
            Target::Collect(collected) => collected.extend(pieces),
            Target::Callback(write) => {
                for piece in &pieces {
                    write(piece);
                }
            }
            Target::Stream(out) => {
                for piece in &pieces {
                    write_piece(out.as_mut(), piece)?;
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::Stream(out) => out.flush(),
            _ => Ok(()),
        }
    }

    fn take_collected(&mut self) -> Vec<Value> {
        match self {
            Target::Collect(collected) => std::mem::take(collected),
            _ => Vec::new(),
        }
    }
}

fn write_piece(out: &mut dyn Write, piece: &Value) -> io::Result<()> {
    match piece {
        Value::Str(s) => out.write_all(s.as_bytes()),
        Value::Bytes(b) => out.write_all(b),
        Value::None => Ok(()),
        other => out.write_all(to_str(other).as_bytes()),
    }
}

impl Interpreter {
    /// Run a plain template, delivering its output as configured.
    pub fn run(&mut self, procedure: &Procedure, invocation: Invocation) -> EvalResult<()> {
        let Invocation {
            params,
            quote,
            lquote,
            write,
            output,
        } = invocation;
        if write.is_some() && output.is_some() {
            return Err(EvalError::Config(
                "a write callback and an output stream cannot both be given".into(),
            ));
        }
        let target = Rc::new(RefCell::new(match (write, output) {
            (Some(write), _) => Target::Callback(write),
            (None, Some(output)) => Target::Stream(output),
            (None, None) => Target::Stream(Box::new(io::stdout())),
        }));
        let result = self.execute_plain(procedure, params, quote, lquote, &target);
        let flushed = target.borrow_mut().flush();
        result?;
        flushed?;
        Ok(())
    }

    /// Run a plain template and return its output as one value.
    pub fn get_output(
        &mut self,
        procedure: &Procedure,
        params: Dict,
        quote: Option<Value>,
        lquote: Option<Value>,
    ) -> EvalResult<Value> {
        let pieces = self.collect_plain(procedure, params, quote, lquote)?;
        Ok(quote::join(&pieces, procedure.bytes)?)
    }

    /// Call a callable template. The quote overrides travel as the
    /// `__quoteFunc__` and `__lquoteFunc__` keywords.
    pub fn call(&mut self, procedure: &Procedure, args: CallArgs) -> EvalResult<Value> {
        Ok(self.execute_callable(procedure, args)?)
    }

    /// Run a plain template, keeping what it writes.
    fn collect_plain(
        &mut self,
        procedure: &Procedure,
        params: Dict,
        quote: Option<Value>,
        lquote: Option<Value>,
    ) -> Flow<Vec<Value>> {
        let target = Rc::new(RefCell::new(Target::Collect(Vec::new())));
        self.execute_plain(procedure, params, quote, lquote, &target)?;
        let pieces = target.borrow_mut().take_collected();
        Ok(pieces)
    }

    fn execute_plain(
        &mut self,
        procedure: &Procedure,
        params: Dict,
        quote: Option<Value>,
        lquote: Option<Value>,
        target: &Rc<RefCell<Target>>,
    ) -> Flow<()> {
        if procedure.is_callable() {
            return Err(Unwind::Fatal(EvalError::WrongKind(format!(
                "'{}' is callable and must be called with arguments",
                procedure.name
            ))));
        }
        let sink = {
            let target = target.clone();
            Value::native(names::SINK, move |_, _, args| {
                target
                    .borrow_mut()
                    .accept(args.positional)
                    .map_err(|e| Unwind::Fatal(e.into()))?;
                Ok(Value::None)
            })
        };
        let bindings = vec![
            (names::DICTIONARY.to_string(), Value::dict(params)),
            (names::SINK.to_string(), sink),
            (names::QUOTE_OVERRIDE.to_string(), quote.unwrap_or(Value::None)),
            (names::LQUOTE_OVERRIDE.to_string(), lquote.unwrap_or(Value::None)),
        ];
        let depth = self.quote_depth();
        let result = self.run_frame(&Scope::global(), bindings, &procedure.body);
        self.restore_quotes(depth);
        result.map(|_| ())
    }

    fn execute_callable(&mut self, procedure: &Procedure, args: CallArgs) -> Flow<Value> {
        let ProcedureKind::Callable { params } = &procedure.kind else {
            return Err(Unwind::Fatal(EvalError::WrongKind(format!(
                "'{}' is not callable; run it with a parameter mapping",
                procedure.name
            ))));
        };
        let global = Scope::global();
        let spec = self.param_spec(params, &global)?;
        let bindings = bind_args(CALLABLE_NAME, &spec, args)
            .map_err(|message| Unwind::Fatal(EvalError::Signature(message)))?;
        let depth = self.quote_depth();
        let result = self.run_frame(&global, bindings, &procedure.body);
        self.restore_quotes(depth);
        result
    }
}

/// Take the first present keyword among `names`, removing all of them.
fn take_override(args: &mut CallArgs, names: &[&str]) -> Option<Value> {
    let mut found = None;
    for name in names {
        if let Some(value) = args.take_keyword(name) {
            found.get_or_insert(value);
        }
    }
    found
}

/// `include(name, *args, **kwargs)`
pub(crate) fn include(interp: &mut Interpreter, _: &Env, mut args: CallArgs) -> Flow<Value> {
    let quote = take_override(&mut args, &[names::QUOTE_OVERRIDE, "quoteFunc"]);
    let lquote = take_override(&mut args, &[names::LQUOTE_OVERRIDE, "lquoteFunc"]);
    if args.positional.is_empty() {
        return raise(ExcKind::TypeError, "include() missing required argument 'name'");
    }
    let name = str_arg("include", &args.positional.remove(0))?.to_string();
    let Some(loader) = interp.loader() else {
        return raise(ExcKind::RuntimeError, "include() is unavailable without a template loader");
    };
    let procedure = loader.load(&name).map_err(|source| {
        Unwind::Fatal(EvalError::Include {
            name: name.clone(),
            source,
        })
    })?;

    let (quote, lquote) = match (quote, lquote) {
        (None, None) => match interp.current_quotes() {
            Some(pair) => (Some(pair.quote.clone()), Some(pair.lquote.clone())),
            None => (None, None),
        },
        explicit => explicit,
    };

    if procedure.is_callable() {
        let mut call = args;
        if let Some(quote) = quote {
            call.keywords.push((names::QUOTE_OVERRIDE.to_string(), quote));
        }
        if let Some(lquote) = lquote {
            call.keywords.push((names::LQUOTE_OVERRIDE.to_string(), lquote));
        }
        return interp.execute_callable(&procedure, call);
    }

    if args.positional.len() > 1 {
        return raise(
            ExcKind::TypeError,
            format!(
                "include() of a plain template takes at most one parameter mapping ({} given)",
                args.positional.len()
            ),
        );
    }
    let mut params = match args.positional.first() {
        Some(mapping) => ops::dict_from(mapping)?,
        None => Dict::new(),
    };
    for (key, value) in args.keywords {
        params.insert_str(&key, value);
    }
    let pieces = interp.collect_plain(&procedure, params, quote, lquote)?;
    quote::join(&pieces, procedure.bytes)
}
