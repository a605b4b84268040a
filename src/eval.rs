use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::environment;
use crate::error::{LispError, LispResult};
use crate::expand::{instantiate, macro_parts};
use crate::heap::{Heap, Object};
use crate::primitives;
use crate::printer;
use crate::reader::{Reader, Readtable};
use crate::stream::{CharStream, FileStream, MemoryStream, StreamTable};
use crate::symbol::{sym, SpecialForm, SymbolTable};
use crate::value::{EnvId, NativeId, StreamId, SymbolId, Value};

/// Source evaluated by [`Interpreter::install_prelude`].
pub const PRELUDE: &str = include_str!("prelude.lips");

/// The lips interpreter.
/// All interpreter state lives here so GC can find roots.
pub struct Interpreter {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub streams: StreamTable,
    pub readtable: Readtable,
    pub(crate) config: Config,

    /// The outermost frame. Sole GC root.
    global: EnvId,
    /// Ctrl+C interrupt flag.
    interrupted: Arc<AtomicBool>,
    /// Set while `*ERROR-HANDLER*` runs, so a nested ERROR is not handled.
    handling_error: bool,
    /// Stack address at the outermost `eval`/`apply`, while one is running.
    stack_base: Option<usize>,
}

/// Address of a local in a fresh frame: the current native stack position.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

impl Interpreter {
    pub fn new() -> LispResult<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> LispResult<Self> {
        Self::with_streams(config, StreamTable::new())
    }

    /// Build an interpreter whose standard streams are taken from `streams`.
    pub fn with_streams(config: Config, streams: StreamTable) -> LispResult<Self> {
        let mut heap = Heap::new(config.heap_capacity);
        heap.set_gc_threshold(config.gc_threshold);
        let global = environment::new_frame(&mut heap, None, Value::Nil)?;

        let mut interp = Interpreter {
            heap,
            symbols: SymbolTable::new(),
            streams,
            readtable: Readtable::default(),
            config,
            global,
            interrupted: Arc::new(AtomicBool::new(false)),
            handling_error: false,
            stack_base: None,
        };

        interp.install_natives()?;
        interp.define(sym::STANDARD_INPUT, Value::Stream(StreamTable::stdin_id()))?;
        interp.define(sym::STANDARD_OUTPUT, Value::Stream(StreamTable::stdout_id()))?;

        if interp.config.load_prelude {
            interp.install_prelude()?;
        }
        Ok(interp)
    }

    /// Bind every native function under its name in the global frame.
    fn install_natives(&mut self) -> LispResult<()> {
        for (i, native) in primitives::NATIVES.iter().enumerate() {
            let name = self.symbols.intern(native.name);
            self.define(name, Value::Native(NativeId(i as u32)))?;
        }
        Ok(())
    }

    /// Evaluate the embedded prelude (DEFUN, IF, NULL, ...).
    pub fn install_prelude(&mut self) -> LispResult<()> {
        log::debug!("loading prelude");
        self.eval_str(PRELUDE).map(|_| ())
    }

    /// Bind a name in the global frame.
    pub fn define(&mut self, name: SymbolId, val: Value) -> LispResult<()> {
        environment::bind(&mut self.heap, &self.symbols, self.global, name, val)
    }

    pub fn global_env(&self) -> EnvId {
        self.global
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the interrupt flag for use with Ctrl+C handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    // ========================================================================
    // Reading and printing
    // ========================================================================

    /// Read one form from a registered stream. None at end of input.
    pub fn read(&mut self, stream: StreamId) -> LispResult<Option<Value>> {
        let Interpreter {
            heap,
            symbols,
            streams,
            readtable,
            ..
        } = self;
        let input = streams.get(stream)?;
        Reader::new(heap, symbols, readtable).read(input)
    }

    /// Read the first form of a string.
    pub fn read_str(&mut self, src: &str) -> LispResult<Value> {
        let mut stream = MemoryStream::new(src);
        Reader::new(&mut self.heap, &mut self.symbols, &mut self.readtable).read_form(&mut stream)
    }

    pub fn print(&self, val: Value) -> String {
        printer::print_value(&self.heap, &self.symbols, val)
    }

    // ========================================================================
    // Top level
    // ========================================================================

    /// Expand and evaluate a form read at top level, in the global frame.
    pub fn eval_toplevel(&mut self, form: Value) -> LispResult<Value> {
        let (form, _) = self.expand(form, Value::Nil)?;
        self.eval(form, self.global)
    }

    /// Read, expand and evaluate every form in `src`. Returns the last value,
    /// or NIL for empty input.
    pub fn eval_str(&mut self, src: &str) -> LispResult<Value> {
        let mut stream = MemoryStream::new(src);
        self.eval_stream(&mut stream).map(|(last, _)| last)
    }

    /// Evaluate every form in a source file. Returns the number of forms.
    pub fn load_file(&mut self, path: &Path) -> LispResult<usize> {
        let mut stream = FileStream::open(path)?;
        let (_, count) = self.eval_stream(&mut stream)?;
        log::debug!("loaded {} forms from {}", count, path.display());
        Ok(count)
    }

    fn eval_stream(&mut self, stream: &mut dyn CharStream) -> LispResult<(Value, usize)> {
        let mut last = Value::Nil;
        let mut count = 0;
        loop {
            let form =
                Reader::new(&mut self.heap, &mut self.symbols, &mut self.readtable).read(stream)?;
            match form {
                Some(form) => {
                    last = self.eval_toplevel(form)?;
                    count += 1;
                }
                None => return Ok((last, count)),
            }
        }
    }

    // ========================================================================
    // GC
    // ========================================================================

    /// Mark everything reachable from the global frame and sweep the rest.
    /// Only safe between top-level evaluations: values held on the Rust
    /// stack are not roots.
    pub fn collect_garbage(&mut self) {
        self.collect_garbage_with(None, Value::Nil);
    }

    /// Collect with `env` and `live` as extra roots.
    fn collect_garbage_with(&mut self, env: Option<EnvId>, live: Value) {
        self.heap.clear_marks();
        self.heap.mark_frame(self.global);
        if let Some(env) = env {
            self.heap.mark_frame(env);
        }
        self.heap.mark_value(live);
        self.heap.sweep();
        log::debug!(
            "gc: {} cells, {} objects, {} frames live",
            self.heap.live_cells(),
            self.heap.live_objects(),
            self.heap.live_frames()
        );
    }

    /// Collect if enough has been allocated since the last collection.
    pub fn maybe_collect_garbage(&mut self) {
        if self.heap.should_gc() {
            self.collect_garbage();
        }
    }

    // ========================================================================
    // Core evaluation entry point
    // ========================================================================

    /// Evaluate an expression in the given environment.
    pub fn eval(&mut self, expr: Value, env: EnvId) -> LispResult<Value> {
        self.with_stack_base(|interp| interp.eval_depth(expr, env, 0))
    }

    /// Apply a function value to already-evaluated arguments.
    pub fn apply(&mut self, func: Value, args: &[Value]) -> LispResult<Value> {
        self.with_stack_base(|interp| interp.apply_values(func, args, 0))
    }

    fn with_stack_base<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        if self.stack_base.is_some() {
            return f(self);
        }
        self.stack_base = Some(stack_position());
        let result = f(self);
        self.stack_base = None;
        result
    }

    /// Native stack consumed since the outermost `eval`/`apply`.
    fn stack_used(&self) -> usize {
        self.stack_base.map_or(0, |base| base.abs_diff(stack_position()))
    }

    fn eval_depth(&mut self, expr: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        if depth > self.config.max_depth {
            return Err(LispError::DepthExceeded(self.config.max_depth));
        }
        if self.stack_used() > self.config.max_stack {
            log::debug!("native stack limit reached at depth {}", depth);
            return Err(LispError::DepthExceeded(depth));
        }
        log::trace!("eval[{}] {}", depth, self.print(expr));

        match expr {
            Value::Symbol(sym::T) => Ok(expr),
            Value::Symbol(name) => self.lookup(name, env),
            Value::Pair(id) => {
                let head = self.heap.car(id);
                let args = self.heap.cdr(id);
                match head {
                    Value::Symbol(name) => {
                        if let Some(form) = SpecialForm::classify(name) {
                            return self.special_form(form, args, env, depth);
                        }
                        let func = self.lookup(name, env)?;
                        self.apply_form(func, args, env, depth)
                    }
                    Value::Pair(_) => {
                        // Evaluate the head, then dispatch again with the result in its place.
                        let func = self.eval_depth(head, env, depth + 1)?;
                        if func.is_symbol() {
                            let form = self.heap.cons(func, args)?;
                            return self.eval_depth(form, env, depth + 1);
                        }
                        self.apply_form(func, args, env, depth)
                    }
                    other => self.apply_form(other, args, env, depth),
                }
            }
            Value::Nil
            | Value::Integer(_)
            | Value::Str(_)
            | Value::Lambda(_)
            | Value::Macro(_)
            | Value::Native(_)
            | Value::Stream(_) => Ok(expr),
        }
    }

    fn lookup(&self, name: SymbolId, env: EnvId) -> LispResult<Value> {
        environment::resolve(&self.heap, env, name)
            .map(|(_, val)| val)
            .ok_or_else(|| {
                LispError::UnboundSymbol(self.symbols.display_name(name).into_owned())
            })
    }

    fn check_interrupt(&self) -> LispResult<()> {
        if self.interrupted.swap(false, Ordering::Relaxed) {
            return Err(LispError::Interrupted);
        }
        Ok(())
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Apply `func` to the unevaluated argument forms `args`.
    fn apply_form(&mut self, func: Value, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        self.check_interrupt()?;
        match func {
            Value::Macro(id) => {
                let (params, body) = macro_parts(&self.heap, id)
                    .ok_or_else(|| LispError::Type("not a macro".into()))?;
                let replacement = instantiate(&mut self.heap, params, body, args)?;
                self.eval_depth(replacement, env, depth + 1)
            }
            Value::Native(_) | Value::Lambda(_) => {
                let vals = self.eval_args(args, env, depth)?;
                self.apply_values(func, &vals, depth)
            }
            other => Err(LispError::Type(format!(
                "{} is not a function",
                self.print(other)
            ))),
        }
    }

    fn eval_args(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Vec<Value>> {
        let forms = self
            .heap
            .list_to_vec(args)
            .ok_or_else(|| self.malformed("argument list", args))?;
        let mut vals = Vec::with_capacity(forms.len());
        for form in forms {
            vals.push(self.eval_depth(form, env, depth + 1)?);
        }
        Ok(vals)
    }

    fn apply_values(&mut self, func: Value, vals: &[Value], depth: usize) -> LispResult<Value> {
        match func {
            Value::Native(id) => {
                let native = primitives::native(id)
                    .ok_or_else(|| LispError::Type(format!("unknown native {}", id.0)))?;
                if native.arity >= 0 && vals.len() != native.arity as usize {
                    return Err(LispError::Arity {
                        name: native.name.to_string(),
                        expected: native.arity,
                        got: vals.len(),
                    });
                }
                log::trace!("apply {} to {} args", native.name, vals.len());
                (native.func)(self, vals)
            }
            Value::Lambda(id) => {
                let (params, body, closure) = match *self.heap.object(id) {
                    Object::Lambda { params, body, env } => (params, body, env),
                    _ => return Err(LispError::Type("not a lambda".into())),
                };
                let vals = self.heap.list(vals)?;
                let bindings = environment::pair(&mut self.heap, params, vals)?;
                let frame = environment::new_frame(&mut self.heap, Some(closure), bindings)?;
                self.eval_depth(body, frame, depth + 1)
            }
            other => Err(LispError::Type(format!(
                "{} is not a function",
                self.print(other)
            ))),
        }
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn special_form(
        &mut self,
        form: SpecialForm,
        args: Value,
        env: EnvId,
        depth: usize,
    ) -> LispResult<Value> {
        match form {
            SpecialForm::Quote => {
                let [quoted] = self.fixed_args::<1>("QUOTE", args)?;
                Ok(quoted)
            }
            SpecialForm::Lambda => {
                let [params, body] = self.fixed_args::<2>("LAMBDA", args)?;
                self.check_params("LAMBDA", params)?;
                self.heap.alloc_lambda(params, body, env)
            }
            SpecialForm::Macro => {
                let [params, body] = self.fixed_args::<2>("MACRO", args)?;
                self.check_params("MACRO", params)?;
                self.heap.alloc_macro(params, body)
            }
            SpecialForm::Label => self.eval_label(args, env, depth),
            SpecialForm::Cond => self.eval_cond(args, env, depth),
            SpecialForm::Eval => {
                let [form] = self.fixed_args::<1>("EVAL", args)?;
                let form = self.eval_depth(form, env, depth + 1)?;
                self.eval_depth(form, env, depth + 1)
            }
            SpecialForm::Print => self.eval_print(args, env, depth),
            SpecialForm::Loop => self.eval_loop(args, env, depth),
            SpecialForm::Read => self.eval_read(args, env, depth),
            SpecialForm::Error => self.signal_error(args, env, depth),
        }
    }

    /// (LABEL name form): evaluate `form` and bind it in the current frame.
    fn eval_label(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let [name, form] = self.fixed_args::<2>("LABEL", args)?;
        let name = name
            .as_symbol()
            .ok_or_else(|| self.malformed("LABEL", args))?;
        let val = self.eval_depth(form, env, depth + 1)?;
        environment::bind(&mut self.heap, &self.symbols, env, name, val)?;
        Ok(val)
    }

    /// (COND (test form...)...): the first clause whose test is not NIL
    /// yields its last form, or the test value when it has none.
    fn eval_cond(&mut self, clauses: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let clauses = self
            .heap
            .list_to_vec(clauses)
            .ok_or_else(|| self.malformed("COND", clauses))?;
        for clause in clauses {
            let forms = match self.heap.list_to_vec(clause) {
                Some(forms) if !forms.is_empty() => forms,
                _ => return Err(self.malformed("COND clause", clause)),
            };
            let test = self.eval_depth(forms[0], env, depth + 1)?;
            if test.is_truthy() {
                let mut result = test;
                for &form in &forms[1..] {
                    result = self.eval_depth(form, env, depth + 1)?;
                }
                return Ok(result);
            }
        }
        Ok(Value::Nil)
    }

    /// (PRINT form [stream]): write the value and a newline, return the value.
    fn eval_print(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let forms = self.optional_stream_args("PRINT", args, 1)?;
        let val = self.eval_depth(forms[0], env, depth + 1)?;
        let stream = self.stream_arg(forms.get(1).copied(), sym::STANDARD_OUTPUT, env, depth)?;

        let mut out = Vec::new();
        printer::write_value(&self.heap, &self.symbols, val, &mut out);
        out.push(b'\n');
        let output = self.streams.get(stream)?;
        output.write_bytes(&out)?;
        output.flush()?;
        Ok(val)
    }

    /// (LOOP form...): evaluate the body forever. Only an error or an
    /// interrupt ends it.
    ///
    /// LOOP never returns a value, so between iterations nothing on the Rust
    /// stack outlives it except its body and environment. Each iteration
    /// boundary is a collection point rooted at those and the global frame.
    fn eval_loop(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let body = match self.heap.list_to_vec(args) {
            Some(body) if !body.is_empty() => body,
            _ => return Err(self.malformed("LOOP", args)),
        };
        loop {
            self.check_interrupt()?;
            if self.heap.should_gc() {
                self.collect_garbage_with(Some(env), args);
            }
            for &form in &body {
                self.eval_depth(form, env, depth + 1)?;
            }
        }
    }

    /// (READ [stream]): read one form and macro-expand it.
    fn eval_read(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let forms = self.optional_stream_args("READ", args, 0)?;
        let stream = self.stream_arg(forms.first().copied(), sym::STANDARD_INPUT, env, depth)?;
        match self.read(stream)? {
            Some(form) => self.expand(form, Value::Nil).map(|(form, _)| form),
            None => Err(LispError::EndOfInput),
        }
    }

    /// (ERROR designator): hand the unevaluated designator to
    /// `*ERROR-HANDLER*` and return its result. Fails with a user error when
    /// no handler is bound or one is already running.
    fn signal_error(&mut self, args: Value, env: EnvId, depth: usize) -> LispResult<Value> {
        let [designator] = self.fixed_args::<1>("ERROR", args)?;
        if self.handling_error {
            return Err(LispError::User(self.print(designator)));
        }

        let handler = environment::resolve(&self.heap, env, sym::ERROR_HANDLER).map(|(_, h)| h);
        match handler {
            Some(handler @ (Value::Lambda(_) | Value::Native(_))) => {
                log::debug!("ERROR {} passed to handler", self.print(designator));
                self.handling_error = true;
                let result = self.apply_values(handler, &[designator], depth + 1);
                self.handling_error = false;
                result
            }
            _ => Err(LispError::User(self.print(designator))),
        }
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn malformed(&self, what: &str, form: Value) -> LispError {
        LispError::MalformedForm(format!("{}: {}", what, self.print(form)))
    }

    /// Destructure an argument list of exactly N forms.
    fn fixed_args<const N: usize>(&self, what: &str, args: Value) -> LispResult<[Value; N]> {
        self.heap
            .list_to_vec(args)
            .and_then(|forms| <[Value; N]>::try_from(forms).ok())
            .ok_or_else(|| self.malformed(what, args))
    }

    /// Argument list of `required` forms plus an optional stream form.
    fn optional_stream_args(
        &self,
        what: &str,
        args: Value,
        required: usize,
    ) -> LispResult<Vec<Value>> {
        match self.heap.list_to_vec(args) {
            Some(forms) if forms.len() == required || forms.len() == required + 1 => Ok(forms),
            _ => Err(self.malformed(what, args)),
        }
    }

    /// Evaluate an explicit stream form, or fall back to the stream bound to
    /// `default`.
    fn stream_arg(
        &mut self,
        form: Option<Value>,
        default: SymbolId,
        env: EnvId,
        depth: usize,
    ) -> LispResult<StreamId> {
        let val = match form {
            Some(form) => self.eval_depth(form, env, depth + 1)?,
            None => self.lookup(default, env)?,
        };
        match val {
            Value::Stream(id) => Ok(id),
            other => Err(LispError::Type(format!(
                "expected a stream, got {}",
                other.type_name()
            ))),
        }
    }

    fn check_params(&self, what: &str, params: Value) -> LispResult<()> {
        match self.heap.list_to_vec(params) {
            Some(names) if names.iter().all(|v| v.is_symbol()) => Ok(()),
            _ => Err(self.malformed(what, params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use pretty_assertions::assert_eq;

    fn interp() -> Interpreter {
        Interpreter::new().unwrap()
    }

    fn eval_print(interp: &mut Interpreter, src: &str) -> String {
        let val = interp.eval_str(src).unwrap();
        interp.print(val)
    }

    /// An interpreter whose standard streams are memory buffers.
    fn with_io(input: &str) -> Interpreter {
        with_io_config(input, Config::default())
    }

    fn with_io_config(input: impl Into<Vec<u8>>, config: Config) -> Interpreter {
        let streams = StreamTable::with_stdio(
            Box::new(MemoryStream::new(input)),
            Box::new(MemoryStream::empty()),
        );
        Interpreter::with_streams(config, streams).unwrap()
    }

    fn output(interp: &mut Interpreter) -> String {
        let out = interp.streams.get(StreamTable::stdout_id()).unwrap();
        String::from_utf8_lossy(out.as_bytes().unwrap_or_default()).into_owned()
    }

    #[test]
    fn atoms_evaluate_to_themselves() {
        let mut interp = interp();
        assert_eq!(eval_print(&mut interp, "42"), "42");
        assert_eq!(eval_print(&mut interp, "\"text\""), "text");
        assert_eq!(eval_print(&mut interp, "T"), "T");
        assert_eq!(eval_print(&mut interp, "NIL"), "NIL");
        assert_eq!(eval_print(&mut interp, "CONS"), "#<Function CONS>");
    }

    #[test]
    fn unbound_symbol_is_an_error() {
        let mut interp = interp();
        assert_eq!(
            interp.eval_str("NOWHERE"),
            Err(LispError::UnboundSymbol("NOWHERE".into()))
        );
    }

    #[test]
    fn quote_returns_its_argument() {
        let mut interp = interp();
        assert_eq!(eval_print(&mut interp, "(QUOTE (A B))"), "(A B)");
        assert_eq!(eval_print(&mut interp, "'X"), "X");
        assert!(matches!(
            interp.eval_str("(QUOTE A B)"),
            Err(LispError::MalformedForm(_))
        ));
    }

    #[test]
    fn lambda_application_binds_parameters() {
        let mut interp = interp();
        assert_eq!(
            eval_print(&mut interp, "((LAMBDA (X) (CONS X (QUOTE B))) (QUOTE A))"),
            "(A . B)"
        );
        assert_eq!(eval_print(&mut interp, "((LAMBDA (X Y) Y) 1 2)"), "2");
        assert_eq!(eval_print(&mut interp, "(LAMBDA (X) X)"), "#<Lambda>");
    }

    #[test]
    fn lambda_with_two_body_forms_is_malformed() {
        let mut interp = interp();
        assert!(matches!(
            interp.eval_str("(LAMBDA (X) X X)"),
            Err(LispError::MalformedForm(_))
        ));
        assert!(matches!(
            interp.eval_str("(LAMBDA (1) X)"),
            Err(LispError::MalformedForm(_))
        ));
    }

    #[test]
    fn closures_capture_their_frame() {
        let mut interp = interp();
        interp
            .eval_str("(LABEL MAKE-ADDER (LAMBDA (X) (LAMBDA (Y) (CONS X Y))))")
            .unwrap();
        interp.eval_str("(LABEL ADD1 (MAKE-ADDER 1))").unwrap();
        assert_eq!(eval_print(&mut interp, "(ADD1 2)"), "(1 . 2)");
    }

    #[test]
    fn closures_see_later_labels_in_the_same_frame() {
        let mut interp = interp();
        interp.eval_str("(LABEL GET-Z (LAMBDA () Z))").unwrap();
        assert!(matches!(
            interp.eval_str("(GET-Z)"),
            Err(LispError::UnboundSymbol(_))
        ));
        interp.eval_str("(LABEL Z 7)").unwrap();
        assert_eq!(eval_print(&mut interp, "(GET-Z)"), "7");
    }

    #[test]
    fn label_returns_the_value_and_shadows() {
        let mut interp = interp();
        assert_eq!(eval_print(&mut interp, "(LABEL X 1)"), "1");
        interp.eval_str("(LABEL X 2)").unwrap();
        assert_eq!(eval_print(&mut interp, "X"), "2");
    }

    #[test]
    fn cond_picks_first_true_clause() {
        let mut interp = interp();
        assert_eq!(eval_print(&mut interp, "(COND (NIL 1) (T 2))"), "2");
        assert_eq!(eval_print(&mut interp, "(COND (NIL 1))"), "NIL");
        assert_eq!(eval_print(&mut interp, "(COND ((QUOTE A)))"), "A");
        assert_eq!(eval_print(&mut interp, "(COND (T 1 2 3))"), "3");
        assert!(matches!(
            interp.eval_str("(COND X)"),
            Err(LispError::MalformedForm(_))
        ));
    }

    #[test]
    fn list_head_is_evaluated_and_redispatched() {
        let mut interp = interp();
        assert_eq!(eval_print(&mut interp, "((QUOTE CONS) 1 2)"), "(1 . 2)");
        assert_eq!(eval_print(&mut interp, "((QUOTE QUOTE) A)"), "A");
        assert_eq!(eval_print(&mut interp, "((LAMBDA (X) X) 1)"), "1");
    }

    #[test]
    fn applying_a_non_function_is_a_type_error() {
        let mut interp = interp();
        assert!(matches!(interp.eval_str("(1 2)"), Err(LispError::Type(_))));
        interp.eval_str("(LABEL N 5)").unwrap();
        assert!(matches!(interp.eval_str("(N 2)"), Err(LispError::Type(_))));
    }

    #[test]
    fn native_arity_is_checked() {
        let mut interp = interp();
        assert_eq!(
            interp.eval_str("(CONS 1)"),
            Err(LispError::Arity {
                name: "CONS".into(),
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn eval_evaluates_a_constructed_form() {
        let mut interp = interp();
        assert_eq!(
            eval_print(&mut interp, "(EVAL (QUOTE (CONS 1 2)))"),
            "(1 . 2)"
        );
        assert_eq!(
            eval_print(&mut interp, "((LAMBDA (X) (EVAL (QUOTE X))) 9)"),
            "9"
        );
    }

    #[test]
    fn macros_expand_at_call_time_in_caller_env() {
        let mut interp = interp();
        interp
            .eval_str("(LABEL FOO (MACRO (A) (CONS 13 (CONS A NIL))))")
            .unwrap();
        assert_eq!(eval_print(&mut interp, "(FOO 42)"), "(13 42)");
        assert_eq!(eval_print(&mut interp, "((LAMBDA (Y) (FOO Y)) 5)"), "(13 5)");
        assert_eq!(eval_print(&mut interp, "FOO"), "#<Macro>");
    }

    #[test]
    fn defun_from_prelude() {
        let mut interp = interp();
        interp.eval_str("(DEFUN SWAP (P) (CONS (CDR P) (CAR P)))").unwrap();
        assert_eq!(eval_print(&mut interp, "(SWAP (CONS 1 2))"), "(2 . 1)");
        assert_eq!(eval_print(&mut interp, "(IF NIL 1 2)"), "2");
        assert_eq!(eval_print(&mut interp, "(CADR (QUOTE (A B C)))"), "B");
        assert_eq!(eval_print(&mut interp, "(NULL NIL)"), "T");
        assert_eq!(eval_print(&mut interp, "(NOT (QUOTE A))"), "NIL");
    }

    #[test]
    fn recursive_defun() {
        let mut interp = interp();
        interp
            .eval_str("(DEFUN LAST (L) (COND ((CDR L) (LAST (CDR L))) (T (CAR L))))")
            .unwrap();
        assert_eq!(eval_print(&mut interp, "(LAST (QUOTE (1 2 3 4)))"), "4");
    }

    #[test]
    fn print_writes_to_standard_output() {
        let mut interp = with_io("");
        assert_eq!(eval_print(&mut interp, "(PRINT (CONS 1 2))"), "(1 . 2)");
        interp.eval_str("(PRINT \"hi\")").unwrap();
        assert_eq!(output(&mut interp), "(1 . 2)\nhi\n");
    }

    #[test]
    fn read_takes_forms_from_standard_input() {
        let mut interp = with_io("(CONS 1 2) FOO");
        assert_eq!(eval_print(&mut interp, "(READ)"), "(CONS 1 2)");
        assert_eq!(eval_print(&mut interp, "(READ)"), "FOO");
        assert_eq!(interp.eval_str("(READ)"), Err(LispError::EndOfInput));
    }

    #[test]
    fn read_expands_macros() {
        let mut interp = with_io("(IF T 1 2)");
        assert_eq!(eval_print(&mut interp, "(READ)"), "(COND (T 1) (T 2))");
    }

    #[test]
    fn read_eval_print_loop_runs_until_end_of_input() {
        let mut interp = with_io("(CONS 1 2)\n(CAR (QUOTE (A B)))\n");
        assert_eq!(
            interp.eval_str("(LOOP (PRINT (EVAL (READ))))"),
            Err(LispError::EndOfInput)
        );
        assert_eq!(output(&mut interp), "(1 . 2)\nA\n");
    }

    #[test]
    fn print_and_read_accept_an_explicit_stream() {
        let mut interp = with_io("");
        let id = interp.streams.open_memory("(A B)");
        let name = interp.symbols.intern("IN");
        interp.define(name, Value::Stream(id)).unwrap();
        assert_eq!(eval_print(&mut interp, "(READ IN)"), "(A B)");
        assert!(matches!(
            interp.eval_str("(PRINT 1 2)"),
            Err(LispError::Type(_))
        ));
    }

    #[test]
    fn error_without_handler_is_a_user_error() {
        let mut interp = interp();
        assert_eq!(
            interp.eval_str("(ERROR OOPS)"),
            Err(LispError::User("OOPS".into()))
        );
    }

    #[test]
    fn error_handler_receives_designator() {
        let mut interp = interp();
        interp
            .eval_str("(LABEL *ERROR-HANDLER* (LAMBDA (E) (CONS (QUOTE CAUGHT) E)))")
            .unwrap();
        assert_eq!(eval_print(&mut interp, "(ERROR OOPS)"), "(CAUGHT . OOPS)");
        assert_eq!(
            eval_print(&mut interp, "(CONS 1 (ERROR BAD))"),
            "(1 CAUGHT . BAD)"
        );
    }

    #[test]
    fn error_inside_handler_is_not_handled_again() {
        let mut interp = interp();
        interp
            .eval_str("(LABEL *ERROR-HANDLER* (LAMBDA (E) (ERROR AGAIN)))")
            .unwrap();
        assert_eq!(
            interp.eval_str("(ERROR FIRST)"),
            Err(LispError::User("AGAIN".into()))
        );
        // The handler is usable again afterwards.
        interp
            .eval_str("(LABEL *ERROR-HANDLER* (LAMBDA (E) E))")
            .unwrap();
        assert_eq!(eval_print(&mut interp, "(ERROR THIRD)"), "THIRD");
    }

    #[test]
    fn deep_recursion_hits_the_depth_limit() {
        let mut interp = Interpreter::with_config(Config {
            max_depth: 64,
            ..Config::default()
        })
        .unwrap();
        interp.eval_str("(DEFUN FOREVER (X) (FOREVER X))").unwrap();
        assert_eq!(
            interp.eval_str("(FOREVER 1)"),
            Err(LispError::DepthExceeded(64))
        );
        // Still usable afterwards.
        assert_eq!(eval_print(&mut interp, "(CONS 1 2)"), "(1 . 2)");
    }

    #[test]
    fn default_limits_stop_runaway_recursion_on_a_spawned_thread() {
        let mut interp = interp();
        interp.eval_str("(DEFUN FOREVER (X) (FOREVER X))").unwrap();
        assert!(matches!(
            interp.eval_str("(FOREVER 1)"),
            Err(LispError::DepthExceeded(_))
        ));

        interp
            .eval_str("(DEFUN LEN (L) (COND ((NULL L) NIL) (T (CONS 1 (LEN (CDR L))))))")
            .unwrap();
        let long_list = format!("(LEN (QUOTE ({})))", "A ".repeat(2000));
        assert!(matches!(
            interp.eval_str(&long_list),
            Err(LispError::DepthExceeded(_))
        ));
        assert_eq!(eval_print(&mut interp, "(LEN (QUOTE (A B)))"), "(1 1)");
    }

    #[test]
    fn symbols_differing_in_non_utf8_bytes_are_not_eq() {
        let mut interp = interp();
        let id = interp
            .streams
            .open_memory(&b"(EQ (QUOTE \xff) (QUOTE \xfe)) (EQ (QUOTE \xff) (QUOTE \xff))"[..]);
        let form = interp.read(id).unwrap().unwrap();
        assert_eq!(interp.eval_toplevel(form), Ok(Value::Nil));
        let form = interp.read(id).unwrap().unwrap();
        assert_eq!(interp.eval_toplevel(form), Ok(Value::Symbol(sym::T)));
    }

    #[test]
    fn loop_reclaims_garbage_between_iterations() {
        let config = Config {
            heap_capacity: 20_000,
            ..Config::default()
        };
        let mut interp = with_io_config("(CONS 1 (CONS 2 NIL))\n".repeat(5000), config);
        assert_eq!(
            interp.eval_str("(LOOP (PRINT (EVAL (READ))))"),
            Err(LispError::EndOfInput)
        );
        let printed = output(&mut interp);
        assert_eq!(printed.lines().count(), 5000);
        assert!(printed.lines().all(|line| line == "(1 2)"));

        // Definitions made before the loop survive its collections.
        assert_eq!(eval_print(&mut interp, "(CADR (QUOTE (A B)))"), "B");
    }

    #[test]
    fn loop_keeps_its_environment_across_collections() {
        let config = Config {
            heap_capacity: 4096,
            ..Config::default()
        };
        let mut interp = with_io_config("", config);
        let flag = interp.interrupt_flag();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            flag.store(true, Ordering::Relaxed);
        });
        // KEEP lives only in the lambda's frame. Without collection the loop
        // would exhaust the heap long before the interrupt arrives.
        assert_eq!(
            interp.eval_str(
                "((LAMBDA (KEEP)
                   (LOOP (CONS KEEP (CONS KEEP NIL))
                         (COND ((EQ (CAR KEEP) (QUOTE X)) NIL) (T (ERROR LOST)))))
                  (QUOTE (X Y)))"
            ),
            Err(LispError::Interrupted)
        );
        handle.join().unwrap();
    }

    #[test]
    fn interrupt_stops_loop_and_is_cleared() {
        let mut interp = interp();
        interp.interrupt_flag().store(true, Ordering::Relaxed);
        assert_eq!(
            interp.eval_str("(LOOP (CONS 1 2))"),
            Err(LispError::Interrupted)
        );
        assert!(!interp.interrupt_flag().load(Ordering::Relaxed));
    }

    #[test]
    fn interrupt_from_another_thread_ends_a_running_loop() {
        let mut interp = interp();
        let flag = interp.interrupt_flag();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            flag.store(true, Ordering::Relaxed);
        });
        assert_eq!(
            interp.eval_str("(LOOP (CAR (QUOTE (A))))"),
            Err(LispError::Interrupted)
        );
        handle.join().unwrap();
    }

    #[test]
    fn garbage_is_reclaimed_and_definitions_survive() {
        let mut interp = interp();
        interp.eval_str("(LABEL KEEP (QUOTE (1 2 3)))").unwrap();
        interp.collect_garbage();
        let baseline = interp.heap.live_cells();

        for _ in 0..20 {
            interp.eval_str("(CONS 1 (CONS 2 (CONS 3 NIL)))").unwrap();
        }
        assert!(interp.heap.live_cells() > baseline);

        interp.collect_garbage();
        assert_eq!(interp.heap.live_cells(), baseline);
        assert_eq!(eval_print(&mut interp, "KEEP"), "(1 2 3)");
        assert_eq!(eval_print(&mut interp, "(CADR KEEP)"), "2");
    }
}
