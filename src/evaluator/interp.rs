//! Tree-walking interpreter

use super::parser::{BinOp, CmpOp, Expr, Program, Stmt, StmtKind, Target};
use super::value::{Builtin, Exception, Function, Number, Value, EXCEPTION_CLASSES};
use super::Namespace;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// Nested user function calls allowed before `RecursionError`
const MAX_DEPTH: usize = 100;

/// Expression evaluation levels allowed across all active frames
const MAX_NESTING: usize = 400;

/// Largest sequence produced by repetition
const MAX_REPEAT_LEN: usize = 1 << 24;

const CONVERSION_CLASSES: &[&str] = &["int", "float", "str", "bool", "list"];

/// Exception on its way out, collecting frames as it unwinds
#[derive(Debug)]
pub(crate) struct Raised {
    pub exc: Exception,
    /// (line, frame name), innermost first
    frames: Vec<(usize, String)>,
}

impl Raised {
    /// Python-style traceback, outermost frame first
    pub(crate) fn render(&self, filename: &str) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        let frames: Vec<&(usize, String)> = self.frames.iter().rev().collect();
        let mut i = 0;
        while i < frames.len() {
            let mut run = 1;
            while i + run < frames.len() && frames[i + run] == frames[i] {
                run += 1;
            }
            let (line, name) = frames[i];
            for _ in 0..run.min(3) {
                out.push_str(&format!("  File \"{}\", line {}, in {}\n", filename, line, name));
            }
            if run > 3 {
                out.push_str(&format!("  [Previous line repeated {} more times]\n", run - 3));
            }
            i += run;
        }
        out.push_str(&format!("{}\n", self.exc));
        out
    }
}

/// Non-local exit from running code
#[derive(Debug)]
pub(crate) enum Signal {
    Raise(Raised),
    Exit(i32),
}

impl From<Exception> for Signal {
    fn from(exc: Exception) -> Self {
        Signal::Raise(Raised {
            exc,
            frames: Vec::new(),
        })
    }
}

type Exec<T> = Result<T, Signal>;

enum Scope {
    Module,
    Function(HashMap<String, Value>),
}

enum Flow {
    Normal,
    Return(Value),
}

pub(crate) struct Interpreter<'a> {
    globals: &'a mut Namespace,
    out: &'a mut dyn Write,
    depth: usize,
    nesting: usize,
    line: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(globals: &'a mut Namespace, out: &'a mut dyn Write) -> Self {
        Self {
            globals,
            out,
            depth: 0,
            nesting: 0,
            line: 1,
        }
    }

    pub(crate) fn run(&mut self, program: &Program) -> Exec<()> {
        let mut scope = Scope::Module;
        match self.exec_block(&program.body, &mut scope) {
            Ok(_) => Ok(()),
            Err(Signal::Raise(mut raised)) => {
                raised.frames.push((self.line, "<module>".to_string()));
                Err(Signal::Raise(raised))
            }
            Err(exit) => Err(exit),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &mut Scope) -> Exec<Flow> {
        for stmt in body {
            if let Flow::Return(value) = self.exec_stmt(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut Scope) -> Exec<Flow> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.eval(expr, scope)?;
                if matches!(scope, Scope::Module) && !matches!(value, Value::None) {
                    self.emit(&format!("{}\n", value.repr()))?;
                }
            }
            StmtKind::Assign(targets, expr) => {
                let value = self.eval(expr, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign(target, op, expr) => {
                let current = match target {
                    Target::Name(name) => self.lookup(name, scope)?,
                    Target::Index(obj, index) => {
                        let container = self.eval(obj, scope)?;
                        let index = self.eval(index, scope)?;
                        get_item(&container, &index)?
                    }
                };
                let operand = self.eval(expr, scope)?;
                let value = binary(*op, current, operand)?;
                self.assign(target, value, scope)?;
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Pass => {}
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(expr) => {
                let exc = match expr {
                    None => Exception::new("RuntimeError", "No active exception to reraise"),
                    Some(expr) => match self.eval(expr, scope)? {
                        Value::Exception(exc) => exc,
                        Value::Class(kind) if EXCEPTION_CLASSES.contains(&kind.as_str()) => {
                            Exception {
                                kind,
                                message: None,
                            }
                        }
                        _ => Exception::new("TypeError", "exceptions must derive from BaseException"),
                    },
                };
                return Err(exc.into());
            }
            StmtKind::Def(def) => {
                let function = Value::Function(Function {
                    def: Arc::clone(def),
                });
                bind(self.globals, scope, def.name.clone(), function);
            }
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond, scope)?.is_truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                return self.exec_block(orelse, scope);
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &mut Scope) -> Exec<()> {
        match target {
            Target::Name(name) => {
                bind(self.globals, scope, name.clone(), value);
                Ok(())
            }
            Target::Index(obj, index) => self.assign_index(obj, index, value, scope),
        }
    }

    fn assign_index(&mut self, obj: &Expr, index: &Expr, value: Value, scope: &mut Scope) -> Exec<()> {
        let mut container = self.eval(obj, scope)?;
        let index = self.eval(index, scope)?;
        set_item(&mut container, &index, value)?;
        self.store_back(obj, container, scope)
    }

    /// Write a modified container back to where it was read from
    fn store_back(&mut self, expr: &Expr, value: Value, scope: &mut Scope) -> Exec<()> {
        match expr {
            Expr::Name(name) => {
                match scope {
                    Scope::Function(locals) if locals.contains_key(name) => {
                        locals.insert(name.clone(), value);
                    }
                    _ => self.globals.set(name.clone(), value),
                }
                Ok(())
            }
            Expr::Index(obj, index) => self.assign_index(obj, index, value, scope),
            _ => Ok(()),
        }
    }

    fn delete(&mut self, target: &Target, scope: &mut Scope) -> Exec<()> {
        match target {
            Target::Name(name) => {
                let removed = match scope {
                    Scope::Function(locals) => locals.remove(name),
                    Scope::Module => self.globals.remove(name),
                };
                match removed {
                    Some(_) => Ok(()),
                    None => Err(name_error(name).into()),
                }
            }
            Target::Index(obj, index) => {
                let mut container = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                del_item(&mut container, &index)?;
                self.store_back(obj, container, scope)
            }
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Exec<Value> {
        if let Scope::Function(locals) = scope {
            if let Some(value) = locals.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        if CONVERSION_CLASSES.contains(&name) || EXCEPTION_CLASSES.contains(&name) {
            return Ok(Value::Class(name.to_string()));
        }
        Err(name_error(name).into())
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope) -> Exec<Value> {
        if self.nesting >= MAX_NESTING {
            return Err(Exception::new(
                "RecursionError",
                "maximum recursion depth exceeded during evaluation",
            )
            .into());
        }
        self.nesting += 1;
        let value = self.eval_nested(expr, scope);
        self.nesting -= 1;
        value
    }

    fn eval_nested(&mut self, expr: &Expr, scope: &Scope) -> Exec<Value> {
        let value = match expr {
            Expr::Int(v) => Value::Int(*v),
            Expr::Float(v) => Value::Float(*v),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::None => Value::None,
            Expr::Name(name) => self.lookup(name, scope)?,
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Value::List(values)
            }
            Expr::Neg(operand) => negate(self.eval(operand, scope)?)?,
            Expr::Pos(operand) => {
                let value = self.eval(operand, scope)?;
                match value.as_number() {
                    Some(Number::Int(i)) => Value::Int(i),
                    Some(Number::Float(f)) => Value::Float(f),
                    None => {
                        return Err(type_error(format!(
                            "bad operand type for unary +: '{}'",
                            value.type_name()
                        ))
                        .into())
                    }
                }
            }
            Expr::Not(operand) => Value::Bool(!self.eval(operand, scope)?.is_truthy()),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, left, right)?
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, scope)?;
                for (op, expr) in rest {
                    let right = self.eval(expr, scope)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::And(left, right) => {
                let left = self.eval(left, scope)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)?
            }
            Expr::Or(left, right) => {
                let left = self.eval(left, scope)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)?
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func, scope)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, scope)?);
                }
                let mut kwarg_values = Vec::with_capacity(kwargs.len());
                for (name, arg) in kwargs {
                    kwarg_values.push((name.clone(), self.eval(arg, scope)?));
                }
                self.call(func, arg_values, kwarg_values)?
            }
            Expr::Index(obj, index) => {
                let container = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                get_item(&container, &index)?
            }
        };
        Ok(value)
    }

    fn call(&mut self, func: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Exec<Value> {
        match func {
            Value::Function(function) => self.call_function(&function, args, kwargs),
            Value::Builtin(builtin) => self.call_builtin(builtin, args, kwargs),
            Value::Class(class) => Ok(construct(&class, args, kwargs)?),
            other => Err(type_error(format!("'{}' object is not callable", other.type_name())).into()),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        let def = Arc::clone(&function.def);
        let name = &def.name;

        if args.len() > def.params.len() {
            return Err(type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                name,
                def.params.len(),
                plural(def.params.len()),
                args.len(),
                if args.len() == 1 { "was" } else { "were" }
            ))
            .into());
        }

        let mut locals: HashMap<String, Value> = def.params.iter().cloned().zip(args).collect();
        for (key, value) in kwargs {
            if !def.params.contains(&key) {
                return Err(type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                ))
                .into());
            }
            if locals.contains_key(&key) {
                return Err(type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    name, key
                ))
                .into());
            }
            locals.insert(key, value);
        }

        let missing: Vec<String> = def
            .params
            .iter()
            .filter(|p| !locals.contains_key(*p))
            .map(|p| format!("'{}'", p))
            .collect();
        if !missing.is_empty() {
            return Err(type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                name,
                missing.len(),
                plural(missing.len()),
                join_names(&missing)
            ))
            .into());
        }

        if self.depth >= MAX_DEPTH {
            return Err(Exception::new("RecursionError", "maximum recursion depth exceeded").into());
        }

        self.depth += 1;
        let caller_line = self.line;
        let result = self.exec_block(&def.body, &mut Scope::Function(locals));
        let callee_line = self.line;
        self.line = caller_line;
        self.depth -= 1;

        match result {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(Value::None),
            Err(Signal::Raise(mut raised)) => {
                raised.frames.push((callee_line, name.clone()));
                Err(Signal::Raise(raised))
            }
            Err(exit) => Err(exit),
        }
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Exec<Value> {
        if builtin != Builtin::Print && !kwargs.is_empty() {
            return Err(type_error(format!("{}() takes no keyword arguments", builtin.name())).into());
        }

        let value = match builtin {
            Builtin::Print => {
                let mut sep = " ".to_string();
                let mut end = "\n".to_string();
                for (key, value) in kwargs {
                    let text = match value {
                        Value::None => None,
                        Value::Str(s) => Some(s),
                        other => {
                            return Err(type_error(format!(
                                "{} must be None or a string, not {}",
                                key,
                                other.type_name()
                            ))
                            .into())
                        }
                    };
                    match (key.as_str(), text) {
                        ("sep", Some(text)) => sep = text,
                        ("end", Some(text)) => end = text,
                        ("sep", None) | ("end", None) => {}
                        (other, _) => {
                            return Err(type_error(format!(
                                "'{}' is an invalid keyword argument for print()",
                                other
                            ))
                            .into())
                        }
                    }
                }
                let parts: Vec<String> = args.iter().map(Value::to_str).collect();
                self.emit(&format!("{}{}", parts.join(&sep), end))?;
                Value::None
            }
            Builtin::Len => match exactly_one(builtin, args)? {
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                Value::List(items) => Value::Int(items.len() as i64),
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    ))
                    .into())
                }
            },
            Builtin::Repr => Value::Str(exactly_one(builtin, args)?.repr()),
            Builtin::Type => Value::Class(exactly_one(builtin, args)?.type_name().to_string()),
            Builtin::Abs => {
                let value = exactly_one(builtin, args)?;
                match value.as_number() {
                    Some(Number::Int(i)) => Value::Int(
                        i.checked_abs()
                            .ok_or_else(|| Exception::new("OverflowError", "integer overflow"))?,
                    ),
                    Some(Number::Float(f)) => Value::Float(f.abs()),
                    None => {
                        return Err(type_error(format!(
                            "bad operand type for abs(): '{}'",
                            value.type_name()
                        ))
                        .into())
                    }
                }
            }
            Builtin::Exit | Builtin::Quit => {
                if args.len() > 1 {
                    return Err(type_error(format!(
                        "{}() takes at most 1 argument ({} given)",
                        builtin.name(),
                        args.len()
                    ))
                    .into());
                }
                let code = match args.first() {
                    None | Some(Value::None) => 0,
                    Some(Value::Int(code)) => i32::try_from(*code).unwrap_or(1),
                    Some(Value::Bool(flag)) => i32::from(*flag),
                    Some(other) => {
                        self.emit(&format!("{}\n", other.to_str()))?;
                        1
                    }
                };
                return Err(Signal::Exit(code));
            }
        };
        Ok(value)
    }

    fn emit(&mut self, text: &str) -> Exec<()> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| Exception::new("OSError", e.to_string()))?;
        Ok(())
    }
}

fn bind(globals: &mut Namespace, scope: &mut Scope, name: String, value: Value) {
    match scope {
        Scope::Function(locals) => {
            locals.insert(name, value);
        }
        Scope::Module => globals.set(name, value),
    }
}

fn type_error(message: String) -> Exception {
    Exception::new("TypeError", message)
}

fn name_error(name: &str) -> Exception {
    Exception::new("NameError", format!("name '{}' is not defined", name))
}

fn overflow() -> Exception {
    Exception::new("OverflowError", "integer overflow")
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

fn exactly_one(builtin: Builtin, args: Vec<Value>) -> Result<Value, Exception> {
    let given = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(type_error(format!(
            "{}() takes exactly one argument ({} given)",
            builtin.name(),
            given
        ))),
    }
}

fn construct(class: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, Exception> {
    if !kwargs.is_empty() {
        return Err(type_error(format!("{}() takes no keyword arguments", class)));
    }
    if EXCEPTION_CLASSES.contains(&class) {
        let message = match args.as_slice() {
            [] => None,
            [single] => Some(single.to_str()),
            many => {
                let parts: Vec<String> = many.iter().map(Value::repr).collect();
                Some(format!("({})", parts.join(", ")))
            }
        };
        return Ok(Value::Exception(Exception {
            kind: class.to_string(),
            message,
        }));
    }
    if args.len() > 1 {
        return Err(type_error(format!(
            "{}() takes at most 1 argument ({} given)",
            class,
            args.len()
        )));
    }

    let arg = args.into_iter().next();
    match (class, arg) {
        ("int", None) => Ok(Value::Int(0)),
        ("int", Some(value)) => to_int(value),
        ("float", None) => Ok(Value::Float(0.0)),
        ("float", Some(value)) => to_float(value),
        ("str", value) => Ok(Value::Str(value.map(|v| v.to_str()).unwrap_or_default())),
        ("bool", value) => Ok(Value::Bool(value.is_some_and(|v| v.is_truthy()))),
        ("list", None) => Ok(Value::List(Vec::new())),
        ("list", Some(Value::List(items))) => Ok(Value::List(items)),
        ("list", Some(Value::Str(s))) => Ok(Value::List(
            s.chars().map(|c| Value::Str(c.to_string())).collect(),
        )),
        ("list", Some(other)) => Err(type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
        (other, _) => Err(type_error(format!("cannot create '{}' instances", other))),
    }
}

fn to_int(value: Value) -> Result<Value, Exception> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) if f.is_nan() => Err(Exception::new(
            "ValueError",
            "cannot convert float NaN to integer",
        )),
        Value::Float(f) if f.is_infinite() => Err(Exception::new(
            "OverflowError",
            "cannot convert float infinity to integer",
        )),
        Value::Float(f) => {
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(overflow());
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            Exception::new(
                "ValueError",
                format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()),
            )
        }),
        other => Err(type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Value) -> Result<Value, Exception> {
    match value.as_number() {
        Some(n) => Ok(Value::Float(n.as_f64())),
        None => match value {
            Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                Exception::new(
                    "ValueError",
                    format!("could not convert string to float: {}", Value::Str(s.clone()).repr()),
                )
            }),
            other => Err(type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn negate(value: Value) -> Result<Value, Exception> {
    match value.as_number() {
        Some(Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(type_error(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> Exception {
    let symbol = match op {
        BinOp::Pow => "** or pow()",
        other => other.symbol(),
    };
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn repeat_count(times: &Value, unit_len: usize) -> Result<usize, Exception> {
    let count = match times {
        Value::Int(n) => *n,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(type_error(format!(
                "can't multiply sequence by non-int of type '{}'",
                other.type_name()
            )))
        }
    };
    let count = usize::try_from(count).unwrap_or(0);
    match unit_len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(Exception::new("MemoryError", "")),
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, Exception> {
    match (op, &left, &right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            return Ok(Value::List(items));
        }
        (BinOp::Add, Value::Str(_), other) => {
            return Err(type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            )))
        }
        (BinOp::Add, Value::List(_), other) => {
            return Err(type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            )))
        }
        (BinOp::Mul, Value::Str(s), times) | (BinOp::Mul, times, Value::Str(s)) => {
            let count = repeat_count(times, s.len())?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinOp::Mul, Value::List(items), times) | (BinOp::Mul, times, Value::List(items)) => {
            let count = repeat_count(times, items.len())?;
            let mut repeated = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                repeated.extend(items.iter().cloned());
            }
            return Ok(Value::List(repeated));
        }
        _ => {}
    }

    match (left.as_number(), right.as_number()) {
        (Some(Number::Int(x)), Some(Number::Int(y))) => int_op(op, x, y),
        (Some(x), Some(y)) => float_op(op, x.as_f64(), y.as_f64()),
        _ => Err(unsupported(op, &left, &right)),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, Exception> {
    let zero_division = || Exception::new("ZeroDivisionError", "integer division or modulo by zero");
    let result = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(Exception::new("ZeroDivisionError", "division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division());
            }
            x.checked_div(y).map(|q| {
                if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division());
            }
            let r = x.wrapping_rem(y);
            Some(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
        BinOp::Pow => {
            if y < 0 {
                return float_op(op, x as f64, y as f64);
            }
            u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp))
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, Exception> {
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(Exception::new("ZeroDivisionError", "float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(Exception::new("ZeroDivisionError", "float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(Exception::new("ZeroDivisionError", "float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(Exception::new(
                    "ZeroDivisionError",
                    "0.0 cannot be raised to a negative power",
                ));
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(result))
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, Exception> {
    match op {
        CmpOp::Eq => return Ok(left == right),
        CmpOp::Ne => return Ok(left != right),
        _ => {}
    }

    // NaN compares false against everything
    if let (Some(x), Some(y)) = (left.as_number(), right.as_number()) {
        let ordering = match (x, y) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            _ => x.as_f64().partial_cmp(&y.as_f64()),
        };
        return Ok(ordering.is_some_and(|o| ordering_matches(op, o)));
    }

    let ordering = order(left, right).ok_or_else(|| {
        type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })?;
    Ok(ordering_matches(op, ordering))
}

fn ordering_matches(op: CmpOp, ordering: Ordering) -> bool {
    match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x != y {
                    return order(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => Some(x.cmp(&y)),
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()),
            _ => None,
        },
    }
}

fn resolve_index(container: &str, index: &Value, len: usize, action: &str) -> Result<usize, Exception> {
    let i = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(type_error(match container {
                "str" => format!("string indices must be integers, not '{}'", other.type_name()),
                _ => format!(
                    "list indices must be integers or slices, not {}",
                    other.type_name()
                ),
            }))
        }
    };
    let len = len as i64;
    let adjusted = if i < 0 { i + len } else { i };
    if adjusted < 0 || adjusted >= len {
        let what = if container == "str" { "string" } else { "list" };
        return Err(Exception::new("IndexError", format!("{} {} out of range", what, action)));
    }
    Ok(adjusted as usize)
}

fn get_item(container: &Value, index: &Value) -> Result<Value, Exception> {
    match container {
        Value::List(items) => {
            let i = resolve_index("list", index, items.len(), "index")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index("str", index, chars.len(), "index")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_item(container: &mut Value, index: &Value, value: Value) -> Result<(), Exception> {
    match container {
        Value::List(items) => {
            let i = resolve_index("list", index, items.len(), "assignment index")?;
            items[i] = value;
            Ok(())
        }
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn del_item(container: &mut Value, index: &Value) -> Result<(), Exception> {
    match container {
        Value::List(items) => {
            let i = resolve_index("list", index, items.len(), "assignment index")?;
            items.remove(i);
            Ok(())
        }
        other => Err(type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::parser::{compile, Compiled};

    fn exec(ns: &mut Namespace, source: &str) -> Exec<String> {
        let program = match compile(source) {
            Ok(Compiled::Program(program)) => program,
            _ => panic!("source did not compile: {source:?}"),
        };
        let mut out = Vec::new();
        Interpreter::new(ns, &mut out).run(&program)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn ok(ns: &mut Namespace, source: &str) -> String {
        match exec(ns, source) {
            Ok(out) => out,
            Err(signal) => panic!("{source:?} failed: {signal:?}"),
        }
    }

    fn raised(ns: &mut Namespace, source: &str) -> Raised {
        match exec(ns, source) {
            Err(Signal::Raise(raised)) => raised,
            other => panic!("{source:?} did not raise: {other:?}"),
        }
    }

    #[test]
    fn test_list_mutation_through_index() {
        let mut ns = Namespace::new();
        ok(&mut ns, "xs = [1, [2, 3]]");
        ok(&mut ns, "xs[1][0] = 20");
        ok(&mut ns, "xs[-1][1] += 10");
        assert_eq!(ok(&mut ns, "xs"), "[1, [20, 13]]\n");
        ok(&mut ns, "del xs[0]");
        assert_eq!(ok(&mut ns, "len(xs)"), "1\n");

        let r = raised(&mut ns, "xs[5]");
        assert_eq!(r.exc.to_string(), "IndexError: list index out of range");
    }

    #[test]
    fn test_function_mutates_global_list() {
        let mut ns = Namespace::new();
        ok(&mut ns, "items = [0]");
        ok(&mut ns, "def bump():\n    items[0] += 1\n    local = 5\n");
        ok(&mut ns, "bump()");
        assert_eq!(ok(&mut ns, "items"), "[1]\n");
        assert!(!ns.contains("local"));
    }

    #[test]
    fn test_argument_errors() {
        let mut ns = Namespace::new();
        ok(&mut ns, "def add(a, b):\n    return a + b\n");
        assert_eq!(ok(&mut ns, "add(1, b=2)"), "3\n");
        assert_eq!(
            raised(&mut ns, "add(1)").exc.to_string(),
            "TypeError: add() missing 1 required positional argument: 'b'"
        );
        assert_eq!(
            raised(&mut ns, "add(1, 2, 3)").exc.to_string(),
            "TypeError: add() takes 2 positional arguments but 3 were given"
        );
        assert_eq!(
            raised(&mut ns, "add(1, c=3)").exc.to_string(),
            "TypeError: add() got an unexpected keyword argument 'c'"
        );
    }

    #[test]
    fn test_recursion_limit_compresses_traceback() {
        let mut ns = Namespace::new();
        ok(&mut ns, "def down(n):\n    return down(n + 1)\n");
        let r = raised(&mut ns, "down(0)");
        let tb = r.render("<console>");
        assert!(tb.contains("  File \"<console>\", line 1, in <module>\n"));
        assert!(tb.contains("[Previous line repeated 97 more times]"));
        assert!(tb.ends_with("RecursionError: maximum recursion depth exceeded\n"));
    }

    #[test]
    fn test_expression_nesting_is_bounded_across_calls() {
        let mut ns = Namespace::new();
        let body = format!("{}climb(n + 1)", "-".repeat(40));
        ok(&mut ns, &format!("def climb(n):\n    return {}\n", body));

        let r = raised(&mut ns, "climb(0)");
        assert_eq!(
            r.exc.to_string(),
            "RecursionError: maximum recursion depth exceeded during evaluation"
        );
        assert!(r.frames.len() < MAX_DEPTH);

        // Nesting is released once evaluation unwinds
        assert_eq!(ok(&mut ns, "-(-(1))"), "1\n");
    }

    #[test]
    fn test_conversions() {
        let mut ns = Namespace::new();
        assert_eq!(ok(&mut ns, "int('  42 ') + int(2.9)"), "44\n");
        assert_eq!(ok(&mut ns, "float('1.5') * 2"), "3.0\n");
        assert_eq!(ok(&mut ns, "str(12) + '!'"), "'12!'\n");
        assert_eq!(ok(&mut ns, "list('ab')"), "['a', 'b']\n");
        assert_eq!(ok(&mut ns, "type(1.0)"), "<class 'float'>\n");
        assert_eq!(
            raised(&mut ns, "int('abc')").exc.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
    }

    #[test]
    fn test_operators() {
        let mut ns = Namespace::new();
        assert_eq!(ok(&mut ns, "1 < 2 <= 2 < 1"), "False\n");
        assert_eq!(ok(&mut ns, "0 or 'fallback'"), "'fallback'\n");
        assert_eq!(ok(&mut ns, "[] and 1"), "[]\n");
        assert_eq!(ok(&mut ns, "'ab' * 3"), "'ababab'\n");
        assert_eq!(ok(&mut ns, "2 ** -1"), "0.5\n");
        assert_eq!(ok(&mut ns, "7.5 % -2"), "-0.5\n");
        assert_eq!(
            raised(&mut ns, "'a' + 1").exc.to_string(),
            "TypeError: can only concatenate str (not \"int\") to str"
        );
        assert_eq!(
            raised(&mut ns, "9223372036854775807 + 1").exc.to_string(),
            "OverflowError: integer overflow"
        );
        assert_eq!(
            raised(&mut ns, "[1] < 'a'").exc.to_string(),
            "TypeError: '<' not supported between instances of 'list' and 'str'"
        );
    }

    #[test]
    fn test_print_keywords() {
        let mut ns = Namespace::new();
        assert_eq!(ok(&mut ns, "print(1, 2, sep='-', end='!')"), "1-2!");
        assert_eq!(
            raised(&mut ns, "print(1, flush=True)").exc.to_string(),
            "TypeError: flush must be None or a string, not bool"
        );
    }

    #[test]
    fn test_exit_from_inside_function() {
        let mut ns = Namespace::new();
        ok(&mut ns, "def leave():\n    print('bye')\n    exit(4)\n");
        assert!(matches!(exec(&mut ns, "leave()"), Err(Signal::Exit(4))));
    }

    #[test]
    fn test_del_unbound_name() {
        let mut ns = Namespace::new();
        assert_eq!(
            raised(&mut ns, "del ghost").exc.to_string(),
            "NameError: name 'ghost' is not defined"
        );
    }
}
