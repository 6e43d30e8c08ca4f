//! Script interpreter
//!
//! Turns script source plus JSON run arguments into a [`Plan`]. Statements
//! run top to bottom; every instruction builtin appends one instruction, so
//! plan order is exactly call order. `load()` evaluates the named module
//! through the [`ModuleContentProvider`] before the loading statement
//! continues, and a module is evaluated at most once per run.
//!
//! Interpretation stops at the first error. Nothing here touches the
//! enclave: run mode (dry or real) has no influence on the resulting plan.

pub mod builtins;
pub mod lexer;
pub mod parser;
pub mod value;

use std::collections::{BTreeMap, HashMap};

use enclave_core::errors::ExErrorKind;
use enclave_core::plan::{Plan, SourcePosition};
use enclave_core_types::schema::FIELD_PLAN_LEN;

use crate::cancel::Cancellation;
use crate::errors::InterpretationError;
use crate::module_provider::ModuleContentProvider;
use crate::plan_builder::PlanBuilder;
use builtins::{Builtin, BuiltinContext, CallArgs};
use lexer::Lexer;
use parser::{Expr, ExprKind, Parser, Stmt, StmtKind};
use value::Value;

type Result<T> = std::result::Result<T, InterpretationError>;
type Globals = BTreeMap<String, Value>;

/// Global holding the run arguments in the main script
pub const ARGS_GLOBAL: &str = "args";

pub struct Interpreter<'a> {
    provider: &'a dyn ModuleContentProvider,
}

impl<'a> Interpreter<'a> {
    pub fn new(provider: &'a dyn ModuleContentProvider) -> Self {
        Self { provider }
    }

    /// Interpret a script
    ///
    /// `locator` names the script in source positions. `run_args_json` must
    /// be a JSON object; empty input and `{}` both mean "no arguments".
    ///
    /// # Errors
    ///
    /// The first [`InterpretationError`] met: syntax, evaluation, argument,
    /// module resolution, cycle, duplicate id or cancellation.
    pub fn interpret(
        &self,
        locator: &str,
        source: &str,
        run_args_json: &str,
        cancel: &Cancellation,
    ) -> Result<Plan> {
        let run_args = parse_run_args(run_args_json)?;
        let mut evaluation = Evaluation {
            provider: self.provider,
            cancel,
            emitter: PlanBuilder::new(Plan::new(locator)),
            run_args,
            modules: HashMap::new(),
            load_stack: vec![locator.to_string()],
        };
        evaluation.eval_module(locator, source, true)?;
        let plan = evaluation.emitter.into_plan();
        tracing::debug!(locator, { FIELD_PLAN_LEN } = plan.len(), "script interpreted");
        Ok(plan)
    }
}

/// Parse run arguments into a dict value
///
/// # Errors
///
/// `InvalidArguments` for malformed JSON or anything but an object.
pub fn parse_run_args(json: &str) -> Result<Value> {
    if json.trim().is_empty() {
        return Ok(Value::Dict(BTreeMap::new()));
    }
    let parsed: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        InterpretationError::new(
            ExErrorKind::InvalidArguments,
            format!("run arguments are not valid JSON: {}", e),
        )
    })?;
    if !parsed.is_object() {
        return Err(InterpretationError::new(
            ExErrorKind::InvalidArguments,
            "run arguments must be a JSON object",
        ));
    }
    Ok(Value::from_json(&parsed))
}

struct Evaluation<'a> {
    provider: &'a dyn ModuleContentProvider,
    cancel: &'a Cancellation,
    emitter: PlanBuilder,
    run_args: Value,
    /// Exported globals of every module evaluated so far
    modules: HashMap<String, Globals>,
    load_stack: Vec<String>,
}

impl<'a> Evaluation<'a> {
    fn eval_module(&mut self, locator: &str, source: &str, is_main: bool) -> Result<Globals> {
        let tokens = Lexer::new(locator, source).tokenize()?;
        let statements = Parser::new(locator, tokens).parse_program()?;

        let mut globals = Globals::new();
        if is_main {
            globals.insert(ARGS_GLOBAL.to_string(), self.run_args.clone());
        }
        for stmt in &statements {
            let position = SourcePosition::new(locator, stmt.line, stmt.column);
            if self.cancel.is_cancelled() {
                return Err(
                    InterpretationError::new(ExErrorKind::Cancelled, "interpretation cancelled")
                        .at(position),
                );
            }
            self.exec_stmt(locator, &mut globals, stmt)
                .map_err(|e| e.at(position))?;
        }
        Ok(globals)
    }

    fn exec_stmt(&mut self, locator: &str, globals: &mut Globals, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let value = self.eval(locator, globals, value)?;
                globals.insert(target.clone(), value);
            }
            StmtKind::Expr(expr) => {
                self.eval(locator, globals, expr)?;
            }
            StmtKind::Load {
                locator: module,
                symbols,
            } => {
                let exports = self.load_module(module)?;
                for (alias, symbol) in symbols {
                    let value = exports
                        .get(symbol)
                        .filter(|_| !symbol.starts_with('_'))
                        .ok_or_else(|| {
                            InterpretationError::new(
                                ExErrorKind::SymbolNotFound,
                                format!("module '{}' has no exported symbol '{}'", module, symbol),
                            )
                        })?;
                    globals.insert(alias.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    fn load_module(&mut self, module: &str) -> Result<Globals> {
        if let Some(exports) = self.modules.get(module) {
            return Ok(exports.clone());
        }
        if self.load_stack.iter().any(|m| m == module) {
            let mut chain = self.load_stack.clone();
            chain.push(module.to_string());
            return Err(InterpretationError::new(
                ExErrorKind::CycleDetected,
                format!("cyclic load: {}", chain.join(" -> ")),
            ));
        }

        let bytes = self.provider.resolve(module)?;
        let source = String::from_utf8(bytes).map_err(|_| {
            InterpretationError::new(
                ExErrorKind::InvalidInput,
                format!("module '{}' is not valid UTF-8", module),
            )
        })?;

        tracing::debug!(module, "evaluating module");
        self.load_stack.push(module.to_string());
        let result = self.eval_module(module, &source, false);
        self.load_stack.pop();
        let exports = result?;
        self.modules.insert(module.to_string(), exports.clone());
        Ok(exports)
    }

    fn eval(&mut self, locator: &str, globals: &Globals, expr: &Expr) -> Result<Value> {
        let position = SourcePosition::new(locator, expr.line, expr.column);
        self.eval_kind(locator, globals, expr, &position)
            .map_err(|e| e.at(position))
    }

    fn eval_kind(
        &mut self,
        locator: &str,
        globals: &Globals,
        expr: &Expr,
        position: &SourcePosition,
    ) -> Result<Value> {
        let value = match &expr.kind {
            ExprKind::None => Value::None,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Int(i) => Value::Int(*i),
            ExprKind::Float(f) => Value::Float(*f),
            ExprKind::Str(s) => Value::String(s.clone()),
            ExprKind::Name(name) => globals
                .get(name)
                .cloned()
                .or_else(|| Builtin::lookup(name).map(Value::Builtin))
                .ok_or_else(|| {
                    InterpretationError::new(
                        ExErrorKind::UndefinedName,
                        format!("name '{}' is not defined", name),
                    )
                })?,
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(locator, globals, item)?);
                }
                Value::List(values)
            }
            ExprKind::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(locator, globals, key)? {
                        Value::String(s) => s,
                        other => {
                            return Err(InterpretationError::new(
                                ExErrorKind::TypeMismatch,
                                format!("dict keys must be strings, not {}", other.type_name()),
                            ))
                        }
                    };
                    let value = self.eval(locator, globals, value)?;
                    if map.insert(key.clone(), value).is_some() {
                        return Err(InterpretationError::new(
                            ExErrorKind::InvalidArguments,
                            format!("duplicate key '{}' in dict literal", key),
                        ));
                    }
                }
                Value::Dict(map)
            }
            ExprKind::Call { callee, args } => {
                let callee = self.eval(locator, globals, callee)?;
                let mut call_args = CallArgs::default();
                for arg in args {
                    let value = self.eval(locator, globals, &arg.value)?;
                    match &arg.name {
                        Some(name) => call_args.named.push((name.clone(), value)),
                        None => call_args.positional.push(value),
                    }
                }
                let Value::Builtin(builtin) = callee else {
                    return Err(InterpretationError::new(
                        ExErrorKind::TypeMismatch,
                        format!("'{}' object is not callable", callee.type_name()),
                    ));
                };
                let mut ctx = BuiltinContext {
                    emitter: &mut self.emitter,
                    run_args: &self.run_args,
                    position: position.clone(),
                };
                builtins::call(builtin, call_args, &mut ctx)?
            }
            ExprKind::Attr { object, name } => {
                let object = self.eval(locator, globals, object)?;
                object.attr(name).ok_or_else(|| {
                    InterpretationError::new(
                        ExErrorKind::UndefinedName,
                        format!("'{}' has no attribute '{}'", object.type_name(), name),
                    )
                })?
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(locator, globals, object)?;
                let index = self.eval(locator, globals, index)?;
                index_value(object, index)?
            }
            ExprKind::Add(left, right) => {
                let left = self.eval(locator, globals, left)?;
                let right = self.eval(locator, globals, right)?;
                add_values(left, right)?
            }
            ExprKind::Neg(operand) => match self.eval(locator, globals, operand)? {
                Value::Int(i) => Value::Int(i.checked_neg().ok_or_else(overflow)?),
                Value::Float(f) => Value::Float(-f),
                other => {
                    return Err(InterpretationError::new(
                        ExErrorKind::TypeMismatch,
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                    ))
                }
            },
        };
        Ok(value)
    }
}

fn add_values(left: Value, right: Value) -> Result<Value> {
    let sum = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        (Value::Int(a), Value::Float(b)) => Value::Float(a as f64 + b),
        (Value::Float(a), Value::Int(b)) => Value::Float(a + b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Value::String(a), Value::String(b)) => Value::String(a + &b),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Value::List(a)
        }
        (a, b) => {
            return Err(InterpretationError::new(
                ExErrorKind::TypeMismatch,
                format!(
                    "unsupported operand type(s) for +: '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ),
            ))
        }
    };
    Ok(sum)
}

fn index_value(object: Value, index: Value) -> Result<Value> {
    match (object, index) {
        (Value::List(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let resolved = if i < 0 { i + len } else { i };
            usize::try_from(resolved)
                .ok()
                .and_then(|idx| items.into_iter().nth(idx))
                .ok_or_else(|| {
                    InterpretationError::new(
                        ExErrorKind::InvalidArguments,
                        format!("index {} out of range for list of length {}", i, len),
                    )
                })
        }
        (Value::Dict(mut entries), Value::String(key)) => {
            entries.remove(&key).ok_or_else(|| {
                InterpretationError::new(
                    ExErrorKind::InvalidArguments,
                    format!("key '{}' not found in dict", key),
                )
            })
        }
        (object, index) => Err(InterpretationError::new(
            ExErrorKind::TypeMismatch,
            format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ),
        )),
    }
}

fn overflow() -> InterpretationError {
    InterpretationError::new(ExErrorKind::InvalidArguments, "integer overflow")
}
