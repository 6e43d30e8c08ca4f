#![allow(clippy::result_large_err)]

//! Enclave run facade
//!
//! One [`Enclave`] owns the service-network model of one environment and
//! runs plans against it: interpret (or read bulk commands), validate
//! against a snapshot of the live model, then execute. A later phase only
//! starts when the earlier one produced no error. Whole runs are
//! serialised by a run lock; the model itself sits behind its own lock.

use std::sync::Arc;
use std::time::Instant;

use enclave_core::errors::{ExError, ExErrorKind};
use enclave_core::ops::ServiceNetwork;
use enclave_core::plan::Plan;
use enclave_core::{log_op_end, log_op_error, log_op_start};
use enclave_core_types::schema::FIELD_PLAN_LEN;
use enclave_core_types::RunContext;
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::bulk::read_bulk_commands;
use crate::cancel::Cancellation;
use crate::config::{EngineConfig, RunOptions};
use crate::errors::{EngineError, ExecutionError, InterpretationError, ValidationError};
use crate::executor::{Executor, InstructionOutput, RunState};
use crate::interpreter::Interpreter;
use crate::module_provider::ModuleContentProvider;
use crate::plan_description::PlanDescription;
use crate::validator::Validator;

/// Locator of the top-level script in source positions
pub const MAIN_SCRIPT_LOCATOR: &str = "main.star";

/// Locator of a bulk command document in source positions
pub const BULK_COMMANDS_LOCATOR: &str = "bulk-commands.json";

/// Outcome of one plan run
///
/// At most one of the three phases reports errors.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanExecutionResult {
    pub context: RunContext,
    pub interpretation_error: Option<InterpretationError>,
    pub validation_errors: Vec<ValidationError>,
    pub execution_error: Option<ExecutionError>,
    pub outputs: Vec<InstructionOutput>,
    pub run_state: RunState,
}

impl PlanExecutionResult {
    fn interpretation_failed(context: RunContext, err: InterpretationError) -> Self {
        Self {
            context,
            interpretation_error: Some(err),
            validation_errors: Vec::new(),
            execution_error: None,
            outputs: Vec::new(),
            run_state: RunState::NotStarted,
        }
    }

    fn validation_failed(context: RunContext, errors: Vec<ValidationError>) -> Self {
        Self {
            context,
            interpretation_error: None,
            validation_errors: errors,
            execution_error: None,
            outputs: Vec::new(),
            run_state: RunState::NotStarted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.run_state == RunState::Completed
    }

    /// The first reported error of whichever phase failed, tagged with the
    /// run's correlation ids
    pub fn error(&self) -> Option<ExError> {
        let err: ExError = if let Some(err) = &self.interpretation_error {
            err.clone().into()
        } else if let Some(err) = self.validation_errors.first() {
            err.clone().into()
        } else {
            self.execution_error.clone().map(ExError::from)?
        };
        let err = err.with_run_id(self.context.run_id.clone());
        Some(match &self.context.trace_id {
            Some(trace_id) => err.with_trace_id(trace_id.clone()),
            None => err,
        })
    }
}

pub struct Enclave {
    config: EngineConfig,
    network: ServiceNetwork,
    backend: Arc<dyn Backend>,
    modules: Arc<dyn ModuleContentProvider>,
    run_lock: Mutex<()>,
}

impl Enclave {
    /// # Errors
    ///
    /// `EngineError` if `config` does not describe a usable network.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn Backend>,
        modules: Arc<dyn ModuleContentProvider>,
    ) -> Result<Self, EngineError> {
        let settings = config.network_settings()?;
        tracing::debug!(
            subnet = %settings.subnet,
            partitioning_enabled = settings.partitioning_enabled,
            "enclave created"
        );
        Ok(Self {
            config,
            network: ServiceNetwork::new(settings),
            backend,
            modules,
            run_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The live model; read it through `snapshot()` or `with_state()`
    pub fn network(&self) -> &ServiceNetwork {
        &self.network
    }

    /// Interpret, validate and execute a script
    pub async fn run_script(
        &self,
        source: &str,
        run_args_json: &str,
        options: RunOptions,
        cancel: &Cancellation,
    ) -> PlanExecutionResult {
        let context = RunContext::new(options.trace_id.clone());
        log_op_start!(
            "run_script",
            run_id = %context.run_id,
            trace_id = context.trace_str(),
            dry_run = options.dry_run
        );
        let start = Instant::now();

        let result = match self.interpret_script(source, run_args_json, cancel) {
            Ok(plan) => self.run_plan(context, &plan, options, cancel).await,
            Err(err) => PlanExecutionResult::interpretation_failed(context, err),
        };

        log_outcome("run_script", &result, start);
        result
    }

    /// Read, validate and execute a bulk command document
    pub async fn run_bulk_commands(
        &self,
        json: &str,
        options: RunOptions,
        cancel: &Cancellation,
    ) -> PlanExecutionResult {
        let context = RunContext::new(options.trace_id.clone());
        log_op_start!(
            "run_bulk_commands",
            run_id = %context.run_id,
            trace_id = context.trace_str(),
            dry_run = options.dry_run
        );
        let start = Instant::now();

        let result = match read_bulk_commands(BULK_COMMANDS_LOCATOR, json) {
            Ok(plan) => self.run_plan(context, &plan, options, cancel).await,
            Err(err) => PlanExecutionResult::interpretation_failed(context, err),
        };

        log_outcome("run_bulk_commands", &result, start);
        result
    }

    /// Interpret a script without running it
    ///
    /// # Errors
    ///
    /// The first [`InterpretationError`] met.
    pub fn interpret_script(
        &self,
        source: &str,
        run_args_json: &str,
        cancel: &Cancellation,
    ) -> Result<Plan, InterpretationError> {
        Interpreter::new(self.modules.as_ref()).interpret(
            MAIN_SCRIPT_LOCATOR,
            source,
            run_args_json,
            cancel,
        )
    }

    /// Describe what a script would create
    ///
    /// # Errors
    ///
    /// The first [`InterpretationError`] met.
    pub fn describe_script(
        &self,
        source: &str,
        run_args_json: &str,
    ) -> Result<PlanDescription, InterpretationError> {
        log_op_start!("describe_script");
        let start = Instant::now();

        let plan = self
            .interpret_script(source, run_args_json, &Cancellation::new())
            .map_err(|e| {
                log_op_error!(
                    "describe_script",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;
        let description = PlanDescription::from_plan(&plan);

        log_op_end!(
            "describe_script",
            duration_ms = start.elapsed().as_millis() as u64,
            services = description.services.len()
        );
        Ok(description)
    }

    async fn run_plan(
        &self,
        context: RunContext,
        plan: &Plan,
        options: RunOptions,
        cancel: &Cancellation,
    ) -> PlanExecutionResult {
        let _running = self.run_lock.lock().await;

        let environment = match self.network.snapshot() {
            Ok(environment) => environment,
            Err(err) => {
                let cause = ExError::from(err);
                let mut result = PlanExecutionResult::validation_failed(context, Vec::new());
                result.execution_error = Some(
                    ExecutionError::new(1, 0, ExErrorKind::Internal, cause.message().to_string())
                        .with_cause(cause),
                );
                result.run_state = RunState::Aborted;
                return result;
            }
        };

        let validator = Validator::new(
            self.backend.as_ref(),
            self.config.image_check_parallelism(),
        );
        let validation_errors = validator.validate(plan, environment, cancel).await;
        if !validation_errors.is_empty() {
            return PlanExecutionResult::validation_failed(context, validation_errors);
        }

        let report = Executor::new(&self.network, self.backend.as_ref(), options)
            .execute(plan, cancel)
            .await;
        PlanExecutionResult {
            context,
            interpretation_error: None,
            validation_errors: Vec::new(),
            execution_error: report.error,
            outputs: report.outputs,
            run_state: report.run_state,
        }
    }
}

fn log_outcome(op: &'static str, result: &PlanExecutionResult, start: Instant) {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result.error() {
        Some(err) => {
            log_op_error!(
                op,
                err,
                duration_ms = duration_ms,
                run_id = %result.context.run_id
            );
        }
        None => {
            log_op_end!(
                op,
                duration_ms = duration_ms,
                run_id = %result.context.run_id,
                { FIELD_PLAN_LEN } = result.outputs.len()
            );
        }
    }
}
