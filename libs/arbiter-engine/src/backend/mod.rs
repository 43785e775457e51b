//! Language Backends
//!
//! **Core Responsibility:**
//! Wrap untrusted source with a generated harness that calls the target
//! function, run it under a deadline and report raw output.
//!
//! **Critical Architectural Boundary:**
//! - A backend knows HOW to run one language
//! - A backend does NOT know scoring rules
//! - A backend does NOT compare outputs
//!
//! Adding a language means implementing `wrap` for it and registering it;
//! the grader never changes.

pub mod javascript;
pub mod python;

pub use javascript::JavaScriptBackend;
pub use python::PythonBackend;

use crate::evaluator::normalize_output;
use crate::process::{self, ProcessOutput, ProcessSpec};
use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use arbiter_common::config::{EngineConfig, LanguageConfig};
use arbiter_common::types::{ExecutionResult, Language};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Shared state every backend invocation runs against.
///
/// The workspace is namespaced per invocation through unique file names;
/// the semaphore bounds how many interpreter processes exist at once.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workspace: Arc<Workspace>,
    pub process_slots: Arc<Semaphore>,
    pub path_env: String,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
}

impl ExecutionContext {
    pub fn new(workspace: Arc<Workspace>, config: &EngineConfig) -> Self {
        Self {
            workspace,
            process_slots: Arc::new(Semaphore::new(config.max_concurrent_processes.max(1))),
            path_env: config.path.clone(),
            max_source_bytes: config.max_source_bytes,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

pub fn timeout_message(time_limit_seconds: f64) -> String {
    format!("Execution timeout: Code exceeded {} seconds", time_limit_seconds)
}

#[async_trait]
pub trait LanguageBackend: Send + Sync {
    fn language(&self) -> Language;

    /// Interpreter settings injected from configuration.
    fn config(&self) -> &LanguageConfig;

    /// Produce the full program: the submitted source followed by a
    /// generated epilogue that calls `function_name` with `args` and prints
    /// the result.
    fn wrap(&self, source_code: &str, args: &[Value], function_name: &str) -> Result<String>;

    /// Run one test case's arguments through the submitted code.
    ///
    /// Timeouts and runtime errors come back as `Ok` with `error` set.
    /// `Err` means the run could not happen at all (oversized source,
    /// workspace write failure, interpreter could not be spawned).
    async fn run(
        &self,
        ctx: &ExecutionContext,
        source_code: &str,
        args: &[Value],
        function_name: &str,
        time_limit_seconds: f64,
    ) -> Result<ExecutionResult> {
        if source_code.len() > ctx.max_source_bytes {
            bail!("Source code exceeds maximum size of {} bytes", ctx.max_source_bytes);
        }
        validate_function_name(function_name)?;
        let time_limit = Duration::try_from_secs_f64(time_limit_seconds)
            .with_context(|| format!("Invalid time limit: {}", time_limit_seconds))?;

        let program = self.wrap(source_code, args, function_name)?;

        let _slot = ctx
            .process_slots
            .acquire()
            .await
            .context("Process admission semaphore closed")?;

        // Removed with everything the run wrote into it, whatever happens below
        let run_dir = ctx
            .workspace
            .allocate(self.language().as_str(), &self.config().file_extension, &program)
            .await?;

        let config = self.config();
        let mut argv = config.args.clone();
        argv.push(run_dir.program().to_string_lossy().into_owned());

        let spec = ProcessSpec {
            program: &config.command,
            args: argv,
            cwd: run_dir.dir(),
            path_env: &ctx.path_env,
            env: &config.env,
        };

        let output = process::run_program(&spec, time_limit, ctx.max_output_bytes).await?;
        drop(run_dir);

        Ok(self.classify(output, time_limit_seconds))
    }

    /// Turn a finished process into an `ExecutionResult`.
    ///
    /// The exit status is authoritative: a clean exit is a success even
    /// when the interpreter wrote warnings to stderr.
    fn classify(&self, output: ProcessOutput, time_limit_seconds: f64) -> ExecutionResult {
        let execution_time_ms = output.elapsed.as_millis() as u64;

        if output.timed_out {
            return ExecutionResult {
                output: String::new(),
                error: timeout_message(time_limit_seconds),
                execution_time_ms,
                timed_out: true,
            };
        }

        let error = if output.success() {
            if !output.stderr.trim().is_empty() {
                debug!(
                    language = %self.language(),
                    stderr = %output.stderr.lines().next().unwrap_or(""),
                    "Ignoring stderr from successful run"
                );
            }
            String::new()
        } else {
            let stderr = normalize_output(&output.stderr);
            let reason = output.failure_message().unwrap_or_default();
            match (stderr.is_empty(), reason.starts_with('[')) {
                (true, _) => reason,
                // signal deaths get annotated like the exit-code cases
                (false, true) => format!("{}\n{}", stderr, reason),
                (false, false) => stderr,
            }
        };

        ExecutionResult {
            output: normalize_output(&output.stdout),
            error: normalize_output(&error),
            execution_time_ms,
            timed_out: false,
        }
    }

    /// Check that the interpreter can be launched; returns its version line.
    async fn verify_runtime(&self, ctx: &ExecutionContext) -> Result<String> {
        let config = self.config();
        let spec = ProcessSpec {
            program: &config.command,
            args: vec!["--version".to_string()],
            cwd: ctx.workspace.root(),
            path_env: &ctx.path_env,
            env: &config.env,
        };

        let output = process::run_program(&spec, Duration::from_secs(10), 4096)
            .await
            .with_context(|| format!("{} runtime '{}' is not available", self.language(), config.command))?;

        if !output.success() {
            bail!(
                "{} runtime '{}' failed its version check: {}",
                self.language(),
                config.command,
                output.failure_message().unwrap_or_else(|| "timed out".to_string())
            );
        }

        // python2 reported its version on stderr; keep whichever is set
        let version = if output.stdout.trim().is_empty() { &output.stderr } else { &output.stdout };
        Ok(version.trim().to_string())
    }
}

/// Function names are spliced into generated code, so only plain
/// identifiers are accepted.
pub fn validate_function_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !valid_start || !valid_rest {
        bail!("Invalid function name: {:?}", name);
    }
    Ok(())
}

/// Registry of backends by language. Only configured languages are present.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<Language, Arc<dyn LanguageBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for (language, lang_config) in config.language_map() {
            let backend: Arc<dyn LanguageBackend> = match language {
                Language::Python => Arc::new(PythonBackend::new(lang_config.clone())),
                Language::JavaScript => Arc::new(JavaScriptBackend::new(lang_config.clone())),
            };
            registry.register(backend);
        }
        registry
    }

    /// Register a backend, replacing any previous one for the same language.
    pub fn register(&mut self, backend: Arc<dyn LanguageBackend>) {
        let language = backend.language();
        if self.backends.insert(language, backend).is_some() {
            warn!(language = %language, "Replaced existing backend");
        }
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn LanguageBackend>> {
        self.backends.get(&language).cloned()
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.backends.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_function_name() {
        assert!(validate_function_name("solution").is_ok());
        assert!(validate_function_name("_helper2").is_ok());
        assert!(validate_function_name("$fn").is_ok());
        assert!(validate_function_name("").is_err());
        assert!(validate_function_name("2fast").is_err());
        assert!(validate_function_name("f(); import os").is_err());
        assert!(validate_function_name("a.b").is_err());
    }

    #[test]
    fn test_timeout_message_format() {
        assert_eq!(timeout_message(5.0), "Execution timeout: Code exceeded 5 seconds");
        assert_eq!(timeout_message(1.5), "Execution timeout: Code exceeded 1.5 seconds");
    }

    #[test]
    fn test_registry_from_config() {
        let registry = BackendRegistry::from_config(&EngineConfig::default());
        assert_eq!(registry.languages(), vec![Language::JavaScript, Language::Python]);
        assert!(registry.get(Language::Python).is_some());
    }

    #[test]
    fn test_registry_only_has_configured_languages() {
        let mut config = EngineConfig::default();
        config.languages.retain(|l| l.name == "python");

        let registry = BackendRegistry::from_config(&config);
        assert!(registry.get(Language::JavaScript).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_outcomes() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        let backend = PythonBackend::new(EngineConfig::default().languages[0].clone());
        let base = ProcessOutput {
            stdout: "5\r\n".to_string(),
            stderr: String::new(),
            status: Some(ExitStatus::from_raw(0)),
            timed_out: false,
            elapsed: Duration::from_millis(12),
        };

        let ok = backend.classify(base.clone(), 5.0);
        assert_eq!(ok.output, "5");
        assert!(ok.error.is_empty());
        assert_eq!(ok.execution_time_ms, 12);

        let warned = backend.classify(
            ProcessOutput {
                stderr: "DeprecationWarning: old api\n".to_string(),
                ..base.clone()
            },
            5.0,
        );
        assert!(warned.error.is_empty());

        // exit code 1 is encoded as 256 in a raw wait status
        let crashed = backend.classify(
            ProcessOutput {
                stderr: "Traceback (most recent call last):\nZeroDivisionError\n".to_string(),
                status: Some(ExitStatus::from_raw(1 << 8)),
                ..base.clone()
            },
            5.0,
        );
        assert!(crashed.error.starts_with("Traceback"));

        let silent = backend.classify(
            ProcessOutput {
                status: Some(ExitStatus::from_raw(2 << 8)),
                ..base.clone()
            },
            5.0,
        );
        assert_eq!(silent.error, "Process exited with status 2");

        let segv = backend.classify(
            ProcessOutput {
                status: Some(ExitStatus::from_raw(11)),
                ..base.clone()
            },
            5.0,
        );
        assert_eq!(segv.error, "[Process killed: segmentation fault]");

        let timed_out = backend.classify(
            ProcessOutput {
                stdout: String::new(),
                status: None,
                timed_out: true,
                ..base
            },
            1.0,
        );
        assert!(timed_out.timed_out);
        assert_eq!(timed_out.error, "Execution timeout: Code exceeded 1 seconds");
    }
}
