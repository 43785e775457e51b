//! Grader - High-Level Orchestration
//!
//! **Responsibility:**
//! Run a submission against every test case and collect one result per
//! test case, in test case order.
//!
//! **Architecture:**
//! 1. Argument Parser turns each raw input into arguments (args.rs)
//! 2. The language's backend wraps and runs the code (backend/)
//! 3. Evaluator normalizes and scores the output (evaluator.rs)
//!
//! Only an unsupported language or a malformed request fails the whole
//! call. Every per-test failure, including a backend error or panic,
//! becomes a failing result for that test case alone.

use crate::args::parse_arguments;
use crate::backend::{BackendRegistry, ExecutionContext, LanguageBackend};
use crate::error::EngineError;
use crate::evaluator::{evaluate_test, failed_test};
use crate::workspace::Workspace;
use arbiter_common::config::EngineConfig;
use arbiter_common::types::{ExecutionRequest, GradingReport, Language, TestCase, TestCaseResult, TestStatus};
use futures_util::{stream, FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct Grader {
    registry: BackendRegistry,
    ctx: ExecutionContext,
    max_parallel_tests: usize,
}

impl Grader {
    /// Build a grader with one backend per configured language.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Self::with_registry(config, BackendRegistry::from_config(config))
    }

    pub fn with_registry(config: &EngineConfig, registry: BackendRegistry) -> Result<Self, EngineError> {
        let workspace = Workspace::create(&config.workspace_root).map_err(|source| EngineError::Workspace {
            path: config.workspace_root.clone(),
            source,
        })?;

        info!(
            workspace = %workspace.root().display(),
            languages = ?registry.languages(),
            max_concurrent_processes = config.max_concurrent_processes,
            max_parallel_tests = config.max_parallel_tests,
            "Grader ready"
        );

        Ok(Self {
            registry,
            ctx: ExecutionContext::new(Arc::new(workspace), config),
            max_parallel_tests: config.max_parallel_tests.max(1),
        })
    }

    pub fn languages(&self) -> Vec<Language> {
        self.registry.languages()
    }

    /// Launch every registered interpreter once. Missing runtimes are a
    /// deployment problem and should stop the process before it takes work.
    pub async fn verify_runtimes(&self) -> anyhow::Result<Vec<(Language, String)>> {
        let mut versions = Vec::new();
        for language in self.registry.languages() {
            if let Some(backend) = self.registry.get(language) {
                let version = backend.verify_runtime(&self.ctx).await?;
                info!(language = %language, version = %version, "Runtime available");
                versions.push((language, version));
            }
        }
        Ok(versions)
    }

    /// Grade a submission.
    ///
    /// The report always has exactly one entry per test case, in input
    /// order, even when test cases run concurrently.
    #[instrument(skip_all, fields(language = %request.language, test_cases = test_cases.len()))]
    pub async fn grade(&self, request: &ExecutionRequest, test_cases: &[TestCase]) -> Result<GradingReport, EngineError> {
        let backend = self
            .registry
            .get(request.language)
            .ok_or(EngineError::UnsupportedLanguage(request.language))?;
        let backend: &dyn LanguageBackend = backend.as_ref();

        if !(request.time_limit_seconds.is_finite() && request.time_limit_seconds > 0.0) {
            return Err(EngineError::InvalidRequest(format!(
                "time_limit_seconds must be a positive number, got {}",
                request.time_limit_seconds
            )));
        }

        debug!(
            function_name = %request.function_name,
            input_format = ?request.input_format,
            time_limit_seconds = request.time_limit_seconds,
            source_size = request.source_code.len(),
            "Grading submission"
        );

        // buffered() yields in input order regardless of completion order
        let cases: Vec<_> = test_cases
            .iter()
            .enumerate()
            .map(|(index, test_case)| self.grade_case(backend, request, index, test_case))
            .collect();
        let results: Vec<TestCaseResult> = stream::iter(cases)
            .buffered(self.max_parallel_tests)
            .collect()
            .await;

        let report = GradingReport {
            results,
            max_points: test_cases.iter().map(|tc| tc.points).sum(),
        };

        info!(
            passed = report.passed_count(),
            total = report.len(),
            earned_points = report.earned_points(),
            max_points = report.max_points(),
            "Grading complete"
        );

        Ok(report)
    }

    async fn grade_case(
        &self,
        backend: &dyn LanguageBackend,
        request: &ExecutionRequest,
        index: usize,
        test_case: &TestCase,
    ) -> TestCaseResult {
        let args = parse_arguments(&test_case.input, request.input_format);

        let run = backend.run(
            &self.ctx,
            &request.source_code,
            &args,
            &request.function_name,
            request.time_limit_seconds,
        );

        let result = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(execution)) => evaluate_test(index, test_case, &execution),
            Ok(Err(e)) => {
                error!(test_index = index, error = %e, "Test case could not be executed");
                failed_test(index, test_case, &format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(test_index = index, panic = %message, "Backend panicked");
                failed_test(index, test_case, &format!("Internal error: {}", message))
            }
        };

        match result.status {
            TestStatus::TimeLimitExceeded => warn!(
                test_index = index,
                execution_time_ms = result.execution_time_ms,
                "Execution timed out; test cannot pass"
            ),
            TestStatus::RuntimeError => warn!(
                test_index = index,
                execution_time_ms = result.execution_time_ms,
                error = %result.error.lines().next().unwrap_or(""),
                "Execution failed with runtime error; test cannot pass"
            ),
            TestStatus::WrongAnswer => debug!(
                test_index = index,
                expected = %result.expected_output,
                actual = %result.output,
                "Output mismatch"
            ),
            TestStatus::Passed => debug!(
                test_index = index,
                execution_time_ms = result.execution_time_ms,
                "Output matched"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use arbiter_common::config::LanguageConfig;
    use arbiter_common::types::ExecutionResult;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    /// Backend that never spawns anything: echoes the first argument back,
    /// or fails in the way the argument asks it to.
    struct ScriptedBackend {
        config: LanguageConfig,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                config: EngineConfig::default().languages[0].clone(),
            }
        }
    }

    #[async_trait]
    impl LanguageBackend for ScriptedBackend {
        fn language(&self) -> Language {
            Language::Python
        }

        fn config(&self) -> &LanguageConfig {
            &self.config
        }

        fn wrap(&self, source_code: &str, _args: &[Value], _function_name: &str) -> Result<String> {
            Ok(source_code.to_string())
        }

        async fn run(
            &self,
            _ctx: &ExecutionContext,
            _source_code: &str,
            args: &[Value],
            _function_name: &str,
            time_limit_seconds: f64,
        ) -> Result<ExecutionResult> {
            let first = args.first().cloned().unwrap_or(Value::Null);
            match first.as_str() {
                Some("raise") => Err(anyhow!("disk full")),
                Some("panic") => panic!("backend exploded"),
                Some("crash") => Ok(ExecutionResult {
                    output: String::new(),
                    error: "Traceback: ValueError".to_string(),
                    execution_time_ms: 3,
                    timed_out: false,
                }),
                Some("hang") => Ok(ExecutionResult {
                    output: String::new(),
                    error: crate::backend::timeout_message(time_limit_seconds),
                    execution_time_ms: 1000,
                    timed_out: true,
                }),
                _ => {
                    // finish out of order to exercise result ordering
                    if let Some(ms) = first.as_u64() {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                    Ok(ExecutionResult {
                        output: format!("{}\r\n", first),
                        error: String::new(),
                        execution_time_ms: 1,
                        timed_out: false,
                    })
                }
            }
        }
    }

    fn grader(max_parallel_tests: usize) -> (Grader, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            workspace_root: dir.path().to_path_buf(),
            max_parallel_tests,
            ..EngineConfig::default()
        };
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(ScriptedBackend::new()));
        (Grader::with_registry(&config, registry).unwrap(), dir)
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest::new(Language::Python, "def solution(x): return x")
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_whole_call() {
        let (grader, _dir) = grader(1);
        let request = ExecutionRequest::new(Language::JavaScript, "");

        let err = grader.grade(&request, &[TestCase::new("[1]", "1")]).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage(Language::JavaScript)));
    }

    #[tokio::test]
    async fn test_invalid_time_limit_rejected() {
        let (grader, _dir) = grader(1);
        for limit in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = grader
                .grade(&request().with_time_limit(limit), &[TestCase::new("[1]", "1")])
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_partial_credit() {
        let (grader, _dir) = grader(1);
        let cases = vec![
            TestCase::new("[1]", "1").with_points(1),
            TestCase::new("[2]", "999").with_points(2),
            TestCase::new("[3]", "3").with_points(3),
        ];

        let report = grader.grade(&request(), &cases).await.unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.earned_points(), 4);
        assert_eq!(report.max_points(), 6);
        assert_eq!(report.results[1].status, TestStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (grader, _dir) = grader(1);
        let cases = vec![
            TestCase::new("[\"ok\"]", "\"ok\""),
            TestCase::new("[\"raise\"]", ""),
            TestCase::new("[\"panic\"]", ""),
            TestCase::new("[\"crash\"]", ""),
            TestCase::new("[\"hang\"]", ""),
            TestCase::new("[7]", "7"),
        ];

        let report = grader.grade(&request().with_time_limit(1.0), &cases).await.unwrap();

        assert_eq!(report.len(), 6);
        assert!(report.results[0].passed);

        assert!(!report.results[1].passed);
        assert!(report.results[1].output.is_empty());
        assert_eq!(report.results[1].error, "disk full");

        assert!(!report.results[2].passed);
        assert!(report.results[2].error.contains("backend exploded"));

        assert_eq!(report.results[3].status, TestStatus::RuntimeError);

        assert_eq!(report.results[4].status, TestStatus::TimeLimitExceeded);
        assert!(report.results[4].error.contains("timeout"));

        assert!(report.results[5].passed);
        assert_eq!(report.earned_points(), 2);
    }

    #[tokio::test]
    async fn test_parallel_results_keep_input_order() {
        let (grader, _dir) = grader(4);
        let cases: Vec<TestCase> = [120u64, 10, 80, 0, 40]
            .iter()
            .map(|ms| TestCase::new(format!("[{}]", ms), ms.to_string()))
            .collect();

        let report = grader.grade(&request(), &cases).await.unwrap();

        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        let outputs: Vec<&str> = report.results.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["120", "10", "80", "0", "40"]);
        assert_eq!(report.passed_count(), 5);
    }

    #[tokio::test]
    async fn test_empty_test_cases() {
        let (grader, _dir) = grader(1);
        let report = grader.grade(&request(), &[]).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.max_points(), 0);
    }
}
