//! Multi-language code execution and grading engine.
//!
//! [`Grader::grade`] runs untrusted source against a list of test cases and
//! returns a [`GradingReport`] with one entry per test case, in order.
//!
//! ```no_run
//! # async fn demo() -> Result<(), arbiter_engine::EngineError> {
//! use arbiter_engine::{EngineConfig, ExecutionRequest, Grader, Language, TestCase};
//!
//! let grader = Grader::new(&EngineConfig::default())?;
//! let request = ExecutionRequest::new(Language::Python, "def solution(a, b):\n    return a + b\n");
//! let report = grader.grade(&request, &[TestCase::new("[2, 3]", "5")]).await?;
//! assert_eq!(report.earned_points(), 1);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod backend;
pub mod error;
pub mod evaluator;
pub mod grader;
pub mod process;
pub mod workspace;

pub use arbiter_common::config::{EngineConfig, LanguageConfig};
pub use arbiter_common::types::{
    ExecutionRequest, ExecutionResult, GradingReport, InputFormat, Language, TestCase, TestCaseResult, TestStatus,
};
pub use backend::{BackendRegistry, ExecutionContext, LanguageBackend};
pub use error::EngineError;
pub use grader::Grader;
