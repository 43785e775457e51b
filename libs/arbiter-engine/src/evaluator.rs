//! Test Evaluator - Language-Agnostic Scoring Logic
//!
//! **Core Responsibility:**
//! Compare one execution's output against the expected output and assign
//! points.
//!
//! **Critical Properties:**
//! - Knows nothing about interpreters or processes
//! - Pure function: (execution result, test case) → test case result
//!
//! **Normalization Rules (Applied to All Languages):**
//! - CRLF and lone CR become LF
//! - Leading and trailing whitespace trimmed
//! - Internal whitespace and case preserved

use arbiter_common::types::{ExecutionResult, TestCase, TestCaseResult, TestStatus};

/// Normalize output string for comparison. Idempotent.
pub fn normalize_output(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Evaluate a single test case execution
///
/// Status priority: timeout, then runtime error, then output comparison.
/// A test passes only when the normalized outputs match and no error was
/// reported.
pub fn evaluate_test(index: usize, test_case: &TestCase, result: &ExecutionResult) -> TestCaseResult {
    let output = normalize_output(&result.output);
    let expected_output = normalize_output(&test_case.expected_output);
    let error = normalize_output(&result.error);

    let status = if result.timed_out {
        TestStatus::TimeLimitExceeded
    } else if !error.is_empty() {
        TestStatus::RuntimeError
    } else if output == expected_output {
        TestStatus::Passed
    } else {
        TestStatus::WrongAnswer
    };

    let passed = status == TestStatus::Passed;

    TestCaseResult {
        index,
        passed,
        status,
        output,
        expected_output,
        error,
        execution_time_ms: result.execution_time_ms,
        points_earned: if passed { test_case.points } else { 0 },
    }
}

/// Result for a test case whose execution could not produce an
/// `ExecutionResult` at all.
pub fn failed_test(index: usize, test_case: &TestCase, message: &str) -> TestCaseResult {
    TestCaseResult {
        index,
        passed: false,
        status: TestStatus::RuntimeError,
        output: String::new(),
        expected_output: normalize_output(&test_case.expected_output),
        error: normalize_output(message),
        execution_time_ms: 0,
        points_earned: 0,
    }
}
