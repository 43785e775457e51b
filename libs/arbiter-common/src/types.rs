use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the engine knows how to wrap and run.
///
/// A variant being listed here does not mean a backend is available:
/// only languages present in the engine configuration get one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    #[serde(alias = "js", alias = "node")]
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::JavaScript];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Language::Python),
            "javascript" | "js" | "node" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a test case's raw `input` string encodes the argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    #[default]
    Json,
    SpaceSeparated,
    LineSeparated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default = "default_points")]
    pub points: u32,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            points: default_points(),
        }
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }
}

fn default_points() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: Language,
    #[serde(default = "default_function_name")]
    pub function_name: String,
    #[serde(default)]
    pub input_format: InputFormat,
    #[serde(default = "default_time_limit")]
    pub time_limit_seconds: f64,
}

impl ExecutionRequest {
    /// Request with the default function name, json input and a 5 second limit.
    pub fn new(language: Language, source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            language,
            function_name: default_function_name(),
            input_format: InputFormat::default(),
            time_limit_seconds: default_time_limit(),
        }
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    pub fn with_input_format(mut self, format: InputFormat) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = seconds;
        self
    }
}

fn default_function_name() -> String {
    "solution".to_string()
}

fn default_time_limit() -> f64 {
    5.0
}

/// Outcome of running one wrapped program once. Output and error are
/// already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: usize,
    pub passed: bool,
    pub status: TestStatus,
    pub output: String,
    pub expected_output: String,
    pub error: String,
    pub execution_time_ms: u64,
    pub points_earned: u32,
}

/// Per-test-case results in the same order as the submitted test cases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingReport {
    pub results: Vec<TestCaseResult>,
    /// Sum of all test case points, earned or not.
    #[serde(default)]
    pub max_points: u32,
}

impl GradingReport {
    pub fn earned_points(&self) -> u32 {
        self.results.iter().map(|r| r.points_earned).sum()
    }

    pub fn max_points(&self) -> u32 {
        self.max_points
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Envelope the worker reads from disk or stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub request: ExecutionRequest,
    pub test_cases: Vec<TestCase>,
}
