// Job input: one ExecutionRequest plus its test cases, as JSON
use anyhow::{bail, Context, Result};
use arbiter_common::types::Job;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read a job from `path`, or from stdin when `path` is `-` or absent.
pub async fn read_job(path: Option<&Path>) -> Result<Job> {
    let content = match path {
        Some(p) if p != Path::new("-") => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("Failed to read job file {}", p.display()))?,
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read job from stdin")?;
            buf
        }
    };

    parse_job(&content)
}

pub fn parse_job(content: &str) -> Result<Job> {
    if content.trim().is_empty() {
        bail!("Job input is empty");
    }
    serde_json::from_str(content).context("Failed to parse job JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::types::{InputFormat, Language};

    #[test]
    fn test_parse_job_with_defaults() {
        let job = parse_job(
            r#"{
                "request": {"source_code": "def solution(a, b): return a + b", "language": "python"},
                "test_cases": [
                    {"input": "[2, 3]", "expected_output": "5"},
                    {"input": "[1, 1]", "expected_output": "2", "points": 3}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(job.request.language, Language::Python);
        assert_eq!(job.request.input_format, InputFormat::Json);
        assert_eq!(job.test_cases.len(), 2);
        assert_eq!(job.test_cases[0].points, 1);
        assert_eq!(job.test_cases[1].points, 3);
    }

    #[test]
    fn test_parse_job_rejects_garbage() {
        assert!(parse_job("").is_err());
        assert!(parse_job("{\"request\": 1}").is_err());
    }

    #[test]
    fn test_unknown_language_is_parse_error() {
        let err = parse_job(
            r#"{"request": {"source_code": "", "language": "cobol"}, "test_cases": []}"#,
        );
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_read_job_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{"request": {"source_code": "", "language": "javascript", "time_limit_seconds": 2},
                "test_cases": []}"#,
        )
        .unwrap();

        let job = read_job(Some(&path)).await.unwrap();
        assert_eq!(job.request.language, Language::JavaScript);
        assert_eq!(job.request.time_limit_seconds, 2.0);
    }
}
