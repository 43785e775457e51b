//! Argument Parser
//!
//! Turns a test case's raw `input` string into the ordered argument list
//! handed to the candidate function.
//!
//! **Formats:**
//! - `json`: an array is the full argument list, any other value is the
//!   sole argument. Invalid JSON falls back to whitespace tokens.
//! - `space_separated`: tokens split on runs of whitespace.
//! - `line_separated`: one argument per line.
//!
//! Tokens and lines that look like numbers become numbers. Parsing never
//! fails: malformed input still produces an argument list so the candidate
//! function gets a chance to run against it.

use crate::error::ParseDegradation;
use arbiter_common::types::InputFormat;
use serde_json::{Number, Value};
use tracing::debug;

pub fn parse_arguments(raw: &str, format: InputFormat) -> Vec<Value> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    match format {
        InputFormat::Json => match parse_json(raw) {
            Ok(args) => args,
            Err(degradation) => {
                debug!(%degradation, "Argument input degraded to space_separated");
                split_whitespace(raw)
            }
        },
        InputFormat::SpaceSeparated => split_whitespace(raw),
        InputFormat::LineSeparated => split_lines(raw),
    }
}

fn parse_json(raw: &str) -> Result<Vec<Value>, ParseDegradation> {
    let value: Value = serde_json::from_str(raw.trim())?;
    Ok(match value {
        Value::Array(items) => items,
        single => vec![single],
    })
}

fn split_whitespace(raw: &str) -> Vec<Value> {
    raw.split_whitespace().map(coerce_token).collect()
}

fn split_lines(raw: &str) -> Vec<Value> {
    raw.trim().lines().map(coerce_token).collect()
}

/// Numbers stay numbers, everything else is passed through as a string.
fn coerce_token(token: &str) -> Value {
    let trimmed = token.trim();

    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(uint) = trimmed.parse::<u64>() {
        return Value::from(uint);
    }
    // inf and NaN have no JSON form and stay strings
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }

    Value::String(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_array_is_argument_list() {
        let args = parse_arguments("[2, 3]", InputFormat::Json);
        assert_eq!(args, vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_json_scalar_is_single_argument() {
        assert_eq!(parse_arguments("42", InputFormat::Json), vec![json!(42)]);
        assert_eq!(parse_arguments("\"abc\"", InputFormat::Json), vec![json!("abc")]);
        assert_eq!(
            parse_arguments(r#"{"k": [1, 2]}"#, InputFormat::Json),
            vec![json!({"k": [1, 2]})]
        );
    }

    #[test]
    fn test_json_nested_values_preserved() {
        let args = parse_arguments(r#"[[1, 2], "x", true, null]"#, InputFormat::Json);
        assert_eq!(args, vec![json!([1, 2]), json!("x"), json!(true), Value::Null]);
    }

    #[test]
    fn test_invalid_json_falls_back_to_whitespace() {
        let args = parse_arguments("hello 5 2.5", InputFormat::Json);
        assert_eq!(args, vec![json!("hello"), json!(5), json!(2.5)]);
    }

    #[test]
    fn test_space_separated() {
        let args = parse_arguments("  1   two\t3.0 \n -4 ", InputFormat::SpaceSeparated);
        assert_eq!(args, vec![json!(1), json!("two"), json!(3.0), json!(-4)]);
    }

    #[test]
    fn test_line_separated_keeps_spaces_inside_lines() {
        let args = parse_arguments("hello world\r\n7\nfoo bar\n", InputFormat::LineSeparated);
        assert_eq!(args, vec![json!("hello world"), json!(7), json!("foo bar")]);
    }

    #[test]
    fn test_empty_input_yields_no_arguments() {
        for format in [
            InputFormat::Json,
            InputFormat::SpaceSeparated,
            InputFormat::LineSeparated,
        ] {
            assert!(parse_arguments("", format).is_empty());
            assert!(parse_arguments("  \n\t ", format).is_empty());
        }
    }

    #[test]
    fn test_non_finite_tokens_stay_strings() {
        let args = parse_arguments("inf NaN", InputFormat::SpaceSeparated);
        assert_eq!(args, vec![json!("inf"), json!("NaN")]);
    }

    #[test]
    fn test_large_unsigned_token() {
        let args = parse_arguments("18446744073709551615", InputFormat::SpaceSeparated);
        assert_eq!(args, vec![json!(u64::MAX)]);
    }
}
