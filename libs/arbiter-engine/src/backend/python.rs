use super::{validate_function_name, LanguageBackend};
use async_trait::async_trait;
use anyhow::Result;
use arbiter_common::config::LanguageConfig;
use arbiter_common::types::Language;
use serde_json::Value;

pub struct PythonBackend {
    config: LanguageConfig,
}

impl PythonBackend {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LanguageBackend for PythonBackend {
    fn language(&self) -> Language {
        Language::Python
    }

    fn config(&self) -> &LanguageConfig {
        &self.config
    }

    fn wrap(&self, source_code: &str, args: &[Value], function_name: &str) -> Result<String> {
        validate_function_name(function_name)?;
        if function_name.contains('$') {
            anyhow::bail!("Invalid Python function name: {:?}", function_name);
        }

        let rendered: Vec<String> = args.iter().map(to_python_literal).collect();

        Ok(format!(
            "{source}\n\n{epilogue}",
            source = source_code,
            epilogue = EPILOGUE
                .replace("{FUNCTION}", function_name)
                .replace("{ARGS}", &rendered.join(", ")),
        ))
    }
}

// Arity is checked with inspect before calling so a TypeError raised inside
// the candidate is never mistaken for a calling-convention mismatch. Callables
// without an introspectable signature fall back to try/except.
const EPILOGUE: &str = r#"import inspect as __arbiter_inspect
import json as __arbiter_json

__arbiter_args = [{ARGS}]


def __arbiter_binds(fn, args):
    try:
        signature = __arbiter_inspect.signature(fn)
    except (TypeError, ValueError):
        return None
    try:
        signature.bind(*args)
    except TypeError:
        return False
    return True


def __arbiter_call(fn, args):
    binds = __arbiter_binds(fn, args)
    if binds is False:
        return fn(args)
    if binds is None:
        try:
            return fn(*args)
        except TypeError:
            return fn(args)
    return fn(*args)


def __arbiter_emit(result):
    if isinstance(result, (list, tuple, dict)):
        print(__arbiter_json.dumps(result, default=str))
    else:
        print(result)


__arbiter_emit(__arbiter_call({FUNCTION}, __arbiter_args))
"#;

/// Render a JSON value as a Python literal.
pub fn to_python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        // JSON string escapes are valid Python string escapes
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(to_python_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), to_python_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}
