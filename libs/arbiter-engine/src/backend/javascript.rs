use super::{validate_function_name, LanguageBackend};
use async_trait::async_trait;
use anyhow::{Context, Result};
use arbiter_common::config::LanguageConfig;
use arbiter_common::types::Language;
use serde_json::Value;

pub struct JavaScriptBackend {
    config: LanguageConfig,
}

impl JavaScriptBackend {
    pub fn new(config: LanguageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LanguageBackend for JavaScriptBackend {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn config(&self) -> &LanguageConfig {
        &self.config
    }

    fn wrap(&self, source_code: &str, args: &[Value], function_name: &str) -> Result<String> {
        validate_function_name(function_name)?;

        // A JSON array is already a valid JavaScript array literal
        let args_literal = serde_json::to_string(args).context("Failed to serialize arguments")?;

        Ok(format!(
            "{source}\n\n{epilogue}",
            source = source_code,
            epilogue = EPILOGUE
                .replace("{FUNCTION}", function_name)
                .replace("{ARGS}", &args_literal),
        ))
    }
}

// JavaScript never rejects a call for arity, so a function declaring
// exactly one plain parameter and given several arguments is treated as
// taking the whole list. `length` alone also counts `(a, b = 1)` and
// `(a, ...rest)` as one, hence the look at the parameter list itself.
const EPILOGUE: &str = r#";(async () => {
  const __arbiterArgs = {ARGS};
  const __arbiterFn = {FUNCTION};
  if (typeof __arbiterFn !== 'function') {
    throw new TypeError('{FUNCTION} is not a function');
  }
  const __arbiterSingleParam = (fn) => {
    if (fn.length !== 1) return false;
    const src = Function.prototype.toString.call(fn);
    const open = src.indexOf('(');
    const arrow = src.indexOf('=>');
    if (open === -1 || (arrow !== -1 && arrow < open)) return true;
    let depth = 0;
    for (let i = open + 1; i < src.length; i++) {
      const c = src[i];
      if (c === '(' || c === '[' || c === '{') {
        depth++;
      } else if (c === ')' || c === ']' || c === '}') {
        if (depth === 0) return true;
        depth--;
      } else if (c === ',' && depth === 0) {
        return false;
      }
    }
    return true;
  };
  let __arbiterResult;
  if (__arbiterArgs.length > 1 && __arbiterSingleParam(__arbiterFn)) {
    __arbiterResult = __arbiterFn(__arbiterArgs);
  } else {
    try {
      __arbiterResult = __arbiterFn(...__arbiterArgs);
    } catch (err) {
      if (!(err instanceof TypeError)) throw err;
      __arbiterResult = __arbiterFn(__arbiterArgs);
    }
  }
  __arbiterResult = await __arbiterResult;
  if (__arbiterResult !== null && typeof __arbiterResult === 'object') {
    console.log(JSON.stringify(__arbiterResult));
  } else {
    console.log(String(__arbiterResult));
  }
})().catch((err) => {
  console.error(err && err.stack ? err.stack : String(err));
  process.exit(1);
});
"#;
