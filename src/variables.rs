// Variable environment shared by the whole run.
//
// Values come from variables.yaml and --var overrides, and are mutated at
// run time only by the `store` predicate. Substitution scans for `$name`
// tokens; an unknown name is a user error, never an empty string.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::services::Services;
use crate::error::user_error;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\w+").expect("valid token regex"));

#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `variables.yaml` from the configs directory (absence means an
    /// empty map) and overlay `--var key=value` flags, later flags winning.
    pub fn load(configs: &Path, overrides: &[String]) -> Result<Self> {
        let path = configs.join("variables.yaml");
        let mut values: HashMap<String, String> = match std::fs::read_to_string(&path) {
            // An empty file parses as YAML null, so short-circuit it.
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_yaml::from_str(&content)
                .with_context(|| format!("error parsing {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("error reading {}", path.display()));
            }
        };

        for var in overrides {
            let (key, value) = var.split_once('=').ok_or_else(|| {
                user_error(format!("malformed --var '{var}', expected key=value"))
            })?;
            values.insert(key.to_string(), value.to_string());
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Write-back used by the `store` predicate.
    pub fn store(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Replace every `$name` token in `input`. Surrounding characters are
    /// kept verbatim; the token itself is the greedy `\$\w+` match.
    pub fn substitute(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for token in TOKEN_RE.find_iter(input) {
            let name = &token.as_str()[1..];
            let value = self
                .values
                .get(name)
                .ok_or_else(|| user_error(format!("variable ${name} is not defined")))?;
            out.push_str(&input[last..token.start()]);
            out.push_str(value);
            last = token.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// In-place substitution over every value of a string map; keys are
    /// left untouched.
    pub fn substitute_map(&self, map: &mut HashMap<String, String>) -> Result<()> {
        for value in map.values_mut() {
            *value = self.substitute(value)?;
        }
        Ok(())
    }

    /// Like [`substitute`], but tokens without a value stay in place
    /// instead of erroring.
    ///
    /// [`substitute`]: Variables::substitute
    fn substitute_known(&self, input: &str) -> String {
        TOKEN_RE
            .replace_all(input, |captures: &regex::Captures<'_>| {
                let token = &captures[0];
                match self.values.get(&token[1..]) {
                    Some(value) => value.clone(),
                    None => token.to_string(),
                }
            })
            .into_owned()
    }

    /// Materialize service default metadata once, after load and before any
    /// step runs. Tokens that only gain a value during the run (a later
    /// `store`) survive here and resolve strictly at step time.
    pub fn materialize_service_metadata(&self, services: &mut Services) {
        for service in services.values_mut() {
            for value in service.metadata.values_mut() {
                *value = self.substitute_known(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
