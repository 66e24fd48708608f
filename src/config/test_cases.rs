use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::services::{Service, Services};
use crate::error::user_error;

/// Expected RPC status of a step, both fields optional.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusExpectation {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// One RPC invocation inside a test case, with the resolved service
/// attached. Request and expected response are kept as raw JSON text so
/// `$variable` substitution happens on bytes, before parsing.
#[derive(Debug, Clone)]
pub struct Step {
    pub service_name: String,
    pub method: String,
    pub request: Option<String>,
    pub response: Option<String>,
    pub status: Option<StatusExpectation>,
    pub metadata: HashMap<String, String>,
    pub store: HashMap<String, serde_json::Value>,
    pub stream: bool,
    pub service: Service,
}

impl Step {
    /// `<proto-package>.<service>.<method>`, the descriptor lookup key.
    pub fn method_full_name(&self) -> String {
        format!("{}.{}", self.service.service, self.method)
    }
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub depends_on: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct RawTestCase {
    name: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    service: String,
    method: String,
    request: Option<serde_json::Value>,
    response: Option<serde_json::Value>,
    status: Option<StatusExpectation>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    store: HashMap<String, serde_json::Value>,
    #[serde(default)]
    stream: bool,
}

/// Read every `test-cases/*.yaml`, resolve service references and default
/// names, and return the cases in file order. Sorting happens separately.
pub fn load_test_cases(configs: &Path, services: &Services) -> Result<Vec<TestCase>> {
    let dir = configs.join("test-cases");
    let entries = std::fs::read_dir(&dir)
        .map_err(|err| user_error(format!("error reading {}: {err}", dir.display())))?;

    let mut paths: Vec<_> = entries
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("error reading {}", dir.display()))?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let case = load_case(&path, services)
            .with_context(|| format!("error loading {}", path.display()))?;
        if !seen.insert(case.name.clone()) {
            return Err(user_error(format!(
                "duplicate test case name '{}' ({})",
                case.name,
                path.display()
            )));
        }
        cases.push(case);
    }

    Ok(cases)
}

fn load_case(path: &Path, services: &Services) -> Result<TestCase> {
    let content = std::fs::read_to_string(path)?;
    let raw: RawTestCase =
        serde_yaml::from_str(&content).map_err(|err| user_error(format!("invalid YAML: {err}")))?;

    let name = match raw.name {
        Some(name) => name,
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let mut steps = Vec::with_capacity(raw.steps.len());
    for (i, raw_step) in raw.steps.into_iter().enumerate() {
        let service = services.get(&raw_step.service).ok_or_else(|| {
            user_error(format!(
                "step {} refers to unknown service '{}'",
                i + 1,
                raw_step.service
            ))
        })?;

        steps.push(Step {
            service_name: raw_step.service,
            method: raw_step.method,
            request: raw_step.request.map(|v| v.to_string()),
            response: raw_step.response.map(|v| v.to_string()),
            status: raw_step.status,
            metadata: raw_step.metadata,
            store: raw_step.store,
            stream: raw_step.stream,
            service: service.clone(),
        });
    }

    Ok(TestCase {
        name,
        depends_on: raw.depends_on,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn service_fixture() -> Services {
        let mut services = BTreeMap::new();
        services.insert(
            "cart".to_string(),
            Service {
                address: "localhost:9000".to_string(),
                service: "shop.v1.Cart".to_string(),
                tls: None,
                metadata: HashMap::new(),
            },
        );
        services
    }

    fn write_case(dir: &Path, file: &str, content: &str) {
        let cases_dir = dir.join("test-cases");
        std::fs::create_dir_all(&cases_dir).unwrap();
        std::fs::write(cases_dir.join(file), content).unwrap();
    }

    #[test]
    fn test_load_case_with_default_name() {
        let dir = tempfile::tempdir().unwrap();
        write_case(
            dir.path(),
            "add-item.yaml",
            concat!(
                "steps:\n",
                "  - service: cart\n",
                "    method: AddItem\n",
                "    request: {\"sku\": \"a-1\"}\n",
                "    response: {\"total\": 1}\n",
            ),
        );

        let cases = load_test_cases(dir.path(), &service_fixture()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "add-item");

        let step = &cases[0].steps[0];
        assert_eq!(step.method_full_name(), "shop.v1.Cart.AddItem");
        assert_eq!(step.request.as_deref(), Some(r#"{"sku":"a-1"}"#));
        assert_eq!(step.response.as_deref(), Some(r#"{"total":1}"#));
        assert!(!step.stream);
    }

    #[test]
    fn test_explicit_name_and_depends_on() {
        let dir = tempfile::tempdir().unwrap();
        write_case(
            dir.path(),
            "b.yaml",
            concat!(
                "name: checkout\n",
                "depends_on: [add-item]\n",
                "steps:\n",
                "  - service: cart\n",
                "    method: Checkout\n",
                "    status: {code: OK}\n",
            ),
        );

        let cases = load_test_cases(dir.path(), &service_fixture()).unwrap();
        assert_eq!(cases[0].name, "checkout");
        assert_eq!(cases[0].depends_on, vec!["add-item"]);
        assert_eq!(cases[0].steps[0].status.as_ref().unwrap().code.as_deref(), Some("OK"));
    }

    #[test]
    fn test_unknown_service_is_user_error() {
        let dir = tempfile::tempdir().unwrap();
        write_case(
            dir.path(),
            "bad.yaml",
            "steps:\n  - service: nosuch\n    method: Foo\n",
        );

        let err = load_test_cases(dir.path(), &service_fixture()).unwrap_err();
        let user = crate::error::find_user_error(&err).expect("user error");
        assert!(user.contains("unknown service 'nosuch'"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_case(dir.path(), "x.yaml", "name: same\nsteps: []\n");
        write_case(dir.path(), "y.yaml", "name: same\nsteps: []\n");

        let err = load_test_cases(dir.path(), &service_fixture()).unwrap_err();
        assert!(err.to_string().contains("duplicate test case name"));
    }

    #[test]
    fn test_non_yaml_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_case(dir.path(), "ok.yaml", "steps: []\n");
        std::fs::write(dir.path().join("test-cases/.gkeep"), "").unwrap();

        let cases = load_test_cases(dir.path(), &service_fixture()).unwrap();
        assert_eq!(cases.len(), 1);
    }
}
