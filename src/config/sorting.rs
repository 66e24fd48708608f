// Dependency ordering of test cases: three-color DFS with cycle
// detection, plus the --target closure filter.

use std::collections::HashMap;

use anyhow::Result;

use crate::config::test_cases::TestCase;
use crate::error::user_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Todo,
    InProgress,
    Done,
}

/// Topologically sort test cases so every case appears after all of its
/// `depends_on` entries. Unknown dependencies and cycles are user errors;
/// a cycle diagnostic names the back-edge.
pub fn sort(cases: Vec<TestCase>) -> Result<Vec<TestCase>> {
    let deps: HashMap<String, Vec<String>> = cases
        .iter()
        .map(|case| (case.name.clone(), case.depends_on.clone()))
        .collect();
    let mut marks: HashMap<String, Mark> = cases
        .iter()
        .map(|case| (case.name.clone(), Mark::Todo))
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(cases.len());
    for case in &cases {
        visit(&case.name, &deps, &mut marks, &mut order)?;
    }

    let mut by_name: HashMap<String, TestCase> = cases
        .into_iter()
        .map(|case| (case.name.clone(), case))
        .collect();
    Ok(order
        .into_iter()
        .map(|name| by_name.remove(&name).expect("sorted name is loaded"))
        .collect())
}

fn visit(
    name: &str,
    deps: &HashMap<String, Vec<String>>,
    marks: &mut HashMap<String, Mark>,
    order: &mut Vec<String>,
) -> Result<()> {
    if marks[name] == Mark::Done {
        return Ok(());
    }

    marks.insert(name.to_string(), Mark::InProgress);
    for dep in &deps[name] {
        match marks.get(dep) {
            None => {
                return Err(user_error(format!(
                    "test case {name} depends on unknown test case {dep}"
                )));
            }
            Some(Mark::InProgress) => {
                return Err(user_error(format!(
                    "dependency cycle detected: {name} -> {dep}"
                )));
            }
            Some(Mark::Done) => {}
            Some(Mark::Todo) => visit(dep, deps, marks, order)?,
        }
    }
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());

    Ok(())
}

/// Restrict the loaded set to `target` and its transitive dependency
/// closure. The closure is computed first; the caller re-sorts afterwards
/// so dependencies still precede the target.
pub fn filter_target(cases: Vec<TestCase>, target: &str) -> Result<Vec<TestCase>> {
    let deps: HashMap<&str, &[String]> = cases
        .iter()
        .map(|case| (case.name.as_str(), case.depends_on.as_slice()))
        .collect();
    if !deps.contains_key(target) {
        return Err(user_error(format!("target test case {target} is not loaded")));
    }

    let mut keep: Vec<String> = Vec::new();
    let mut stack: Vec<String> = vec![target.to_string()];
    while let Some(name) = stack.pop() {
        if keep.contains(&name) {
            continue;
        }
        if let Some(dependencies) = deps.get(name.as_str()) {
            // Unknown dependency names surface from the sort that follows.
            stack.extend(dependencies.iter().cloned());
        }
        keep.push(name);
    }

    Ok(cases
        .into_iter()
        .filter(|case| keep.contains(&case.name))
        .collect())
}
