// Scaffolds a fresh configs directory with commented templates.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::user_error;

const GLOBAL_TEMPLATE: &str = r#"proto_root: "path to root directory with your proto files"
proto_sources:
  - "it can be a relative path (in proto root) to a directory with proto files"
  - "or a relative path (in proto root) to some specific proto file"
proto_imports:
  - "path to additional proto imports, like google protobuf utilities for example"
"#;

const SERVICES_TEMPLATE: &str = r#"foo:
    # full service name with package
    service: package1.Foo
    # address of your service with the port included
    address: "foo:9000"

bar:
    service: package2.Bar
    address: "bar:9000"
    # you can provide any metadata that your service requires
    metadata:
        authorization: $authorization
"#;

const VARIABLES_TEMPLATE: &str = r#"# variables can be used in services metadata or in test-cases (requests, responses)
authorization: some-token
"#;

/// Write template configs into `dir`. Existing files are never
/// overwritten.
pub fn scaffold(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir.join("test-cases")).context("error creating test-cases directory")?;
    std::fs::write(dir.join("test-cases/.gitkeep"), "")
        .context("error creating test-cases placeholder")?;

    for (name, content) in [
        ("global.yaml", GLOBAL_TEMPLATE),
        ("services.yaml", SERVICES_TEMPLATE),
        ("variables.yaml", VARIABLES_TEMPLATE),
    ] {
        let path = dir.join(name);
        if path.exists() {
            return Err(user_error(format!("{} already exists", path.display())));
        }
        std::fs::write(&path, content).with_context(|| format!("error creating {name}"))?;
    }

    Ok(())
}
