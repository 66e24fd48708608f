// Compiles .proto sources at startup and indexes the method descriptors
// the loaded test cases need.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use prost_reflect::{DescriptorPool, MethodDescriptor};
use protobuf::Message as _;
use walkdir::WalkDir;

use crate::config::global::Global;
use crate::config::test_cases::TestCase;
use crate::error::user_error;

/// Method descriptors keyed by `<package>.<service>.<method>`. Built once;
/// lookups never re-compile and never block.
#[derive(Debug)]
pub struct DescriptorStore {
    methods: HashMap<String, MethodDescriptor>,
}

impl DescriptorStore {
    pub fn build(global: &Global, test_cases: &[TestCase]) -> Result<Self> {
        let root = Path::new(&global.proto_root);
        let sources =
            collect_sources(root, &global.proto_sources).context("error collecting proto sources")?;
        let pool = compile(root, &global.proto_imports, &sources)
            .context("error compiling proto sources")?;

        let mut methods = HashMap::new();
        for test_case in test_cases {
            for step in &test_case.steps {
                let full_name = step.method_full_name();
                if methods.contains_key(&full_name) {
                    continue;
                }

                let service = pool.get_service_by_name(&step.service.service).ok_or_else(|| {
                    user_error(format!(
                        "service {} not found in compiled proto sources",
                        step.service.service
                    ))
                })?;
                let method = service
                    .methods()
                    .find(|m| m.name() == step.method)
                    .ok_or_else(|| user_error(format!("method {full_name} not found in sources")))?;

                methods.insert(full_name, method);
            }
        }

        Ok(Self { methods })
    }

    pub fn get(&self, full_name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(full_name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Resolve the list of .proto files to compile, relative to the root.
/// An empty source list means the whole tree; a listed directory expands
/// to its immediate .proto files; a listed file is taken verbatim.
fn collect_sources(root: &Path, sources: &[String]) -> Result<Vec<PathBuf>> {
    if sources.is_empty() {
        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| format!("error reading {}", root.display()))?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|ext| ext.to_str()) == Some("proto")
            {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .expect("walked path is under root");
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        return Ok(files);
    }

    let mut files = Vec::new();
    for source in sources {
        let path = root.join(source);
        let info = std::fs::metadata(&path)
            .map_err(|_| user_error(format!("path {source} does not exist")))?;

        if info.is_dir() {
            let mut in_dir = Vec::new();
            for entry in std::fs::read_dir(&path)
                .with_context(|| format!("error reading proto source {source}"))?
            {
                let entry = entry?;
                let entry_path = entry.path();
                if entry_path.is_file()
                    && entry_path.extension().and_then(|ext| ext.to_str()) == Some("proto")
                {
                    in_dir.push(PathBuf::from(source).join(entry.file_name()));
                }
            }
            in_dir.sort();
            files.extend(in_dir);
        } else {
            files.push(PathBuf::from(source));
        }
    }

    Ok(files)
}

/// Compile with the pure-Rust parser, import paths being the configured
/// imports plus the root, then hand the descriptor set to prost-reflect.
fn compile(root: &Path, imports: &[String], sources: &[PathBuf]) -> Result<DescriptorPool> {
    let mut includes: Vec<PathBuf> = vec![root.to_path_buf()];
    includes.extend(imports.iter().map(PathBuf::from));

    let inputs: Vec<PathBuf> = sources.iter().map(|source| root.join(source)).collect();

    let mut parser = protobuf_parse::Parser::new();
    parser.pure();
    parser.includes(&includes);
    parser.inputs(&inputs);
    let parsed = parser
        .parse_and_typecheck()
        .map_err(|err| user_error(format!("{err:#}")))?;

    let mut files = parsed.file_descriptors;
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut descriptor_set = protobuf::descriptor::FileDescriptorSet::new();
    descriptor_set.file = files;
    let bytes = descriptor_set
        .write_to_bytes()
        .context("failed to encode compiled descriptor set")?;

    DescriptorPool::decode(bytes.as_slice()).context("failed to build descriptor pool")
}
