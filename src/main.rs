// Main entry point for grpcsuite

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use grpcsuite::check::ResponseChecker;
use grpcsuite::cli::{Cli, Commands, RunArgs, SetupArgs, ValidateArgs};
use grpcsuite::config::{self, Global, Services, TestCase};
use grpcsuite::error::{find_user_error, user_error};
use grpcsuite::execution;
use grpcsuite::grpc::{ChannelPool, ClientPool, DescriptorStore};
use grpcsuite::variables::Variables;

#[tokio::main]
async fn main() {
    // Install the default crypto provider (ring) to avoid panics with rustls 0.23+
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Run(args) => run(args, verbose).await,
        Commands::Validate(args) => validate(args, verbose).await,
        Commands::Setup(args) => setup(args),
    };

    if let Err(err) = result {
        // User-facing problems print their message alone; everything else
        // gets the full diagnostic chain.
        match find_user_error(&err) {
            Some(user) if !verbose => eprintln!("{user}"),
            _ => eprintln!("{err:?}"),
        }
        std::process::exit(1);
    }
}

struct Loaded {
    global: Global,
    services: Services,
    variables: Variables,
    test_cases: Vec<TestCase>,
    descriptors: Arc<DescriptorStore>,
}

fn load(configs: &Path, vars: &[String], target: Option<&str>, verbose: bool) -> Result<Loaded> {
    let global = Global::load(configs)?;
    grpcsuite::logging::init(global.format, global.timestamp, verbose);

    let mut services = config::load_services(configs)?;
    let variables = Variables::load(configs, vars)?;
    variables.materialize_service_metadata(&mut services);

    let mut test_cases = config::load_test_cases(configs, &services)?;
    test_cases = config::sort(test_cases)?;
    if let Some(target) = target {
        test_cases = config::sort(config::filter_target(test_cases, target)?)?;
    }

    let descriptors = Arc::new(DescriptorStore::build(&global, &test_cases)?);

    Ok(Loaded {
        global,
        services,
        variables,
        test_cases,
        descriptors,
    })
}

async fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let loaded = load(&args.configs, &args.vars, args.target.as_deref(), verbose)?;

    let channels = ChannelPool::connect(&loaded.services)?;
    let clients = ClientPool::new(&loaded.services, &channels, loaded.descriptors.clone())?;

    info!("running {} test case(s)", loaded.test_cases.len());
    let runner = execution::Runner::new(
        loaded.test_cases,
        clients,
        ResponseChecker::new(),
        loaded.variables,
        loaded.global.stop_at_first_failure,
    );
    let summary = runner.run().await?;

    if !summary.all_passed() {
        return Err(user_error(format!(
            "{} test case(s) failed: {}",
            summary.failed.len(),
            summary.failed.join(", ")
        )));
    }

    info!("all test cases passed");
    Ok(())
}

async fn validate(args: ValidateArgs, verbose: bool) -> Result<()> {
    let loaded = load(&args.configs, &[], None, verbose)?;
    execution::validate(&loaded.test_cases, &loaded.descriptors)?;
    println!(
        "configuration is valid: {} test case(s), {} service(s), {} method(s)",
        loaded.test_cases.len(),
        loaded.services.len(),
        loaded.descriptors.len()
    );
    Ok(())
}

fn setup(args: SetupArgs) -> Result<()> {
    execution::scaffold(&args.dir)?;
    println!("configuration templates created in {}", args.dir.display());
    Ok(())
}
