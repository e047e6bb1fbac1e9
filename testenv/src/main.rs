//! Test environment runner
//!
//! Brings up one test environment from the command line:
//! - Starts the mock management plane, config manager, proxy and backend
//! - Waits for every component to pass its readiness checks
//! - Optionally keeps everything running until Ctrl+C
//! - Tears down and reports invariant or shutdown failures

use anyhow::{Context, Result, bail};
use clap::Parser;
use shared::{BackendKind, DebugComponents};

use testenv::{HarnessSettings, RealComponents, TestEnv, TestEnvOptions};

#[derive(Parser)]
#[command(name = "testenv")]
#[command(about = "Multi-process integration test environment for the API proxy")]
struct Args {
    /// Backend to run behind the proxy
    #[arg(long, default_value = "echo-sidecar")]
    backend: BackendKind,

    /// Test id; selects a block of ports unique to this run
    #[arg(long, default_value = "0")]
    test_id: u16,

    /// Components that log verbosely: all, envoy, configmanager or bootstrap
    #[arg(long)]
    debug_components: Option<DebugComponents>,

    /// Enable tracing with this sample rate
    #[arg(long)]
    tracing_sample_rate: Option<f32>,

    /// Proxy drain time in seconds
    #[arg(long)]
    drain_time_secs: Option<u32>,

    #[arg(long)]
    skip_health_checks: bool,

    /// Keep services running after setup until Ctrl+C
    #[arg(long)]
    keep_running: bool,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,

    /// Extra arguments passed to the config manager unchanged
    #[arg(last = true)]
    conf_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = HarnessSettings::from_env().context("failed to read harness settings")?;
    if let Some(debug) = args.debug_components {
        settings = settings.with_debug_components(debug);
    }
    shared::logging::init_tracing(settings.debug_components, args.verbose);

    tracing::info!("🧪 Starting test environment {} with backend {}", args.test_id, args.backend);

    let mut builder = TestEnvOptions::builder(args.backend);
    if let Some(rate) = args.tracing_sample_rate {
        builder = builder.tracing_sample_rate(rate);
    }
    if let Some(secs) = args.drain_time_secs {
        builder = builder.envoy_drain_time_secs(secs);
    }
    if args.skip_health_checks {
        builder = builder.skip_health_checks();
    }
    let options = builder.build().context("invalid options")?;

    let debug = settings.debug_components;
    let mut env = TestEnv::with_factory(args.test_id, options, RealComponents::new(settings), debug)?;

    let setup_result = env.setup(args.conf_args).await;
    match &setup_result {
        Ok(()) => {
            let ports = env.ports();
            tracing::info!("✅ Environment ready, proxy listening on 127.0.0.1:{}", ports.listener_port);

            if args.keep_running {
                tracing::info!("🔄 Keeping services running (--keep-running flag set)");
                tracing::info!("Press Ctrl+C to stop all services");
                tokio::signal::ctrl_c().await?;
            }
        }
        Err(e) => tracing::error!("❌ Setup failed: {}", e),
    }

    tracing::info!("🛑 Tearing down test environment");
    let report = env.tear_down().await;

    setup_result.context("setup failed")?;
    if !report.is_clean() {
        for failure in report.failures() {
            tracing::error!("{}", failure);
        }
        bail!("teardown reported {} failure(s)", report.failures().len());
    }

    tracing::info!("🏁 Test environment completed");
    Ok(())
}
