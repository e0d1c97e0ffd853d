//! BuildRun CLI - start, follow and cancel BuildRuns.
//!
//! Build output goes to stdout, diagnostics to stderr. Exits 0 on success
//! (an interrupted log stream included) and 1 on any failure.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use buildrun_client::HttpResourceApi;
use buildrun_core::{BuildRequest, RunName};
use buildrun_follow::{
    BuildFollower, FollowError, FollowReport, DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_DELAY_SECS,
};

use config::{Config, DEFAULT_API_URL, DEFAULT_NAMESPACE};

/// BuildRun CLI - drive builds on the orchestration platform
#[derive(Parser, Debug)]
#[command(name = "buildrun", version)]
#[command(about = "Start, follow and cancel BuildRuns", long_about = None)]
struct Cli {
    /// Platform API address
    #[arg(long, env = "BUILDRUN_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Namespace of the build objects
    #[arg(short, long, env = "BUILDRUN_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    namespace: String,

    /// Attempts to attach to a pod that is not ready yet
    #[arg(long, default_value_t = DEFAULT_ATTACH_ATTEMPTS, global = true)]
    attach_attempts: u32,

    /// Seconds between attach attempts
    #[arg(long, default_value_t = DEFAULT_ATTACH_DELAY_SECS, global = true)]
    attach_delay_secs: u64,

    /// Give up waiting after this many seconds
    #[arg(long, global = true)]
    wait_timeout_secs: Option<u64>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a build specified by name
    Run {
        /// Build name
        build: String,

        /// Start a build and watch its log until it completes or fails
        #[arg(short = 'F', long)]
        follow: bool,

        /// Service account the build runs as
        #[arg(long)]
        sa_name: Option<String>,

        /// Build timeout, e.g. "10m"
        #[arg(long)]
        timeout: Option<String>,

        /// Output image override
        #[arg(long)]
        output_image: Option<String>,
    },

    /// Follow the log of an existing BuildRun
    Follow {
        /// BuildRun name
        run: String,
    },

    /// Cancel a running BuildRun
    Cancel {
        /// BuildRun name
        run: String,
    },
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            api_url: self.api_url.clone(),
            namespace: self.namespace.clone(),
            attach_attempts: self.attach_attempts,
            attach_delay_secs: self.attach_delay_secs,
            wait_timeout_secs: self.wait_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = cli.config();
    debug!(?config, "Configuration loaded");

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&config, cancel.clone());

    let api = Arc::new(HttpResourceApi::new(&config.api_url));
    let follower = BuildFollower::new(api, config.namespace.clone())
        .with_policy(config.attach_policy())
        .with_cancel_token(cancel);

    let mut stdout = tokio::io::stdout();
    let result = execute(cli.command, &follower, &mut stdout).await;
    if let Err(e) = &result {
        eprintln!("Error: {}", e);
    }
    ExitCode::from(exit_status(&result))
}

/// Process exit status for the outcome of a command.
fn exit_status(result: &Result<(), FollowError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Stderr logging; `--log-level` wins over `RUST_LOG`, default `warn`.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel the shared token on Ctrl-C or when the deadline passes.
fn spawn_cancel_triggers(config: &Config, cancel: CancellationToken) {
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    if let Some(timeout) = config.wait_timeout() {
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(timeout_secs = timeout.as_secs(), "Wait timeout reached, cancelling");
            cancel.cancel();
        });
    }
}

/// Run one command, writing build output and result lines to `out`.
async fn execute<W>(command: Commands, follower: &BuildFollower, out: &mut W) -> Result<(), FollowError>
where
    W: AsyncWrite + Unpin + Send,
{
    match command {
        Commands::Run {
            build,
            follow,
            sa_name,
            timeout,
            output_image,
        } => {
            let request = build_request(build, sa_name, timeout, output_image);

            if follow {
                let report = follower.submit_and_follow(&request, out).await?;
                report_outcome(&report);
                return Ok(());
            }

            let run = follower.submit(&request).await?;
            let line = format!(
                "BuildRun created {:?} for build {:?}\n",
                run.as_str(),
                request.build_name
            );
            out.write_all(line.as_bytes()).await?;
            out.flush().await?;
            Ok(())
        }
        Commands::Follow { run } => {
            let report = follower.follow(&RunName::new(run), out).await?;
            report_outcome(&report);
            Ok(())
        }
        Commands::Cancel { run } => {
            let run = follower.cancel(&RunName::new(run)).await?;
            let line = format!("BuildRun successfully canceled '{}'\n", run);
            out.write_all(line.as_bytes()).await?;
            out.flush().await?;
            Ok(())
        }
    }
}

fn build_request(
    build: String,
    sa_name: Option<String>,
    timeout: Option<String>,
    output_image: Option<String>,
) -> BuildRequest {
    let mut request = BuildRequest::new(build);
    if let Some(name) = sa_name {
        request = request.with_service_account(name);
    }
    if let Some(timeout) = timeout {
        request = request.with_timeout(timeout);
    }
    if let Some(image) = output_image {
        request = request.with_output_image(image);
    }
    request
}

fn report_outcome(report: &FollowReport) {
    debug!(
        run = %report.run,
        task = %report.task,
        pod = %report.unit,
        retries = report.attach.retries,
        bytes = report.attach.bytes_copied,
        "Follow finished"
    );
    if let Some(reason) = &report.attach.interrupted {
        warn!(pod = %report.unit, reason = %reason, "Log streaming was interrupted");
    }
}
