//! dumbproxy-auth - proxy authentication toolkit
//!
//! Checks authenticator configuration, tries credentials against it and
//! maintains credential files.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use dumbproxy_auth::{config::Config, passwd, AuthRequest};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// dumbproxy-auth - pluggable proxy authentication
#[derive(Parser, Debug)]
#[command(name = "dumbproxy-auth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the configured authenticator and report whether it is usable
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Validate a username/password against the configured authenticator
    Verify {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        password: String,

        /// Host the simulated request addresses
        #[arg(long, default_value = "")]
        host: String,

        /// Print the Prometheus counters after the decision
        #[arg(long)]
        metrics: bool,
    },

    /// Add or update a user in a credential file
    Passwd {
        /// Credential file to update (created if missing)
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        user: String,

        /// Password; read from the first line of stdin when omitted
        #[arg(short, long)]
        password: Option<String>,

        /// bcrypt cost
        #[arg(long, default_value_t = passwd::DEFAULT_COST)]
        cost: u32,
    },
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn read_password_from_stdin() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(feature = "metrics")]
fn print_metrics() {
    print!("{}", dumbproxy_auth::metrics::render());
}

#[cfg(not(feature = "metrics"))]
fn print_metrics() {
    tracing::warn!("built without the metrics feature");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting dumbproxy-auth v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Check { config } => {
            let config = Config::load(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            let auth = config.build_authenticator()?;
            println!("ok");
            auth.stop();
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            config,
            user,
            password,
            host,
            metrics,
        } => {
            let config = Config::load(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            let auth = config.build_authenticator()?;

            let request = AuthRequest {
                target_host: host.clone(),
                host,
                proxy_authorization: Some(format!(
                    "Basic {}",
                    STANDARD.encode(format!("{}:{}", user, password))
                )),
                tls: None,
            };
            let verdict = auth.validate(&request);
            auth.stop();

            let code = match verdict.response() {
                None => {
                    println!("granted {}", verdict.identity());
                    ExitCode::SUCCESS
                }
                Some(response) => {
                    println!("denied {}", response.status().as_u16());
                    ExitCode::FAILURE
                }
            };

            if metrics {
                print_metrics();
            }
            Ok(code)
        }

        Command::Passwd {
            file,
            user,
            password,
            cost,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password_from_stdin()?,
            };
            let change = passwd::set_password(&file, &user, &password, cost)?;
            println!("{:?} {}", change, user);
            Ok(ExitCode::SUCCESS)
        }
    }
}
