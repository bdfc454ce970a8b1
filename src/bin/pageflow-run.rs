//! pageflow-run: run a UI test suite with per-run overrides.
//!
//! ```bash
//! pageflow-run --env staging --headed --filter login
//! pageflow-run --browser chrome --workers 4 --report out/allure
//! pageflow-run --dry-run -- --nocapture
//! ```
//!
//! Flags become `PAGEFLOW_*` variables that the suite's configuration
//! loader picks up, and the run itself is a plain `cargo test`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pageflow::config::{LoggingSettings, CONFIG_PATH_VAR, ENV_PREFIX};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pageflow-run")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Browser kind (chromium, chrome, msedge)
    #[arg(long)]
    browser: Option<String>,

    /// Target environment name, e.g. staging
    #[arg(long = "env")]
    environment: Option<String>,

    /// Only run tests whose name contains this string
    #[arg(short = 'k', long)]
    filter: Option<String>,

    /// Number of test threads
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Results directory for report files
    #[arg(long)]
    report: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Extra arguments for the test binary
    #[arg(last = true)]
    test_args: Vec<String>,
}

/// A fully resolved `cargo test` call.
#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Invocation {
    fn from_cli(cli: &Cli) -> Self {
        let mut env = Vec::new();
        let mut set = |name: &str, value: String| env.push((format!("{ENV_PREFIX}{name}"), value));

        if let Some(browser) = &cli.browser {
            set("BROWSER", browser.clone());
        }
        if let Some(environment) = &cli.environment {
            set("ENVIRONMENT", environment.clone());
        }
        if cli.headed {
            set("HEADLESS", "false".into());
        }
        if let Some(dir) = &cli.report {
            set("RESULTS_DIR", dir.display().to_string());
        }
        if cli.verbose {
            set("LOG_LEVEL", "debug".into());
        }
        if let Some(path) = &cli.config {
            env.push((CONFIG_PATH_VAR.to_string(), path.display().to_string()));
        }

        let mut args = vec!["test".to_string()];
        if let Some(filter) = &cli.filter {
            args.push(filter.clone());
        }
        args.push("--".into());
        args.push(format!("--test-threads={}", cli.workers));
        args.extend(cli.test_args.iter().cloned());

        Self {
            program: "cargo".into(),
            args,
            env,
        }
    }

    /// Shell-style rendering for `--dry-run` and logs.
    fn render(&self) -> String {
        self.env
            .iter()
            .map(|(k, v)| format!("{k}={}", quote(v)))
            .chain(std::iter::once(self.program.clone()))
            .chain(self.args.iter().map(|a| quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    pageflow::logging::init(&LoggingSettings {
        level: if cli.verbose { "debug" } else { "info" }.into(),
        json: false,
    });

    let invocation = Invocation::from_cli(&cli);
    if cli.dry_run {
        println!("{}", invocation.render());
        return ExitCode::SUCCESS;
    }

    info!(command = %invocation.render(), "running tests");
    let status = tokio::process::Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k, v)))
        .status()
        .await;

    match status {
        Ok(status) if status.success() => ExitCode::SUCCESS,
        Ok(status) => {
            error!(code = ?status.code(), "tests failed");
            ExitCode::from(status.code().map_or(1, |c| c.clamp(1, 255) as u8))
        }
        Err(e) => {
            error!(error = %e, "cannot start cargo");
            ExitCode::FAILURE
        }
    }
}
