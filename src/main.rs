use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gantry_core::policy::{self, PolicyViolation};
use gantry_core::{CommandSpec, Config, GuardedExecutor};

/// Run CLI commands behind gantry's policy guard and output shaper.
#[derive(Debug, Parser)]
#[command(name = "gantry", version)]
struct Cli {
    /// Config file (defaults to $GANTRY_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an allowlisted program and print its output envelope.
    Run(RunArgs),
    /// Validate a single value against a policy check.
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Working directory, bounded by the `workdir` roots
    #[arg(long)]
    cwd: Option<PathBuf>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Always return the full structured report
    #[arg(long)]
    full: bool,
    /// Run PROGRAM as a shell command line
    #[arg(long)]
    shell: bool,
    program: String,
    /// Trusted literal argument, passed before positionals
    #[arg(long = "flag", value_name = "F", allow_hyphen_values = true)]
    flags: Vec<String>,
    /// Untrusted values, checked for flag injection
    #[arg(last = true)]
    positionals: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum CheckTarget {
    Url { value: String },
    Header { key: String, value: String },
    Mount { value: String },
    Port { value: String },
    Path {
        value: String,
        /// Directory the path must stay within (defaults to the current one)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Check { target } => check(&target),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_spec(args: RunArgs) -> CommandSpec {
    let mut spec = CommandSpec::new(args.program)
        .args(args.flags)
        .shell(args.shell);
    for (i, value) in args.positionals.into_iter().enumerate() {
        spec = spec.positional(format!("positional[{i}]"), value);
    }
    if let Some(cwd) = args.cwd {
        spec = spec.cwd(cwd);
    }
    if let Some(ms) = args.timeout_ms {
        spec = spec.timeout(Duration::from_millis(ms));
    }
    spec
}

async fn run(config: &Config, args: RunArgs) -> anyhow::Result<ExitCode> {
    let executor = GuardedExecutor::from_config(config);
    let force_full = args.full;
    let report = executor.execute(build_spec(args)).await?;
    let envelope = executor.shape(&report, force_full)?;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    println!();
    println!("{}", envelope.human_text);

    let code = u8::try_from(report.exit_code).unwrap_or(1);
    Ok(ExitCode::from(code))
}

fn check(target: &CheckTarget) -> anyhow::Result<ExitCode> {
    let outcome = match target {
        CheckTarget::Url { value } => policy::assert_safe_url(value),
        CheckTarget::Header { key, value } => policy::assert_safe_header(key, value),
        CheckTarget::Mount { value } => policy::assert_safe_volume_mount(value),
        CheckTarget::Port { value } => policy::assert_valid_port_mapping(value),
        CheckTarget::Path { value, cwd } => {
            let cwd = match cwd {
                Some(dir) => dir.clone(),
                None => std::env::current_dir().context("failed to read current directory")?,
            };
            policy::assert_safe_file_path(value, &cwd)
        }
    };
    report_check(outcome)
}

fn report_check(outcome: Result<(), PolicyViolation>) -> anyhow::Result<ExitCode> {
    match outcome {
        Ok(()) => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
        Err(violation) => {
            println!("{}", serde_json::to_string_pretty(&violation)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_split_flags_and_positionals() {
        let cli = Cli::try_parse_from([
            "gantry",
            "run",
            "--cwd",
            "/srv/repo",
            "--timeout-ms",
            "500",
            "git",
            "--flag",
            "log",
            "--flag",
            "--oneline",
            "--",
            "main",
            "-rf",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.program, "git");
        assert_eq!(args.flags, vec!["log", "--oneline"]);
        assert_eq!(args.positionals, vec!["main", "-rf"]);

        let spec = build_spec(args);
        assert_eq!(spec.args, vec!["log", "--oneline"]);
        assert_eq!(
            spec.positionals[1],
            ("positional[1]".to_owned(), "-rf".to_owned())
        );
        assert_eq!(spec.timeout, Some(Duration::from_millis(500)));
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv/repo")));
    }

    #[test]
    fn check_subcommands_parse() {
        let cli = Cli::try_parse_from(["gantry", "check", "header", "X-A", "b"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Check {
                target: CheckTarget::Header { .. }
            }
        ));
        assert!(Cli::try_parse_from(["gantry", "check", "bogus", "x"]).is_err());
    }

    #[test]
    fn check_reports_violation_as_failure() {
        let target = CheckTarget::Url {
            value: "file:///etc/passwd".into(),
        };
        assert_eq!(check(&target).unwrap(), ExitCode::FAILURE);
        let target = CheckTarget::Port {
            value: "8080:80".into(),
        };
        assert_eq!(check(&target).unwrap(), ExitCode::SUCCESS);
    }

    #[test]
    fn check_path_uses_given_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let target = CheckTarget::Path {
            value: "../escape".into(),
            cwd: Some(dir.path().to_path_buf()),
        };
        assert_eq!(check(&target).unwrap(), ExitCode::FAILURE);
    }
}
