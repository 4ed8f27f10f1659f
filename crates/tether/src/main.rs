//! tether CLI
//!
//! Runs commands on a device and moves files to and from it

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use eyre::{WrapErr, bail};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod factory;

use config::Config;
use factory::Device;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Remote command execution and file transfer for a device", long_about = None)]
struct Cli {
    /// Device profile (defaults to $TETHER_CONFIG or the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Persistent session, output after exit
    Blocking,
    /// One-off ssh, output captured
    Interactive,
    /// One-off ssh attached to this terminal
    Tty,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct KillTarget {
    /// Process id to signal
    #[arg(long)]
    pid: Option<u32>,
    /// Process name to kill
    #[arg(long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command on the device
    Exec {
        #[arg(long, value_enum, default_value = "blocking")]
        mode: Mode,
        /// Command line, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
    /// Start a command in the background and print its pid
    Bg {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
    /// Signal a process by pid, or kill all processes with a name
    Kill {
        #[command(flatten)]
        target: KillTarget,
    },
    /// List a directory
    Ls {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print a file, optionally through grep
    Cat {
        path: String,
        /// Arguments passed to grep as written
        #[arg(long, allow_hyphen_values = true)]
        grep: Option<String>,
    },
    /// Copy a local path to the device
    Push {
        local: String,
        remote: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy a device path to this machine
    Pull {
        remote: String,
        local: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Empty a directory, creating it if needed
    Reset { path: String },
    /// Install tools from the profile's tool table
    Install {
        /// Install every tool with an install method
        #[arg(long, conflicts_with = "tools")]
        all: bool,
        tools: Vec<String>,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit<T: Serialize>(json: bool, value: &T, plain: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain(value);
    }
    Ok(())
}

fn print_output(stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        println!("{}", stdout.trim_end());
    }
    if !stderr.is_empty() {
        eprintln!("{}", stderr.trim_end());
    }
}

/// Run the subcommand; the returned code becomes the process exit status
async fn run(cli: Cli, config: Config) -> Result<i32> {
    let device = Device::open(&config)?;
    let json = cli.json;

    match cli.command {
        Commands::Exec { mode, cmd } => {
            let cmd = cmd.join(" ");
            match mode {
                Mode::Blocking => {
                    let result = device.dispatcher.blocking(&cmd, false).await?;
                    emit(json, &result, |r| print_output(&r.stdout, &r.stderr))?;
                    Ok(result.status)
                }
                Mode::Interactive => {
                    let result = device.dispatcher.interactive(&cmd).await?;
                    emit(json, &result, |r| print_output(&r.stdout, &r.stderr))?;
                    Ok(result.status)
                }
                Mode::Tty => Ok(device.dispatcher.interactive_tty(&cmd).await?),
            }
        }
        Commands::Bg { cmd } => {
            let process = device.dispatcher.background(&cmd.join(" ")).await?;
            emit(json, &process, |p| match p.pid {
                Some(pid) => println!("{pid}"),
                None => eprintln!("started, pid unknown"),
            })?;
            Ok(if process.pid.is_some() { 0 } else { 1 })
        }
        Commands::Kill { target } => {
            let result = match (target.pid, target.name) {
                (Some(pid), _) => device.tracker.stop_pid(pid).await?,
                (None, Some(name)) => device.tracker.kill_by_name(&name).await?,
                (None, None) => bail!("either --pid or --name is required"),
            };
            emit(json, &result, |r| print_output(&r.stdout, &r.stderr))?;
            Ok(result.status)
        }
        Commands::Ls { path, recursive } => {
            let Some(entries) = device.fs.dir_list(&path, recursive).await? else {
                bail!("no such directory on device: {path}");
            };
            let entries: Vec<String> = entries.collect();
            emit(json, &entries, |e| {
                for entry in e {
                    println!("{entry}");
                }
            })?;
            Ok(0)
        }
        Commands::Cat { path, grep } => {
            let content = device.fs.read_file(&path, grep.as_deref()).await?;
            emit(json, &content, |c| println!("{c}"))?;
            Ok(0)
        }
        Commands::Push {
            local,
            remote,
            recursive,
        } => {
            device
                .transfer
                .upload(&local, &remote, recursive)
                .await
                .wrap_err_with(|| format!("failed to push {local}"))?;
            Ok(0)
        }
        Commands::Pull {
            remote,
            local,
            recursive,
        } => {
            device
                .transfer
                .download(&remote, &local, recursive)
                .await
                .wrap_err_with(|| format!("failed to pull {remote}"))?;
            Ok(0)
        }
        Commands::Reset { path } => {
            device.fs.dir_reset(&path).await?;
            Ok(0)
        }
        Commands::Install { all, tools } => {
            let selection = if all {
                config.installer.installable()
            } else {
                tools
            };
            let mut installer = device.installer(&config);
            let report = installer.run(&selection).await?;
            emit(json, &report, |r| {
                for tool in &r.tools {
                    match (&tool.outcome, &tool.error) {
                        (Some(outcome), _) => println!("{}: {outcome:?}", tool.tool),
                        (None, Some(error)) => println!("{}: failed ({error})", tool.tool),
                        (None, None) => println!("{}: ?", tool.tool),
                    }
                }
            })?;
            Ok(if report.success() { 0 } else { 1 })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let path = cli.config.clone().or_else(Config::locate);
    let config = match &path {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    init_tracing(&config.log.level, cli.json_logs);
    match &path {
        Some(path) => info!(path = %path.display(), "loaded device profile"),
        None => warn!("no config file found, using defaults"),
    }

    let code = run(cli, config).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
