//! SublimeTools - async process execution and Node/nvm environment discovery.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sublime_tools::config::{ConfigError, ConfigLoader, SettingsSource, ToolsConfig};
use sublime_tools::display::{self, TerminalNotifier};
use sublime_tools::exec::{
    exec_cmd, execjs, execjsfile, CommandLine, Dispatch, ExecError, ExecOptions, ProcessHandle,
};
use sublime_tools::node::{NodeEnvResolver, ResolveError};

#[derive(Parser)]
#[command(
    name = "sublime-tools",
    about = "Async process execution and Node/nvm environment discovery",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe and print the node environment.
    Env {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the node executable that would be used.
    ///
    /// By default this is the validated resolved path (settings `node_path`,
    /// else nvm default, else system). `--preferred` applies `prefer` instead.
    Which {
        /// Choose by the `prefer` setting without checking the path exists.
        #[arg(long)]
        preferred: bool,
    },
    /// Print the node nvm selects for a directory.
    NvmCurrent {
        /// Directory to evaluate.
        dir: PathBuf,
    },
    /// Run a command, streaming its output.
    Exec {
        /// Interpret the command as a shell line.
        #[arg(long)]
        shell: bool,
        /// Working directory for the child.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Kill the child after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Command and arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Evaluate JavaScript with node.
    Js {
        /// Module resolution base directory.
        #[arg(long)]
        cwd: PathBuf,
        /// Node executable; resolved from settings or the environment if omitted.
        #[arg(long)]
        node: Option<PathBuf>,
        /// Source to evaluate.
        source: String,
    },
    /// Run a JavaScript file with node.
    JsFile {
        /// Module resolution base directory.
        #[arg(long)]
        cwd: PathBuf,
        /// Node executable; resolved from settings or the environment if omitted.
        #[arg(long)]
        node: Option<PathBuf>,
        /// Script to run.
        file: PathBuf,
        /// Arguments passed to the script.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_configs(path: Option<PathBuf>) -> Result<Vec<ToolsConfig>, ConfigError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    tracing::debug!(paths = ?loader.search_paths(), "Config search paths");
    loader.load_all()
}

fn sources(configs: &[ToolsConfig]) -> Vec<&dyn SettingsSource> {
    configs.iter().map(|c| c as &dyn SettingsSource).collect()
}

async fn resolve_node(
    resolver: &NodeEnvResolver,
    configs: &[ToolsConfig],
    explicit: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    // A settings node_path still works when probing fails.
    if let Err(e) = resolver.resolve().await {
        tracing::warn!(error = %e, "Node environment probe failed");
    }
    Ok(resolver.assert_node_path(&sources(configs), &TerminalNotifier)?)
}

async fn stream(handle: ProcessHandle) -> Result<ExitCode, CliError> {
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = handle.wait().await?;
    display::print_exit(&outcome);
    let code = outcome
        .exit_code
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(1);
    Ok(ExitCode::from(code))
}

fn echo_dispatch() -> Dispatch {
    Dispatch::new().on_data(|event| {
        display::print_chunk(&event.bytes);
        Ok(())
    })
}

fn js_options(cwd: &Path) -> ExecOptions {
    ExecOptions::new().working_dir(cwd)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let configs = load_configs(cli.config)?;
    let resolver = NodeEnvResolver::new(ToolsConfig::merged_probe(&configs));

    match cli.command {
        Commands::Env { json } => {
            let env = resolver.resolve().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(env.as_ref())?);
            } else {
                display::print_env(&env);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Which { preferred: false } => {
            let path = resolve_node(&resolver, &configs, None).await?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Which { preferred: true } => {
            if let Err(e) = resolver.resolve().await {
                tracing::warn!(error = %e, "Node environment probe failed");
            }
            match resolver.preferred_node_path(&sources(&configs)) {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    display::print_error(&ResolveError::NotFound.to_string());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::NvmCurrent { dir } => match resolver.nvm_current_for_dir(&dir).await? {
            Some(path) => {
                println!("{}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            None => {
                display::print_error("nvm has no current node for this directory");
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Exec {
            shell,
            cwd,
            timeout,
            command,
        } => {
            let line = if shell {
                CommandLine::Shell(command.join(" "))
            } else {
                CommandLine::Argv(command)
            };
            let mut options = ExecOptions::new();
            if let Some(dir) = cwd {
                options = options.working_dir(dir);
            }
            if let Some(secs) = timeout {
                options = options.timeout(Duration::from_secs(secs));
            }
            tracing::info!(command = %line, "Executing");
            stream(exec_cmd(line, &options, echo_dispatch())?).await
        }
        Commands::Js { cwd, node, source } => {
            let node = resolve_node(&resolver, &configs, node).await?;
            let handle = execjs(&source, Some(&node), &js_options(&cwd), echo_dispatch())?;
            stream(handle).await
        }
        Commands::JsFile {
            cwd,
            node,
            file,
            args,
        } => {
            let node = resolve_node(&resolver, &configs, node).await?;
            let handle = execjsfile(&file, &args, Some(&node), &js_options(&cwd), echo_dispatch())?;
            stream(handle).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Resolution failures were already shown by the notifier.
            if !matches!(e, CliError::Resolve(ResolveError::NotFound | ResolveError::InvalidPath(_))) {
                display::print_error(&e.to_string());
            }
            ExitCode::FAILURE
        }
    }
}
