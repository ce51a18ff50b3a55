#![forbid(unsafe_code)]

mod cmd;
mod output;
mod script;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wpe: replay work package editing sessions",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode from `--json`, `FORMAT` and the user config.
    fn output_mode(&self) -> OutputMode {
        let user_output = wpedit_core::config::load_user_config()
            .ok()
            .and_then(|config| config.output);
        let env_format = env::var("FORMAT").ok();
        let resolved = wpedit_core::config::resolve_output(
            self.json,
            user_output.as_deref(),
            env_format.as_deref(),
        );
        OutputMode::from_resolved(&resolved)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Replay a scripted editing session",
        long_about = "Load the fixtures of a replay script into an in-memory API and run its \
                      steps through the editing service, printing what every step did.",
        after_help = "EXAMPLES:\n    # Replay a session\n    wpe replay session.json\n\n    # Fail when any step fails\n    wpe replay session.json --strict --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Show the effective configuration",
        after_help = "EXAMPLES:\n    wpe config\n    wpe config --json"
    )]
    Config,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("WPEDIT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "wpedit=debug,wpe=debug,info"
        } else {
            "wpedit=info,wpe=info,warn"
        })
    });

    let format = env::var("WPEDIT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = std::env::current_dir()?;
    let output = cli.output_mode();
    debug!(?output, root = %root.display(), "starting");

    match cli.command {
        Commands::Replay(ref args) => cmd::replay::run_replay(args, &root, output).await,
        Commands::Config => cmd::config::run_config(&root, output),
    }
}
