use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "taskpilot-cli", version, about = "Taskpilot CLI")]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score ad-hoc inputs
    Score(commands::score::ScoreArgs),
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Inspect personalization models
    Models {
        #[command(subcommand)]
        action: commands::models::ModelsAction,
    },
    /// Rescore open tasks as deadlines approach
    Recalc(commands::recalc::RecalcArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

/// Log to stderr so stdout stays machine-readable.
///
/// `TASKPILOT_LOG` wins over `RUST_LOG`; `-v` flags only apply when
/// neither is set.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "taskpilot=info",
        1 => "taskpilot=debug",
        _ => "taskpilot=trace",
    };
    let filter = EnvFilter::try_from_env("TASKPILOT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Score(args) => commands::score::run(args),
        Commands::Task { action } => commands::task::run(action),
        Commands::Models { action } => commands::models::run(action),
        Commands::Recalc(args) => commands::recalc::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "taskpilot-cli", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
