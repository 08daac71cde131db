use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use autoexec::{
    commands,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "autoexec")]
#[command(about = "AutoExec script manager - choose which scripts run when your executor attaches")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Use a different settings file
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List scripts of the current profile and whether they are active
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the current profile and its folders
    Current,

    /// Switch to a profile (wave, zenith, awp)
    Use {
        /// Name of the profile to switch to
        profile: String,
    },

    /// Switch to the next profile
    Next,

    /// Choose the scripts folder of the current profile
    SetFolder {
        /// Folder holding your .luau scripts
        dir: PathBuf,
    },

    /// Activate scripts (copy them into the AutoExec folder)
    On {
        /// Script names, with or without .luau
        #[arg(required = true)]
        scripts: Vec<String>,
    },

    /// Deactivate scripts (remove them from the AutoExec folder)
    Off {
        /// Script names, with or without .luau
        #[arg(required = true)]
        scripts: Vec<String>,
    },

    /// Pick active scripts interactively
    Toggle,

    /// Watch both folders and reprint the list on changes
    Watch {
        /// Stop after this many seconds
        #[arg(long = "for", value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Run diagnostics on the autoexec setup
    Doctor,

    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: u8) -> Result<()> {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let layer = fmt::layer().compact().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::registry().with(layer).with(filter).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut paths = Paths::new()?;
    if let Some(settings) = cli.settings {
        paths = paths.with_settings_file(settings);
    }
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::List { json } => commands::list(&paths, json, &ui),
        Commands::Current => commands::current(&paths, &ui),
        Commands::Use { profile } => commands::use_profile(&paths, &profile, &ui),
        Commands::Next => commands::next(&paths, &ui),
        Commands::SetFolder { dir } => commands::set_folder(&paths, &dir, &ui),
        Commands::On { scripts } => commands::set_scripts(&paths, &scripts, true, &ui),
        Commands::Off { scripts } => commands::set_scripts(&paths, &scripts, false, &ui),
        Commands::Toggle => commands::toggle(&paths, &ui),
        Commands::Watch { duration } => {
            commands::watch(&paths, duration.map(Duration::from_secs), &ui)
        }
        Commands::Doctor => commands::doctor(&paths, &ui),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
