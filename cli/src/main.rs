use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use routegrid_cli::CliContext;
use routegrid_cli::commands;
use routegrid_cli::logging;
use routegrid_cli::readline;

/// Startup options, parsed once from the process arguments.
#[derive(Parser)]
#[command(version, about = "Interactive driver for the routegrid table engine")]
struct Args {
    /// Table config (TOML). Created with defaults if missing.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Also write logs to routegrid.log in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_dir.as_deref());
    let mut ctx = CliContext::new(args.config.as_deref());

    while let Some(line) = readline()? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &mut ctx).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                writeln!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(version, about = "cli")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Load {
        #[arg(short, long)]
        path: String,
    },
    Show {
        #[arg(long)]
        cells: bool,
    },
    Toggle {
        #[arg(short, long)]
        group: String,
    },
    ExpandAll,
    CollapseAll,
    Filter {
        #[arg(short, long)]
        column: String,
        /// Empty clears the filter.
        #[arg(short, long, default_value = "")]
        value: String,
    },
    Search {
        #[arg(short, long, default_value = "")]
        query: String,
    },
    Sort {
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        desc: bool,
        /// Append to the current sort instead of replacing it.
        #[arg(long)]
        add: bool,
    },
    Scroll {
        #[arg(short, long)]
        row: usize,
    },
    Zoom {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    ZoomReset,
    Stats,
    Header,
    Exit,
}

async fn respond(line: &str, ctx: &mut CliContext) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "routegrid".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Load { path }) => commands::load(path, ctx).await?,
        Some(Commands::Show { cells }) => commands::show(ctx, *cells),
        Some(Commands::Toggle { group }) => commands::toggle(group, ctx)?,
        Some(Commands::ExpandAll) => commands::expand_all(ctx),
        Some(Commands::CollapseAll) => commands::collapse_all(ctx),
        Some(Commands::Filter { column, value }) => commands::filter(column, value, ctx),
        Some(Commands::Search { query }) => commands::search(query, ctx),
        Some(Commands::Sort { key, desc, add }) => commands::sort(key, *desc, *add, ctx),
        Some(Commands::Scroll { row }) => commands::scroll(*row, ctx),
        Some(Commands::Zoom { from, to }) => commands::zoom(from, to, ctx).await?,
        Some(Commands::ZoomReset) => commands::zoom_reset(ctx)?,
        Some(Commands::Stats) => commands::stats(ctx)?,
        Some(Commands::Header) => commands::header(ctx),
        Some(Commands::Exit) => {
            commands::exit(ctx);
            return Ok(true);
        }
        None => {}
    }
    Ok(false)
}
