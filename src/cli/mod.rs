pub mod dates;
pub mod report;
pub mod trackers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use report::{DaysCommand, HistoryCommand, process_days_command, process_history_command};
use tracing::{debug, level_filters::LevelFilter};
use trackers::{
    EditCommand, IncCommand, NewCommand, SetCommand, process_edit_command, process_inc_command,
    process_list_command, process_new_command, process_remove_command, process_set_command,
};

use crate::{
    engine::TrackerEngine,
    period::WeekStart,
    utils::{
        dir::create_application_default_path,
        logging::{CLI_PREFIX, enable_logging},
        settings::Settings,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Ratchet", version, long_about = None)]
#[command(about = "Counters and habits that start over every day, week, month or year", long_about = None)]
pub(crate) struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_DATA_HOME or $HOME/.local/share"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_enum,
        help = "First day of the week. Overrides firstDayOfWeek from settings.json"
    )]
    week_start: Option<WeekStart>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Create a tracker")]
    New {
        #[command(flatten)]
        command: NewCommand,
    },
    #[command(about = "Change the settings of a tracker")]
    Edit {
        #[command(flatten)]
        command: EditCommand,
    },
    #[command(about = "Remove a tracker. Its logged events are kept")]
    Remove { id: String },
    #[command(about = "Show every tracker with its current count")]
    List {},
    #[command(about = "Log a change of a tracker's count")]
    Inc {
        #[command(flatten)]
        command: IncCommand,
    },
    #[command(about = "Set the total of a single day")]
    Set {
        #[command(flatten)]
        command: SetCommand,
    },
    #[command(about = "Show daily totals and goal status")]
    Days {
        #[command(flatten)]
        command: DaysCommand,
    },
    #[command(about = "Show the logged events of a range")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create application directory {dir:?}"))?;
            dir
        }
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let settings = Settings::load(&app_dir).await;
    let week_start = args.week_start.unwrap_or_else(|| settings.week_start());
    let data_folder = settings.resolve_data_folder(&app_dir);
    debug!("Using data folder {data_folder:?}, weeks start on {week_start:?}");
    let engine = TrackerEngine::open_local(&data_folder, week_start);

    match args.commands {
        Commands::New { command } => {
            process_new_command(&engine, &settings.default_increment_buttons, command).await
        }
        Commands::Edit { command } => process_edit_command(&engine, command).await,
        Commands::Remove { id } => process_remove_command(&engine, id).await,
        Commands::List {} => process_list_command(&engine).await,
        Commands::Inc { command } => process_inc_command(&engine, command).await,
        Commands::Set { command } => process_set_command(&engine, command).await,
        Commands::Days { command } => process_days_command(&engine, command).await,
        Commands::History { command } => process_history_command(&engine, command).await,
    }
}
