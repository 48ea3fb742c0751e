mod commands;
mod config;
mod gemini;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    MealInput, Session, cmd_exercise_rm, cmd_exercise_toggle, cmd_meal_add, cmd_meal_copy_day,
    cmd_meal_edit, cmd_meal_rm, cmd_meal_toggle, cmd_profile, cmd_shop_generate, cmd_shop_show,
    cmd_shop_toggle, cmd_today, cmd_water_add, cmd_water_rm, cmd_week, cmd_weight_history,
    cmd_weight_log, cmd_weight_rm,
};
use crate::config::Config;
use nutri_core::debug_log::DebugLog;
use nutri_core::service::NutriService;
use nutri_core::store::SqliteStateStore;

const LOG_ENV: &str = "NUTRI_LOG";

#[derive(Parser)]
#[command(
    name = "nutri",
    version,
    about = "A household meal planner and nutrition tracker",
    long_about = "Plan the week's meals per person, track calories, water, exercise and weight, \
                  and build shopping lists. Calories and shopping lists can be filled in by Gemini."
)]
struct Cli {
    /// Household member to act as (default: first configured user)
    #[arg(short, long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan, edit and check off meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Show the weekly meal grid (defaults to the current week)
    Week {
        /// Week number (1 = week of 2026-01-05)
        week: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a day's meals, calories, water and exercise (defaults to today)
    Today {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track water intake
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Track exercise days
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Weekly shopping lists
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Show weight, exercise and water history
    Profile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Plan a meal
    Add {
        /// Food description
        food: String,
        /// Quantity (e.g. "150g", "1 prato")
        #[arg(short, long, default_value = "")]
        amount: String,
        /// Meal: breakfast, lunch, snack, dinner, late-snack (or the Portuguese label)
        #[arg(short, long, default_value = "snack")]
        category: String,
        /// Week number (default: current week)
        #[arg(short, long)]
        week: Option<u32>,
        /// Day index, 0 = Monday .. 4 = Friday (default: today)
        #[arg(short, long)]
        day: Option<u8>,
        /// Calories; estimated by Gemini when omitted or 0
        #[arg(long)]
        calories: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a planned meal
    Edit {
        /// Meal ID (or a unique prefix)
        id: String,
        /// New food description
        #[arg(long)]
        food: Option<String>,
        /// New quantity
        #[arg(short, long)]
        amount: Option<String>,
        /// New meal category
        #[arg(short, long)]
        category: Option<String>,
        /// Move to week
        #[arg(short, long)]
        week: Option<u32>,
        /// Move to day (0-4)
        #[arg(short, long)]
        day: Option<u8>,
        /// New calories
        #[arg(long)]
        calories: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal
    Rm {
        /// Meal ID (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a meal as eaten / not eaten
    Toggle {
        /// Meal ID (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the previous day's menu into a day (Monday copies last Friday)
    CopyDay {
        /// Target week (default: current week)
        #[arg(short, long)]
        week: Option<u32>,
        /// Target day, 0-4 (default: today)
        #[arg(short, long)]
        day: Option<u8>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Add water (negative to correct)
    Add {
        /// Amount in ml
        #[arg(allow_negative_numbers = true)]
        ml: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a day's water
    Rm {
        /// Date (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// Mark / unmark a day as exercised
    Toggle {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a day's exercise record
    Rm {
        /// Date (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry (replaces the day's earlier value)
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a day's weight entry
    Rm {
        /// Date (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Generate the week's list from its meals with Gemini (replaces the list)
    Generate {
        /// Week number (default: current week)
        #[arg(short, long)]
        week: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the week's list
    Show {
        /// Week number (default: current week)
        #[arg(short, long)]
        week: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as bought / not bought
    Toggle {
        /// Item ID (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let serving = matches!(cli.command, Commands::Serve { .. });
    init_tracing(if serving { "info" } else { "warn" });

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let debug_log = Arc::new(DebugLog::default());
    let store = SqliteStateStore::open(&config.db_path)?;
    let svc = NutriService::new(
        Box::new(store),
        config.household.clone(),
        config.timezone,
        debug_log.clone(),
    )?;

    let mut s = Session::new(svc, cli.user.as_deref(), &config, rt.handle().clone())?;

    match cli.command {
        Commands::Meal { command } => match command {
            MealCommands::Add {
                food,
                amount,
                category,
                week,
                day,
                calories,
                json,
            } => cmd_meal_add(
                &mut s,
                MealInput {
                    food: Some(food),
                    amount: Some(amount),
                    category: Some(category),
                    week,
                    day,
                    calories,
                },
                json,
            ),
            MealCommands::Edit {
                id,
                food,
                amount,
                category,
                week,
                day,
                calories,
                json,
            } => cmd_meal_edit(
                &mut s,
                &id,
                MealInput {
                    food,
                    amount,
                    category,
                    week,
                    day,
                    calories,
                },
                json,
            ),
            MealCommands::Rm { id, json } => cmd_meal_rm(&mut s, &id, json),
            MealCommands::Toggle { id, json } => cmd_meal_toggle(&mut s, &id, json),
            MealCommands::CopyDay { week, day, json } => cmd_meal_copy_day(&mut s, week, day, json),
        },
        Commands::Week { week, json } => cmd_week(&mut s, week, json),
        Commands::Today { date, json } => cmd_today(&mut s, date, json),
        Commands::Water { command } => match command {
            WaterCommands::Add { ml, date, json } => cmd_water_add(&mut s, ml, date, json),
            WaterCommands::Rm { date, json } => cmd_water_rm(&mut s, date, json),
        },
        Commands::Exercise { command } => match command {
            ExerciseCommands::Toggle { date, json } => cmd_exercise_toggle(&mut s, date, json),
            ExerciseCommands::Rm { date, json } => cmd_exercise_rm(&mut s, date, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                json,
            } => cmd_weight_log(&mut s, value, &unit, date, json),
            WeightCommands::History { json } => cmd_weight_history(&mut s, json),
            WeightCommands::Rm { date, json } => cmd_weight_rm(&mut s, date, json),
        },
        Commands::Shop { command } => match command {
            ShopCommands::Generate { week, json } => cmd_shop_generate(&mut s, week, json),
            ShopCommands::Show { week, json } => cmd_shop_show(&mut s, week, json),
            ShopCommands::Toggle { id, json } => cmd_shop_toggle(&mut s, &id, json),
        },
        Commands::Profile { json } => cmd_profile(&mut s, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => serve(&config, &rt, s.svc, debug_log, port, bind, no_auth),
    }
}

fn serve(
    config: &Config,
    rt: &tokio::runtime::Runtime,
    svc: NutriService,
    debug_log: Arc<DebugLog>,
    port: u16,
    bind: String,
    no_auth: bool,
) -> Result<()> {
    let (api_key, new_api_key) = if no_auth {
        (None, false)
    } else {
        let (key, new) = config.load_or_create_server_key()?;
        (Some(key), new)
    };
    let advisor = match config.require_api_key() {
        Ok(key) => Some(Arc::new(gemini::GeminiClient::new(
            &config.ai,
            key,
            rt.handle().clone(),
        )?)),
        Err(e) => {
            tracing::warn!("{e}; meals saved without calories will get 0");
            None
        }
    };
    let opts = server::ServerOptions {
        port,
        bind,
        api_key,
        new_api_key,
    };
    rt.block_on(server::start_server(svc, advisor, debug_log, opts))
}
