use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use routine_core::time::{format_clock, parse_clock_time};
use routine_core::{
    stats, Category, DaySetup, IdGenerator, Priority, RoutineKernel, ScheduledTask, SystemClock,
    TaskEdit,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod notify;
mod setup;
mod state;
mod watch;

use crate::config::{init_config, load_config};
use crate::setup::{run_setup, SetupArgs};
use crate::state::{ensure_routine_home, JsonFileStore};
use crate::watch::run_watch;

#[derive(Parser, Debug)]
#[command(
    name = "routine",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ROUTINE_BUILD_SHA"), ")"),
    about = "Plan your day, track tasks, get reminded"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Duration mode: fit sleep, work and your tasks into today
    Setup {
        /// Sleep length (default from config)
        #[arg(long)]
        sleep: Option<String>,

        /// Work length (default from config)
        #[arg(long)]
        work: Option<String>,

        /// Extra fixed block, placed after sleep and work: TITLE=DURATION
        #[arg(long = "commitment")]
        commitments: Vec<String>,

        /// A task to fit into free time: TITLE=DURATION (repeatable)
        #[arg(long = "task")]
        tasks: Vec<String>,

        /// Prompt for lengths and tasks
        #[arg(short, long, default_value_t = false)]
        interactive: bool,

        /// Print the schedule without saving it
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Clock mode: add a task with explicit local times
    Add {
        #[arg(long)]
        title: String,

        /// Local start, HH:MM
        #[arg(long)]
        start: String,

        /// Local end, HH:MM (at or before start means past midnight)
        #[arg(long)]
        end: String,

        #[arg(long, default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show today's tasks and their live state
    List {
        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Change a task; moves that would overlap another task are rejected
    Edit {
        /// Task id or unique id prefix
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        priority: Option<Priority>,

        /// Category id; pass an empty string to clear
        #[arg(long)]
        category: Option<String>,
    },

    /// Flip a task between pending and completed
    Toggle { id: String },

    /// Mark several tasks completed
    Complete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove a task
    Delete { id: String },

    /// Move a task to a new position in the list (0-based)
    Reorder { id: String, index: usize },

    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },

    /// Completion statistics
    Stats {
        /// Days of history to chart
        #[arg(long, default_value_t = 7)]
        days: usize,
    },

    /// Stay running and send reminders for today's tasks
    Watch,

    /// Config file helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Add {
        name: String,

        /// Stable id (default: derived from the name)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default ~/.routine/config.toml if none exists
    Init,
    /// Print the effective config
    Show,
}

struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("routine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let home = ensure_routine_home()?;
    let cfg = load_config(&home)?;
    let tz = cfg.tz()?;

    if let Command::Config { command } = &cli.command {
        return match command {
            ConfigCommand::Init => init_config(&home),
            ConfigCommand::Show => {
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
                Ok(())
            }
        };
    }

    let store = JsonFileStore::new(&home);
    let mut kernel = RoutineKernel::open(store, Arc::new(SystemClock))?;

    match cli.command {
        Command::Setup {
            sleep,
            work,
            commitments,
            tasks,
            interactive,
            dry_run,
        } => {
            let args = SetupArgs {
                sleep_minutes: minutes_or(sleep, cfg.schedule.sleep_minutes)?,
                work_minutes: minutes_or(work, cfg.schedule.work_minutes)?,
                commitments,
                tasks,
                interactive,
                dry_run,
            };
            run_setup(&mut kernel, &UuidIds, tz, args)?;
        }

        Command::Add {
            title,
            start,
            end,
            priority,
            category,
        } => {
            let setup = DaySetup::for_today(kernel.now(), tz);
            let interval = setup.clock_interval(parse_clock_time(&start)?, parse_clock_time(&end)?)?;
            let task = ScheduledTask::new(UuidIds.next_id(), title, interval, kernel.now())
                .with_priority(priority)
                .with_category(category);
            let added = kernel.add(task)?;
            println!("Added {} ({})", added.title, short_id(&added.id));
        }

        Command::List { json } => list(&kernel, tz, json)?,

        Command::Edit {
            id,
            title,
            start,
            end,
            priority,
            category,
        } => {
            let id = resolve_id(&kernel, &id)?;
            let current = kernel
                .book()
                .read()
                .get(&id)
                .cloned()
                .with_context(|| format!("task {id} vanished"))?;
            let interval = match (start, end) {
                (None, None) => None,
                (s, e) => {
                    let setup = DaySetup::for_today(current.start, tz);
                    let start = match s {
                        Some(s) => parse_clock_time(&s)?,
                        None => current.start.with_timezone(&tz).time(),
                    };
                    let end = match e {
                        Some(e) => parse_clock_time(&e)?,
                        None => current.end.with_timezone(&tz).time(),
                    };
                    Some(setup.clock_interval(start, end)?)
                }
            };
            let edit = TaskEdit {
                title,
                interval,
                priority,
                category_id: category.map(|c| if c.is_empty() { None } else { Some(c) }),
            };
            if edit.is_empty() {
                bail!("nothing to change (pass --title, --start, --end, --priority or --category)");
            }
            let edited = kernel.edit(&id, edit)?;
            println!(
                "Updated {}: {} - {}  {}",
                short_id(&edited.id),
                format_clock(edited.start, tz),
                format_clock(edited.end, tz),
                edited.title
            );
        }

        Command::Toggle { id } => {
            let id = resolve_id(&kernel, &id)?;
            let t = kernel.toggle(&id)?;
            println!("{} is now {:?}", t.task.title, t.task.status);
        }

        Command::Complete { ids } => {
            let ids = ids
                .iter()
                .map(|q| resolve_id(&kernel, q))
                .collect::<Result<Vec<_>>>()?;
            let done = kernel.complete_many(&ids)?;
            let newly = done.iter().filter(|t| t.recorded.is_some()).count();
            println!("Completed {} tasks ({} newly recorded)", done.len(), newly);
        }

        Command::Delete { id } => {
            let id = resolve_id(&kernel, &id)?;
            let removed = kernel.delete(&id)?;
            println!("Deleted {}", removed.title);
        }

        Command::Reorder { id, index } => {
            let id = resolve_id(&kernel, &id)?;
            kernel.reorder(&id, index)?;
            list(&kernel, tz, false)?;
        }

        Command::Category { command } => match command {
            CategoryCommand::Add { name, id, color } => {
                let id = id.unwrap_or_else(|| slug(&name));
                let mut category = Category::new(id, name);
                category.color = color;
                kernel.add_category(category)?;
                println!("Saved {} categories", kernel.categories().len());
            }
            CategoryCommand::List => {
                for c in kernel.categories() {
                    println!("{}  {}  {}", c.id, c.name, c.color.as_deref().unwrap_or("-"));
                }
            }
        },

        Command::Stats { days } => {
            let s = stats::compute(&kernel.tasks(), &kernel.history(), kernel.now(), tz, days);
            println!("# Stats\n");
            println!(
                "Today: {}/{} done ({:.0}%)",
                s.today_completed,
                s.today_total,
                s.completion_rate * 100.0
            );
            println!("Streak: {} days", s.streak_days);
            println!("All-time completions: {}\n", s.total_completed);
            for (day, n) in &s.per_day {
                println!("{}  {:<3} {}", day, n, "#".repeat(*n));
            }
            if !s.per_category.is_empty() {
                println!("\nBy category:");
                for (cat, n) in &s.per_category {
                    let name = kernel.category_name(cat).unwrap_or(cat.as_str());
                    println!("- {name}: {n}");
                }
            }
        }

        Command::Watch => run_watch(&mut kernel, &cfg, tz).await?,

        Command::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn list(kernel: &RoutineKernel<JsonFileStore>, tz: Tz, json: bool) -> Result<()> {
    let now = kernel.now();
    let book = kernel.book().read();
    if json {
        println!("{}", serde_json::to_string_pretty(book.tasks())?);
        return Ok(());
    }
    if book.is_empty() {
        println!("No tasks. Run: routine setup --task \"Study=90\"");
        return Ok(());
    }
    for (t, view) in book.views(now) {
        let category = t
            .category_id
            .as_deref()
            .map(|c| kernel.category_name(c).unwrap_or(c))
            .unwrap_or("-");
        println!(
            "{:>2}. {}  {} - {}  {:<12} {:<7} {:<12} {}",
            t.order,
            short_id(&t.id),
            format_clock(t.start, tz),
            format_clock(t.end, tz),
            view.to_string(),
            format!("{:?}", t.priority).to_lowercase(),
            category,
            t.title
        );
    }
    Ok(())
}

fn minutes_or(arg: Option<String>, default: i64) -> Result<i64> {
    match arg {
        Some(s) => setup::parse_minutes(&s),
        None => Ok(default),
    }
}

/// Exact id, or a prefix matching exactly one task.
fn resolve_id(kernel: &RoutineKernel<JsonFileStore>, query: &str) -> Result<String> {
    let book = kernel.book().read();
    if book.get(query).is_some() {
        return Ok(query.to_string());
    }
    let matches: Vec<&str> = book
        .tasks()
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| id.starts_with(query))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.to_string()),
        [] => bail!("no task matches '{query}'"),
        _ => bail!("'{query}' matches {} tasks; use a longer prefix", matches.len()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
