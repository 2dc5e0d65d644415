use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use workout_core::host::{find_workout_blocks, read_block_in_text, replace_block_in_text};
use workout_core::*;

#[derive(Parser)]
#[command(name = "wkt")]
#[command(about = "Run workouts written as markdown checklists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a workout block
    Show {
        file: PathBuf,

        /// Which workout block in the file (0-based)
        #[arg(long, default_value_t = 0)]
        block: usize,

        /// Print the parsed workout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite every workout block in canonical form
    Fmt {
        file: PathBuf,

        /// Only report; exit with status 1 if anything would change
        #[arg(long)]
        check: bool,
    },

    /// Add the sample workout to a file
    Sample { file: PathBuf },

    /// Run a workout block
    Run {
        file: PathBuf,

        #[arg(long, default_value_t = 0)]
        block: usize,

        /// Comma-separated actions to apply instead of prompting
        /// (start, finish, skip, set, rest, pause, resume, done,
        /// edit:<index>:<key>:<value>)
        #[arg(long)]
        script: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        workout_core::logging::init_with_level("debug");
    } else {
        workout_core::logging::init_with_level("warn");
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Show { file, block, json } => cmd_show(&file, block, json, &config),
        Commands::Fmt { file, check } => cmd_fmt(&file, check, &config),
        Commands::Sample { file } => cmd_sample(&file, &config),
        Commands::Run {
            file,
            block,
            script,
        } => cmd_run(&file, block, script.as_deref(), &config),
    }
}

fn select_block(file: &MarkdownFile, index: usize) -> Result<BlockLocation> {
    let blocks = file.blocks()?;
    if blocks.is_empty() {
        return Err(Error::Host(format!("{} has no workout blocks", file.source())));
    }
    blocks
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::BlockNotFound(format!("block {} in {}", index, file.source())))
}

fn cmd_show(path: &Path, block: usize, json: bool, config: &Config) -> Result<()> {
    let file = MarkdownFile::new(path, config.document.fence.clone());
    let location = select_block(&file, block)?;
    let workout = parse_workout(&file.read_block(&location)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        display_workout(&workout, None);
    }
    Ok(())
}

fn cmd_fmt(path: &Path, check: bool, config: &Config) -> Result<()> {
    let fence = &config.document.fence;
    let file = MarkdownFile::new(path, fence.clone());
    let original = file.read_text()?;

    // Back to front so earlier block locations stay valid
    let mut text = original.clone();
    let mut changed = 0;
    for location in find_workout_blocks(&file.source(), &original, fence)
        .into_iter()
        .rev()
    {
        let inner = read_block_in_text(&text, &location, fence)?;
        if inner.trim().is_empty() {
            continue;
        }
        let workout = parse_workout(&inner);
        let canonical = serialize_workout(&workout);
        if canonical != inner {
            let (updated, _) = replace_block_in_text(
                &text,
                &location,
                fence,
                workout.metadata.title.as_deref(),
                &canonical,
            )?;
            text = updated;
            changed += 1;
        }
    }

    if changed == 0 {
        println!("✓ All workout blocks are formatted");
        return Ok(());
    }

    if check {
        println!("{} workout block(s) need formatting", changed);
        std::process::exit(1);
    }

    file.write_text(&text)?;
    println!("✓ Formatted {} workout block(s)", changed);
    Ok(())
}

fn cmd_sample(path: &Path, config: &Config) -> Result<()> {
    let fence = &config.document.fence;
    if !path.exists() {
        std::fs::write(path, "")?;
    }

    let file = MarkdownFile::new(path, fence.clone());
    let text = file.read_text()?;
    let empty_block = find_workout_blocks(&file.source(), &text, fence)
        .into_iter()
        .find(|location| {
            read_block_in_text(&text, location, fence)
                .map(|inner| {
                    let workout = parse_workout(&inner);
                    workout.exercises.is_empty() && workout.metadata.title.is_none()
                })
                .unwrap_or(false)
        });

    match empty_block {
        Some(location) => {
            let mut session = WorkoutSession::open(file, location, TimerEngine::system())?;
            session.add_sample();
        }
        None => {
            let mut out = text;
            if !out.is_empty() {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(&format!(
                "```{}\n{}\n```\n",
                fence,
                serialize_workout(&create_sample_workout())
            ));
            file.write_text(&out)?;
        }
    }

    println!("✓ Added sample workout to {}", path.display());
    Ok(())
}

fn cmd_run(path: &Path, block: usize, script: Option<&str>, config: &Config) -> Result<()> {
    let file = MarkdownFile::new(path, config.document.fence.clone());
    let location = select_block(&file, block)?;
    let timers = TimerEngine::system().with_tick_interval(config.timer.tick_interval());
    let mut session = WorkoutSession::open_with_config(file, location, timers.clone(), config)?;

    match script {
        Some(script) => {
            let actions = script
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Action::parse)
                .collect::<Result<Vec<_>>>()?;

            for action in actions {
                tracing::debug!("Applying {:?}", action);
                apply_action(session.render_context(), action);
            }
            session.flush_pending_edits();

            let ctx = session.render_context();
            display_workout(&ctx.workout, ctx.timer.as_ref());
        }
        None => loop {
            timers.poll();
            let ctx = session.render_context();
            display_workout(&ctx.workout, ctx.timer.as_ref());

            if ctx.workout.metadata.state == WorkoutState::Completed {
                println!("✓ Workout complete!");
                break;
            }

            let Some(input) = prompt_user_action()? else {
                ctx.callbacks.flush_pending_edits();
                break;
            };
            let action = match input.as_str() {
                "" if ctx.workout.metadata.state == WorkoutState::Planned => Action::Start,
                "" => Action::Finish,
                other => match Action::parse(other) {
                    Ok(action) => action,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                },
            };
            apply_action(ctx, action);
        },
    }

    timers.destroy();
    Ok(())
}

#[derive(Debug)]
enum Action {
    Start,
    Finish,
    Skip,
    AddSet,
    AddRest,
    Pause,
    Resume,
    Done,
    Edit {
        index: usize,
        key: String,
        value: String,
    },
}

impl Action {
    fn parse(input: &str) -> Result<Self> {
        let action = match input.trim().to_lowercase().as_str() {
            "start" => Action::Start,
            "f" | "finish" => Action::Finish,
            "s" | "skip" => Action::Skip,
            "+" | "set" => Action::AddSet,
            "r" | "rest" => Action::AddRest,
            "p" | "pause" => Action::Pause,
            "u" | "resume" => Action::Resume,
            "d" | "done" => Action::Done,
            lowered if lowered.starts_with("edit:") => {
                // keep the original case of key and value
                let mut parts = input.trim().splitn(4, ':').skip(1);
                let (Some(index), Some(key), Some(value)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(Error::Other(format!(
                        "Expected edit:<index>:<key>:<value>, got {:?}",
                        input
                    )));
                };
                let index = index
                    .trim()
                    .parse()
                    .map_err(|_| Error::Other(format!("Invalid exercise index {:?}", index)))?;
                Action::Edit {
                    index,
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                }
            }
            _ => return Err(Error::Other(format!("Unknown action: {:?}", input))),
        };
        Ok(action)
    }
}

fn apply_action(ctx: RenderContext<'_>, action: Action) {
    let RenderContext {
        workout, callbacks, ..
    } = ctx;
    let active = workout.active_exercise_index();

    match (action, active) {
        (Action::Start, _) => callbacks.start_workout(),
        (Action::Done, _) => callbacks.finish_workout(),
        (Action::Pause, _) => callbacks.pause_exercise(),
        (Action::Resume, _) => callbacks.resume_exercise(),
        (Action::Edit { index, key, value }, _) => {
            callbacks.change_param(index, &key, &value);
            callbacks.flush_pending_edits();
        }
        (Action::Finish, Some(i)) => callbacks.finish_exercise(i),
        (Action::Skip, Some(i)) => callbacks.skip_exercise(i),
        (Action::AddSet, Some(i)) => callbacks.add_set(i),
        (Action::AddRest, Some(i)) => callbacks.add_rest(i),
        (action, None) => println!("No exercise in progress, ignoring {:?}", action),
    }
}

fn format_param(param: &ExerciseParam) -> String {
    let mut out = if param.editable {
        format!("{}: [{}]", param.key, param.value)
    } else {
        format!("{}: {}", param.key, param.value)
    };
    if let Some(unit) = &param.unit {
        out.push(' ');
        out.push_str(unit);
    }
    out.trim_end().to_string()
}

fn display_workout(workout: &ParsedWorkout, timer: Option<&TimerState>) {
    let title = workout.metadata.title.as_deref().unwrap_or("Untitled workout");
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}  [{}]", title, workout.metadata.state.as_str());
    println!("╰─────────────────────────────────────────╯");

    if let Some(start) = &workout.metadata.start_date {
        println!("  Started: {}", start);
    }
    if let Some(duration) = &workout.metadata.duration {
        println!("  Duration: {}", duration);
    }
    println!();

    if workout.exercises.is_empty() {
        println!("  (no exercises)");
    }
    for exercise in &workout.exercises {
        let marker = match exercise.state {
            ExerciseState::Pending => " ",
            ExerciseState::InProgress => "▶",
            ExerciseState::Completed => "✓",
            ExerciseState::Skipped => "↷",
        };
        let params: Vec<String> = exercise.display_params().map(format_param).collect();
        let duration = match (&exercise.recorded_duration, exercise.target_duration) {
            (Some(recorded), _) => format!("  ({})", recorded),
            (None, Some(target)) => format!("  ⏲ {}", format_duration(target)),
            (None, None) => String::new(),
        };
        if params.is_empty() {
            println!("  {} {}{}", marker, exercise.name, duration);
        } else {
            println!(
                "  {} {}  {}{}",
                marker,
                exercise.name,
                params.join(" · "),
                duration
            );
        }
    }

    if let Some(timer) = timer {
        println!();
        let mut line = format!(
            "  ⏱  Workout {} · Exercise {}",
            format_duration(timer.workout_elapsed),
            format_duration(timer.exercise_elapsed)
        );
        if let Some(remaining) = timer.remaining {
            line.push_str(&format!(" · Remaining {}", format_signed_duration(remaining)));
            if timer.is_overtime {
                line.push_str(" (overtime)");
            }
        }
        if timer.is_paused {
            line.push_str(" [paused]");
        }
        println!("{}", line);
    }
    println!();
}

/// Read one action from stdin; `None` on quit or end of input
fn prompt_user_action() -> Result<Option<String>> {
    println!("─────────────────────────────────────────");
    println!("Press Enter to start / finish the current exercise");
    println!("  's' skip · '+' add set · 'r' add rest");
    println!("  'p' pause · 'u' resume · 'd' finish workout");
    println!("  'edit:<index>:<key>:<value>' to change a field · 'q' quit");
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }

    let input = input.trim().to_string();
    if input.eq_ignore_ascii_case("q") {
        return Ok(None);
    }
    Ok(Some(input))
}
