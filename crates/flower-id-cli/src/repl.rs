//! Interactive REPL: each `/capture` grabs a camera frame and classifies it.
//!
//! Launch with `flower-id repl`. The reference set is loaded once before the
//! prompt appears. Type `/help` for available commands, Tab for completion.

use std::path::Path;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use flower_id::capture::is_supported_format;
use flower_id::{FlowerResult, SnapshotCamera};

use crate::config::AppConfig;
use crate::render::render_outcome;
use crate::session::{CaptureOutcome, ClassifierSession};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/capture", "Classify the current camera frame"),
    ("/classify", "Classify an image file"),
    ("/threshold", "Show or set the rejection threshold"),
    ("/categories", "List reference categories"),
    ("/stats", "Show capture statistics"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// Ranked categories shown under each result.
const REPL_TOP: usize = 3;

/// REPL helper for tab completion.
#[derive(Default)]
struct FlowerHelper;

impl Completer for FlowerHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // image file completion in the working directory
        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        if cmd == "/classify" {
            let mut files = Vec::new();
            if let Ok(entries) = std::fs::read_dir(".") {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if is_supported_format(&path) {
                        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                            files.push(name.to_string());
                        }
                    }
                }
            }
            files.sort();
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = files
                .iter()
                .filter(|f| f.starts_with(args.trim()))
                .map(|f| Pair {
                    display: f.clone(),
                    replacement: format!("{f} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for FlowerHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for FlowerHelper {}
impl Validator for FlowerHelper {}
impl Helper for FlowerHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
struct ReplState {
    session: ClassifierSession,
    camera: Option<SnapshotCamera>,
}

/// Run the interactive REPL.
pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{273f}\x1b[0m \x1b[1mflower-id v{}\x1b[0m \x1b[90m\u{2014} nearest-centroid flower identification\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!("    Loading reference set from {} ...", config.dataset.display());

    let session = ClassifierSession::open(config)?;
    let camera = match &config.camera {
        Some(path) => match SnapshotCamera::open(path) {
            Ok(camera) => Some(camera),
            Err(e) => {
                eprintln!("  \x1b[33m!\x1b[0m {e}");
                eprintln!("    /capture is unavailable; /classify <file> still works.");
                None
            }
        },
        None => None,
    };

    eprintln!(
        "    Ready: {} categories. Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit.",
        session.centroids().len()
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<FlowerHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(FlowerHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".flower_id_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState { session, camera };
    let prompt = " \x1b[35mflower>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "capture" | "c" => cmd_capture(&mut state),
                    "classify" => cmd_classify(args, &mut state),
                    "threshold" => cmd_threshold(args, &mut state),
                    "categories" => cmd_categories(&state),
                    "stats" => cmd_stats(&state),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands and image files for /classify.");
    eprintln!();
}

fn print_outcome(outcome: FlowerResult<CaptureOutcome>) {
    match outcome {
        Ok(outcome) => {
            eprintln!();
            for line in render_outcome(&outcome, REPL_TOP).lines() {
                eprintln!("  {line}");
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Capture failed: {e}"),
    }
}

fn cmd_capture(state: &mut ReplState) {
    match state.camera.as_mut() {
        Some(camera) => print_outcome(state.session.capture_and_classify(camera)),
        None => eprintln!("  No camera configured. Use --camera <snapshot file> or /classify <file>."),
    }
}

fn cmd_classify(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /classify <image file>");
        return;
    }
    let outcome = if args.starts_with("data:") {
        state.session.classify_data_url(args)
    } else {
        state.session.classify_file(Path::new(args))
    };
    print_outcome(outcome);
}

fn cmd_threshold(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Rejection threshold: {:.1}", state.session.threshold());
        return;
    }
    match args.parse::<f64>() {
        Ok(value) => match state.session.set_threshold(value) {
            Ok(()) => eprintln!("  Rejection threshold set to {value:.1}"),
            Err(e) => eprintln!("  {e}"),
        },
        Err(_) => eprintln!("  Usage: /threshold <0-100>"),
    }
}

fn cmd_categories(state: &ReplState) {
    let centroids = state.session.centroids();
    eprintln!();
    eprintln!(
        "  {} categories ({} dims, extractor '{}'):",
        centroids.len(),
        centroids.dim().unwrap_or(0),
        state.session.extractor_name()
    );
    for (category, centroid) in centroids.iter() {
        eprintln!("    {:<14} {} samples", category.as_str(), centroid.samples);
    }
    eprintln!();
}

fn cmd_stats(state: &ReplState) {
    let stats = state.session.stats();
    eprintln!();
    eprintln!("  Captures:   {}", stats.total());
    eprintln!("    Identified: {}", stats.identified);
    eprintln!("    Rejected:   {}", stats.rejected);
    eprintln!("    Failed:     {}", stats.failed);
    eprintln!();
}
