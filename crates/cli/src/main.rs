// zoopeek CLI - templated read-only queries against zoo snapshots

mod exit_codes;
mod request;
mod trace;
mod tui;

use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use exit_codes::{
    macro_exit_code, EXIT_ERROR, EXIT_INTERNAL, EXIT_QUERY, EXIT_STORAGE, EXIT_SUCCESS,
    EXIT_TERMINAL, EXIT_USAGE,
};
use request::{format_internal_error, handle_query, QueryOptions, Reply, RequestError};
use zoopeek_config::Settings;
use zoopeek_io::{ChannelRegistry, SnapshotLayout, UserId};
use zoopeek_macros::MacroContext;

#[derive(Parser)]
#[command(name = "zpk")]
#[command(about = "Run templated, read-only SQL against a zoo snapshot")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/zoopeek/settings.json)
    #[arg(long, global = true, env = "ZOOPEEK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a query template and run it on the user's snapshot
    #[command(after_help = "\
Examples:
  zpk query 'SELECT * FROM animals WHERE owner = ME' --user 42 --name alice
  zpk query --db zoo.sqlite --plain 'SELECT name FROM animals'
  echo 'SELECT SCORE' | zpk query - --user 42")]
    Query {
        /// Query text (use - to read stdin)
        sql: String,

        /// User identity the snapshot is chosen by
        #[arg(long, short = 'u', env = "ZOOPEEK_USER", default_value = "local")]
        user: String,

        /// Display name substituted into the macro context (default: the user id)
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Shared snapshot database (overrides storage.database)
        #[arg(long, conflicts_with = "per_user_dir")]
        db: Option<PathBuf>,

        /// Directory of per-user snapshots <dir>/<user>.sqlite (overrides storage.perUserDir)
        #[arg(long)]
        per_user_dir: Option<PathBuf>,

        /// Macro context template file (overrides macros.contextFile)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Echo the expanded query instead of the original text
        #[arg(long)]
        show_expanded: bool,

        /// Print one render and exit instead of opening the pager
        #[arg(long)]
        plain: bool,

        /// Print the whole result as JSON
        #[arg(long, conflicts_with = "plain")]
        json: bool,

        /// Rows per page (default: pager.defaultPageSize)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Expand a template and print the result without running it
    #[command(after_help = "\
Examples:
  zpk expand 'SELECT ME'
  zpk expand --no-context '#define X 1
SELECT X'")]
    Expand {
        /// Template text (use - to read stdin)
        text: String,

        /// Display name substituted into the macro context
        #[arg(long, short = 'n', default_value = "local")]
        name: String,

        /// Macro context template file (overrides macros.contextFile)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Expand the text alone, without the macro context
        #[arg(long, conflicts_with = "context")]
        no_context: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();
    trace::install_panic_hook();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let result = match cli.command {
        Commands::Query {
            sql,
            user,
            name,
            db,
            per_user_dir,
            context,
            show_expanded,
            plain,
            json,
            page_size,
        } => cmd_query(
            &settings,
            QueryArgs {
                sql,
                user,
                name,
                db,
                per_user_dir,
                context,
                show_expanded,
                plain,
                json,
                page_size,
            },
        ),
        Commands::Expand { text, name, context, no_context } => {
            cmd_expand(&settings, text, name, context, no_context)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Exit quietly with `code`; whatever the user needs was already printed.
    pub fn silent(code: u8) -> Self {
        Self::new(code, "")
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// query
// ============================================================================

struct QueryArgs {
    sql: String,
    user: String,
    name: Option<String>,
    db: Option<PathBuf>,
    per_user_dir: Option<PathBuf>,
    context: Option<PathBuf>,
    show_expanded: bool,
    plain: bool,
    json: bool,
    page_size: Option<usize>,
}

fn cmd_query(settings: &Settings, args: QueryArgs) -> Result<(), CliError> {
    let query = read_text_arg(args.sql)?;
    let layout = snapshot_layout(settings, args.db, args.per_user_dir)?;
    let context = load_context(settings, args.context.as_deref())?;

    let page_size = args.page_size.unwrap_or(settings.default_page_size);
    let page_size = NonZeroUsize::new(page_size)
        .ok_or_else(|| CliError::usage("--page-size must be positive"))?;
    let opts = QueryOptions {
        budget: settings.max_len,
        show_expanded: args.show_expanded || settings.show_expanded,
        page_size,
        idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
    };

    let user = UserId::new(args.user);
    let user_name = args.name.unwrap_or_else(|| user.as_str().to_string());
    let registry = ChannelRegistry::new(layout);
    let trace_dir = settings.trace_dir.as_deref();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handle_query(&registry, &context, &opts, &user, &user_name, &query)
    }));

    let reply = match outcome {
        Ok(Ok(reply)) => reply,
        Ok(Err(RequestError::Macro(e))) => {
            let err = CliError::new(macro_exit_code(&e), e.to_string());
            return Err(if e.is_forbidden() {
                err.with_hint("only #define, #undef and conditional directives are allowed")
            } else {
                err
            });
        }
        Ok(Err(err @ RequestError::Storage(_))) => {
            log::error!("request for {} failed: {}", user, err);
            println!("{}", format_internal_error(&err.to_string(), opts.budget));
            report_trace(trace_dir, &trace::error_trace(&err));
            return Err(CliError::silent(EXIT_STORAGE));
        }
        Err(payload) => {
            let description = trace::panic_message(payload.as_ref());
            log::error!("request for {} panicked: {}", user, description);
            println!("{}", format_internal_error(&description, opts.budget));
            let body = trace::take_panic_trace().unwrap_or_else(|| description.clone());
            report_trace(trace_dir, &body);
            panic::resume_unwind(payload);
        }
    };

    match reply {
        Reply::Text(text) => {
            println!("{}", text);
            Ok(())
        }
        Reply::QueryFailed(block) => {
            println!("{}", block);
            Err(CliError::silent(EXIT_QUERY))
        }
        Reply::Table(pager) => {
            if args.json {
                let json = serde_json::to_string_pretty(pager.result())
                    .map_err(|e| CliError::new(EXIT_INTERNAL, e.to_string()))?;
                println!("{}", json);
                return Ok(());
            }
            if args.plain || !atty::is(atty::Stream::Stdout) {
                println!("{}", pager.render());
                return Ok(());
            }

            let title = format!("{} ({})", user_name, user);
            let view = tui::PagerView::new(
                pager,
                title,
                settings.scroll_steps.clone(),
                settings.page_size_choices.clone(),
            );
            match tui::run(view).map_err(|e| CliError::new(EXIT_TERMINAL, e))? {
                tui::Outcome::Quit(text) => println!("{}", text),
                tui::Outcome::Dismissed => {}
            }
            Ok(())
        }
    }
}

/// Storage layout from the command line, falling back to the settings file.
fn snapshot_layout(
    settings: &Settings,
    db: Option<PathBuf>,
    per_user_dir: Option<PathBuf>,
) -> Result<SnapshotLayout, CliError> {
    if let Some(dir) = per_user_dir {
        return Ok(SnapshotLayout::PerUser { dir });
    }
    if let Some(path) = db {
        return Ok(SnapshotLayout::Shared(path));
    }
    if let Some(dir) = &settings.per_user_dir {
        return Ok(SnapshotLayout::PerUser { dir: dir.clone() });
    }
    if let Some(path) = &settings.database {
        return Ok(SnapshotLayout::Shared(path.clone()));
    }
    Err(CliError::usage("no snapshot configured").with_hint(format!(
        "pass --db or --per-user-dir, or set storage.database in {}",
        Settings::config_path_display()
    )))
}

fn load_context(settings: &Settings, explicit: Option<&Path>) -> Result<MacroContext, CliError> {
    match explicit.or(settings.macro_context_file.as_deref()) {
        Some(path) => MacroContext::from_file(path).map_err(CliError::usage),
        None => Ok(MacroContext::builtin()),
    }
}

fn report_trace(dir: Option<&Path>, body: &str) {
    match trace::write_trace(dir, body) {
        Ok(path) => eprintln!("trace written to {}", path.display()),
        Err(e) => log::error!("could not write trace: {}", e),
    }
}

// ============================================================================
// expand
// ============================================================================

fn cmd_expand(
    settings: &Settings,
    text: String,
    name: String,
    context: Option<PathBuf>,
    no_context: bool,
) -> Result<(), CliError> {
    let text = read_text_arg(text)?;
    let expanded = if no_context {
        zoopeek_macros::expand(&text)
    } else {
        load_context(settings, context.as_deref())?.expand(&name, &text)
    };

    let expanded = expanded
        .map_err(|e| CliError::new(macro_exit_code(&e), e.to_string()))?;
    print!("{}", expanded);
    if !expanded.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// `-` means read the whole of stdin.
fn read_text_arg(arg: String) -> Result<String, CliError> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| CliError::io(format!("failed to read stdin: {}", e)))?;
    Ok(buf)
}
