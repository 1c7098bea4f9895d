//! tugimport CLI binary entry point.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use tugimport::command::{serve, ServeExit, ServeOptions, FATAL_EXIT_CODE};
use tugimport::config::{MultilineMode, StyleConfig, MIN_MAX_COLUMNS};
use tugimport::error::{TugImportError, TugImportResult};
use tugimport::output::{emit_response, ErrorResponse, ResolveResponse};
use tugimport::python::env::RuntimeInfo;
use tugimport::python::indexer::RuntimeLocator;
use tugimport::python::resolver::resolve_source;
use tugimport::session::{plan_insert, read_source};

/// Symbol index and import insertion for Python workspaces.
#[derive(Parser)]
#[command(name = "tugimport")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Python interpreter used for runtime discovery.
    #[arg(long, global = true)]
    python: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer JSON requests from stdin, one per line.
    Serve {
        /// Keep serving after a fatal error.
        #[arg(long)]
        keep_alive: bool,
    },

    /// Print the unresolved and unreferenced names of a file.
    Resolve {
        /// Python source file.
        file: PathBuf,
    },

    /// Print the edit that adds an import to a file.
    Insert {
        /// Python source file.
        file: PathBuf,

        /// Module to import, or import from when --symbol is given.
        #[arg(long)]
        module: String,

        /// Name to import from the module.
        #[arg(long)]
        symbol: Option<String>,

        /// Wrapping style for long `from` imports.
        #[arg(long, value_enum, default_value = "backslash")]
        multiline: Multiline,

        /// Maximum line width of a rendered import.
        #[arg(long, default_value_t = 79)]
        max_columns: usize,

        /// Indent continuation lines with a tab.
        #[arg(long)]
        tabs: bool,
    },
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Multiline {
    Backslash,
    Parentheses,
}

impl From<Multiline> for MultilineMode {
    fn from(mode: Multiline) -> Self {
        match mode {
            Multiline::Backslash => MultilineMode::Backslash,
            Multiline::Parentheses => MultilineMode::Parentheses,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            // Errors go to stdout as JSON, like every other response
            let response = ErrorResponse::from_error(None, &err);
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();
            ExitCode::from(err.kind().code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> TugImportResult<ExitCode> {
    match cli.command {
        Command::Serve { keep_alive } => execute_serve(keep_alive),
        Command::Resolve { file } => execute_resolve(&file),
        Command::Insert {
            file,
            module,
            symbol,
            multiline,
            max_columns,
            tabs,
        } => {
            let style = StyleConfig {
                multiline: multiline.into(),
                max_columns,
                indent_with_tabs: tabs,
            };
            execute_insert(&cli.global, &file, &module, symbol.as_deref(), &style)
        }
    }
}

fn execute_serve(keep_alive: bool) -> TugImportResult<ExitCode> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let exit = serve(stdin.lock(), &mut stdout, ServeOptions { keep_alive })
        .map_err(|e| TugImportError::fatal(e.to_string()).with_context("request loop"))?;
    Ok(match exit {
        ServeExit::EndOfInput => ExitCode::SUCCESS,
        ServeExit::Fatal => ExitCode::from(FATAL_EXIT_CODE),
    })
}

fn execute_resolve(file: &Path) -> TugImportResult<ExitCode> {
    let source = read_source(file)?;
    let resolution = resolve_source(&source).map_err(|e| TugImportError::ParseFailure {
        path: file.to_path_buf(),
        message: e.to_string(),
    })?;
    let response = ResolveResponse {
        unresolved: sorted(resolution.unresolved),
        unreferenced: sorted(resolution.unreferenced),
    };
    emit_response(&response, &mut io::stdout()).map_err(|e| TugImportError::fatal(e.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

fn execute_insert(
    global: &GlobalArgs,
    file: &Path,
    module: &str,
    symbol: Option<&str>,
    style: &StyleConfig,
) -> TugImportResult<ExitCode> {
    if style.max_columns < MIN_MAX_COLUMNS {
        return Err(TugImportError::user(format!(
            "--max-columns must be at least {}",
            MIN_MAX_COLUMNS
        )));
    }
    let source = read_source(file)?;

    let mut local_roots = Vec::new();
    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        local_roots.push(parent.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        local_roots.push(cwd);
    }
    let locator = RuntimeLocator::new(RuntimeInfo::detect(global.python.as_deref()), local_roots);

    let response = match symbol {
        Some(symbol) => plan_insert(&source, &locator, Some(module), symbol, style)?,
        None => plan_insert(&source, &locator, None, module, style)?,
    };
    emit_response(&response, &mut io::stdout()).map_err(|e| TugImportError::fatal(e.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

fn sorted(names: BTreeSet<String>) -> Vec<String> {
    names.into_iter().collect()
}
