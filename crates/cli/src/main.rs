//! Tether CLI
//!
//! Runs Lua sources inside a boundary context and optionally calls a
//! function afterwards. With no subcommand it runs the built-in greeting.

use clap::{Args, CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::PoisonError;
use tether_core::{Result, Value, Vector};
use tether_runtime::{Context, SessionManager, SessionOptions};
use tracing::{debug, info};

/// Exit code for any failure, including an invalid session UID
const EXIT_ERROR: i32 = 1;

const HELLO_WORLD: &str = "print('Hello, world, from Lua, loaded through tether!')";

#[derive(ClapParser)]
#[command(name = "tether")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Lua scripts in an isolated tether session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a Lua file into a fresh session
    Run {
        /// Lua source file
        file: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Load a Lua chunk given on the command line
    Eval {
        /// Lua source text
        source: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
struct SessionArgs {
    /// Start the session without the Lua standard library
    #[arg(long)]
    no_stdlib: bool,

    /// Dotted path of a function to call after loading
    #[arg(long, value_name = "PATH")]
    call: Option<String>,

    /// String arguments passed to the `--call` function
    #[arg(value_name = "ARGS")]
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tether=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        None => run_hello_world(),
        Some(Commands::Run { file, session }) => {
            run_source(&file.to_string_lossy(), true, &session).map(print_results)
        }
        Some(Commands::Eval { source, session }) => {
            run_source(&source, false, &session).map(print_results)
        }
        Some(Commands::Completions { shell }) => {
            run_completions(shell);
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(EXIT_ERROR);
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "tether", &mut io::stdout());
}

fn print_results(results: Option<Vector>) {
    for value in results.iter().flatten() {
        println!("{}", value);
    }
}

/// Init, one stdlib session, load the greeting, tear everything down
fn run_hello_world() -> Result<()> {
    let ctx = Context::init()?;
    let manager_id = ctx.pin_manager(SessionManager::new())?;
    let manager = ctx.manager(manager_id)?;

    let uid = manager
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .new_session(true);
    if !manager
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_valid(uid)
    {
        eprintln!("Error: got an invalid session UID, cannot continue");
        process::exit(EXIT_ERROR);
    }

    let loaded = manager
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .with_session(uid, |s| s.load(HELLO_WORLD, false));

    drop(manager);
    ctx.release(manager_id);
    ctx.shutdown();
    loaded
}

/// Load `source` into a fresh session and run the optional `--call`
///
/// Returns the call's results, or `None` when nothing was called.
fn run_source(source: &str, is_file: bool, args: &SessionArgs) -> Result<Option<Vector>> {
    let ctx = Context::init()?;
    let manager_id = ctx.pin_manager(SessionManager::new())?;
    let outcome = load_and_call(&ctx, manager_id, source, is_file, args);
    ctx.release(manager_id);

    let summary = ctx.shutdown();
    debug!(swept = summary.total(), "context shut down");
    outcome
}

fn load_and_call(
    ctx: &Context,
    manager_id: tether_core::PinId,
    source: &str,
    is_file: bool,
    args: &SessionArgs,
) -> Result<Option<Vector>> {
    let manager = ctx.manager(manager_id)?;
    let options = SessionOptions::new().with_stdlib(!args.no_stdlib);
    let uid = manager
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .new_session_with(options)?;
    let session = manager
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(uid)?;

    let mut session = session.lock();
    session.load(source, is_file)?;
    info!(uid, "loaded {}", if is_file { source } else { "inline chunk" });

    match &args.call {
        Some(path) => {
            let call_args: Vector = args.args.iter().map(|a| Value::string(a.as_str())).collect();
            session.call(path, &call_args).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tether_core::Category;

    #[test]
    fn test_parse_run_with_call() {
        let cli = Cli::try_parse_from([
            "tether",
            "run",
            "script.lua",
            "--no-stdlib",
            "--call",
            "app.main",
            "a",
            "b",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run { file, session }) => {
                assert_eq!(file, PathBuf::from("script.lua"));
                assert!(session.no_stdlib);
                assert_eq!(session.call.as_deref(), Some("app.main"));
                assert_eq!(session.args, vec!["a", "b"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_no_subcommand() {
        let cli = Cli::try_parse_from(["tether"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    #[serial]
    fn test_hello_world() {
        run_hello_world().unwrap();
    }

    #[test]
    #[serial]
    fn test_eval_with_call() {
        let args = SessionArgs {
            no_stdlib: false,
            call: Some("shout".to_string()),
            args: vec!["hey".to_string()],
        };
        let results = run_source("function shout(s) return s:upper() .. '!' end", false, &args)
            .unwrap()
            .unwrap();
        assert_eq!(results, [Value::string("HEY!")].into_iter().collect());
    }

    #[test]
    #[serial]
    fn test_run_file_without_stdlib() {
        let mut file = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
        writeln!(file, "x = string.len('abc')").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let args = SessionArgs {
            no_stdlib: true,
            ..SessionArgs::default()
        };
        let err = run_source(&path, true, &args).unwrap_err();
        assert_eq!(err.category(), Category::ExecutionError);
    }
}
