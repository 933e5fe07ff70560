//! Driftline entrypoint: interactive line-editor shell.

mod collab;
mod keydump;

use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use core_reader::contract::{EnvProvider, Evaluator};
use core_reader::reader::{Collaborators, Reader, ReaderOptions};
use core_reader::{NullCollaborator, ReaderConfig};
use core_term::{TermCaps, TermSession};

use collab::{
    BalanceSyntax, CdSuggester, FsProber, HistoryCompleter, OsEnv, RuleHighlighter,
    ShellEvaluator, StatusPrompter,
};

const STDIN_FD: RawFd = libc::STDIN_FILENO;
const STDOUT_FD: RawFd = libc::STDOUT_FILENO;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "driftline", version, about = "Interactive line editor shell")]
struct Args {
    /// Decode key sequences instead of running the shell.
    #[arg(long = "key-dump")]
    key_dump: bool,
    /// Print the preset bindings in DSL form and exit.
    #[arg(long = "dump-bindings")]
    dump_bindings: bool,
    /// History name override (otherwise $fish_history or "default").
    #[arg(long = "history")]
    history: Option<String>,
    /// Keep history in memory only.
    #[arg(long = "private")]
    private: bool,
}

static INTERRUPTED: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_sig: libc::c_int) {
    if let Some(flag) = INTERRUPTED.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

fn install_sigint(flag: Arc<AtomicBool>) {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let _ = INTERRUPTED.set(flag);
    // No SA_RESTART: the point is to interrupt the reader's poll.
    let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
    if let Err(err) = unsafe { signal::sigaction(Signal::SIGINT, &action) } {
        warn!(target: "runtime", %err, "SIGINT handler not installed");
    }
}

fn configure_logging() -> Result<Option<WorkerGuard>> {
    let Ok(filter) = std::env::var("DRIFTLINE_LOG") else {
        return Ok(None);
    };
    let log_path = Path::new("driftline.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(log_path);
    }
    let appender = tracing_appender::rolling::never(".", "driftline.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Best effort: never leave the terminal in key-reader mode.
        let _ = crossterm::terminal::disable_raw_mode();
        error!(target: "runtime", "panic: {info}");
        default_hook(info);
    }));
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();

    let env = OsEnv;
    let caps = TermCaps::from_term(env.get("TERM").as_deref())
        .context("terminal setup failed; refusing to run interactively")?;

    if args.key_dump {
        return keydump::run(STDIN_FD, &caps);
    }
    if args.dump_bindings {
        for line in core_reader::bindings::preset_bindings(&caps).dump() {
            println!("{line}");
        }
        return Ok(());
    }

    let mut config = ReaderConfig::from_env(&env);
    if let Some(name) = &args.history {
        config.history_name = name.clone();
    }
    let private = args.private;

    let history_factory: core_reader::HistoryFactory = Box::new(move |name: &str| {
        if private {
            Arc::new(core_history::History::in_memory(name))
        } else {
            core_history::session(name)
        }
    });
    let history = history_factory(&config.history_name);

    let collaborators = Collaborators {
        syntax: Arc::new(BalanceSyntax),
        completer: Arc::new(HistoryCompleter::new(history)),
        highlighter: Arc::new(RuleHighlighter),
        env: Arc::new(OsEnv),
        uvar: Arc::new(NullCollaborator),
        prober: Arc::new(FsProber),
        special: Arc::new(CdSuggester),
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    install_sigint(interrupted.clone());

    let mut session = TermSession::acquire(STDIN_FD).context("cannot acquire terminal")?;
    let mut reader = Reader::new(ReaderOptions {
        in_fd: STDIN_FD,
        out_fd: STDOUT_FD,
        caps,
        collab: collaborators,
        config,
        interrupted,
        history_factory,
    })?;

    info!(target: "runtime", "startup complete");
    let mut prompter = StatusPrompter::new();
    let mut evaluator = ShellEvaluator;

    loop {
        match reader.read_line(&mut prompter) {
            Ok(Some(line)) => {
                // Hand the terminal to user code, take it back after.
                if let Err(err) = session.suspend() {
                    warn!(target: "runtime", %err, "terminal release failed");
                }
                prompter.last_status = evaluator.evaluate(&line);
                if let Err(err) = session.resume() {
                    warn!(target: "runtime", %err, "terminal reacquire failed");
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!(target: "runtime", %err, "reader error");
                break;
            }
        }
    }

    session.suspend()?;
    println!();
    Ok(())
}
