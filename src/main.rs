//! shell-runner binary entry point.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use shell_runner::cli::{self, Args, History};
use shell_runner::config::Config;
use shell_runner::{
    logging, Credential, Engine, EventKind, EventReceiver, Notification, OutputEvent,
    ProcessWorkingDirectory, SessionId, SessionState,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'shell-runner --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> shell_runner::Result<ExitCode> {
    let config = Config::load(&args)?;
    logging::try_init_with_filter(config.log_filter()).ok();
    info!("shell-runner v{}", env!("CARGO_PKG_VERSION"));

    let (engine, mut events) = Engine::new(
        config.to_engine_config(),
        Arc::new(ProcessWorkingDirectory::new()),
    )?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let code = match args.command_line() {
        Some(command) => {
            let id = engine.submit(&command, None)?;
            let (state, exit_code) = drive(&engine, &mut events, &mut input, id).await;
            exit_status(state, exit_code)
        }
        None => repl(&engine, &mut events, &mut input).await?,
    };

    engine.shutdown().await;
    Ok(code)
}

async fn repl(
    engine: &Engine,
    events: &mut EventReceiver,
    input: &mut InputLines,
) -> shell_runner::Result<ExitCode> {
    let mut last = ExitCode::SUCCESS;
    let mut history = History::default();
    loop {
        prompt(engine);
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "history" => {
                print!("{}", history.listing());
                continue;
            }
            _ => {}
        }
        history.push(line);

        match engine.submit(line, None) {
            Ok(id) => {
                let (state, exit_code) = drive(engine, events, input, id).await;
                last = exit_status(state, exit_code);
            }
            Err(e) => eprintln!("error: {e}"),
        }
        engine.prune_finished()?;
    }
    Ok(last)
}

/// Render one session until it finishes, answering credential requests from
/// standard input and turning Ctrl-C into a cancellation.
async fn drive(
    engine: &Engine,
    events: &mut EventReceiver,
    input: &mut InputLines,
    id: SessionId,
) -> (SessionState, Option<i32>) {
    loop {
        tokio::select! {
            notification = events.recv() => match notification {
                Some(Notification::Output { session, event }) if session == id => render(&event),
                Some(Notification::CredentialRequired { session, command }) if session == id => {
                    eprint!("[sudo] credential for `{command}`: ");
                    let _ = std::io::stderr().flush();
                    match input.next_line().await {
                        Ok(Some(secret)) if !secret.is_empty() => {
                            if let Err(e) = engine.supply_credential(id, Credential::new(secret)) {
                                eprintln!("error: {e}");
                                engine.cancel(id);
                            }
                        }
                        _ => {
                            engine.cancel(id);
                        }
                    }
                }
                Some(Notification::Finished { session, state, exit_code }) if session == id => {
                    return (state, exit_code);
                }
                Some(other) => debug!(session = %other.session(), "ignoring notification"),
                None => return (SessionState::Failed, None),
            },
            _ = tokio::signal::ctrl_c() => {
                if engine.cancel(id) {
                    eprintln!("^C");
                }
            }
        }
    }
}

fn render(event: &OutputEvent) {
    match event.kind {
        EventKind::Normal | EventKind::Success => print!("{}", event.payload),
        EventKind::Error => eprint!("{}", event.payload),
        EventKind::ClearSignal => print!("\x1b[2J\x1b[H"),
    }
    let _ = std::io::stdout().flush();
}

fn prompt(engine: &Engine) {
    let cwd = engine
        .working_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();
    print!("{cwd}$ ");
    let _ = std::io::stdout().flush();
}

fn exit_status(state: SessionState, exit_code: Option<i32>) -> ExitCode {
    match (state, exit_code) {
        (SessionState::Succeeded, _) => ExitCode::SUCCESS,
        (SessionState::Failed, Some(code)) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        (SessionState::TimedOut, _) => ExitCode::from(124),
        (SessionState::Cancelled, _) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}
