//! Quiesce CLI - continuous-build change waiter
//!
//! Usage: quiesce [OPTIONS] -- <COMMAND>...
//!
//! Runs the command, then blocks until the watched paths have settled
//! (no changes for one quiet period) and runs it again, until the loop is
//! cancelled with Ctrl+C or Ctrl-D.

mod cli;

use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use quiesce::{
    CancellationToken, ChangeWaiter, FileSet, InteractiveInput, LoopEvent, NotifySessionFactory,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    run_loop(&cli)
}

fn run_loop(cli: &cli::Cli) -> Result<()> {
    let roots = cli.roots();
    let files = FileSet::new(roots.clone());

    let token = Arc::new(CancellationToken::new());
    let interrupt_token = token.clone();
    ctrlc::set_handler(move || {
        interrupt_token.request_cancellation();
    })
    .expect("Error setting Ctrl+C handler");

    let waiter = ChangeWaiter::new(Arc::new(NotifySessionFactory), InteractiveInput::shared());

    loop {
        run_build(&cli.command, cli.json)?;

        if token.is_cancellation_requested() {
            emit(cli.json, &LoopEvent::Cancelled);
            break;
        }

        let waiting = LoopEvent::WaitingForChanges {
            roots: roots.iter().map(|r| r.display().to_string()).collect(),
        };
        let json = cli.json;
        let outcome = waiter.wait(&files, token.clone(), || emit(json, &waiting));

        if let Err(e) = outcome {
            emit(
                cli.json,
                &LoopEvent::Error {
                    message: e.to_string(),
                },
            );
            return Err(e.into());
        }

        if token.is_cancellation_requested() {
            emit(cli.json, &LoopEvent::Cancelled);
            break;
        }
    }

    Ok(())
}

fn run_build(command: &[String], json: bool) -> Result<()> {
    emit(
        json,
        &LoopEvent::BuildStarted {
            command: command.join(" "),
        },
    );

    let status = Command::new(&command[0])
        .args(&command[1..])
        .status()
        .with_context(|| format!("failed to run '{}'", command[0]))?;

    emit(
        json,
        &LoopEvent::BuildFinished {
            success: status.success(),
            exit_code: status.code(),
        },
    );
    Ok(())
}

fn emit(json: bool, event: &LoopEvent) {
    if json {
        println!("{}", event.to_json());
        return;
    }
    match event {
        LoopEvent::BuildStarted { command } => println!("[quiesce] running: {command}"),
        LoopEvent::BuildFinished { success: true, .. } => println!("[quiesce] build succeeded"),
        LoopEvent::BuildFinished {
            success: false,
            exit_code,
        } => println!(
            "[quiesce] build failed (exit code {})",
            exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
        ),
        LoopEvent::WaitingForChanges { .. } => {
            println!("[quiesce] waiting for changes... (Ctrl-D to stop)");
        }
        LoopEvent::Cancelled => println!("[quiesce] build loop stopped"),
        LoopEvent::Error { message } => eprintln!("[quiesce] error: {message}"),
    }
}
