use std::path::PathBuf;

use clap::Parser;

/// Quiesce - continuous-build change waiter
///
/// Runs a command, watches the given paths, and reruns the command once the
/// filesystem has stopped changing for a short quiet period.
#[derive(Parser, Debug)]
#[command(name = "quiesce")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Press Ctrl-D or Ctrl+C to stop the build loop.")]
pub struct Cli {
    /// Directory or file to watch (repeatable; defaults to the current dir)
    #[arg(short, long = "watch", value_name = "PATH")]
    pub watch: Vec<PathBuf>,

    /// Emit loop events as NDJSON for CI
    #[arg(long)]
    pub json: bool,

    /// Command to run on each settled change set
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Watched roots, defaulting to `.` when none are given.
    pub fn roots(&self) -> Vec<PathBuf> {
        if self.watch.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.watch.clone()
        }
    }
}
