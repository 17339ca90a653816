// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! # timey — interactive time tracker for Jira
//!
//! Times work against task names, keeps cumulative durations in a JSON file and posts
//! them to Jira as work-log entries. Task names that look like issue keys
//! (`LETTERS-DIGITS`) are posted directly; other names are posted through an alias.
//!
//! Stores live at `$HOME/.timey/timey_data.json` and `$HOME/.timey/timey_alias.json`
//! by default; see `timey --help` for flags and their environment variables.
//!
//! ## Commands
//!
//! | Command          | Description |
//! |------------------|-------------|
//! | `start`          | Start timing a task; a running task is stopped and saved first. |
//! | `stop`           | Stop the running task and add its time to the store. |
//! | `current`        | Show the running task and its duration. |
//! | `report`         | Show each stored task, the running task and the total. |
//! | `add`            | Add `HH:MM:SS` to a task by hand. |
//! | `delete`         | Delete a task after confirmation. |
//! | `sync`           | Post every stored task to Jira; posted tasks are removed. |
//! | `list-assigned`  | List open issues assigned to you. |
//! | `alias-list`     | Show aliases. |
//! | `alias-add`      | Map a task name to an issue, with an optional work-log comment. |
//! | `alias-remove`   | Remove an alias after confirmation. |
//! | `config`         | View or change the Jira URL, store paths and log level. |
//! | `exit`           | Save the running task and quit. Ctrl-C and end of input do the same. |

mod app;
mod config;
mod duration;
mod error;
mod issue;
mod logging;
mod remote;
mod session;
mod shell;
mod signal;
mod store;
mod sync;

use app::App;
use clap::Parser;
use config::{Cli, Config};
use shell::Shell;
use signal::Shutdown;
use std::io;
use std::process;
use tracing::{debug, warn};

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("timey: {}", e);
            1
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> error::Result<i32> {
    let config = Config::from_cli(cli)?;
    let log = logging::init(&config.log_level)?;
    debug!("config: {:?}", config);

    let shutdown = Shutdown::new();
    if let Err(e) = signal::install_interrupt_handler(&shutdown) {
        warn!("cannot install interrupt handler: {}", e);
    }

    let mut app = App::from_config(config, log)?;
    app.tasks.load()?;
    app.aliases.load()?;

    let mut shell = Shell::new(app, io::stdin().lock(), io::stdout().lock(), shutdown)
        .interactive(signal::stdin_is_tty());
    Ok(shell.run())
}
