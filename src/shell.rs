//! The interactive command loop.
//!
//! Reads one command per line, dispatches to the `cmd_*` handlers and prints their
//! results. End of input, `exit`/`quit` and Ctrl-C all leave through [`Shell::exit`], which
//! commits the running task before returning.

use crate::app::App;
use crate::duration::WorkDuration;
use crate::error::{Error, Result};
use crate::issue::normalize_task_id;
use crate::remote::Credentials;
use crate::session::StartOutcome;
use crate::signal::{self, Shutdown};
use crate::sync::{SyncAbort, TaskStatus, TaskSync};
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::PathBuf;
use tracing::{debug, error, warn};

const PROMPT: &str = "(timey) ";
const INTRO: &str = "Welcome to Timey. Type help or ? to list commands.";
const RULE: &str = "-------------";
const TIME_FORMAT: &str = "%H:%M:%S";

const HELP: &str = "\
Commands:
  start <task>                  Start tracking a task (alias: begin)
  stop [task]                   Stop the running task (alias: end)
  current                       Show the running task and its duration
  report                        Show stored durations and the total
  add <task> <HH:MM:SS>         Add time to a task by hand
  delete <task>                 Delete a task's stored time
  sync                          Post all stored time to Jira (alias: jira)
  list-assigned                 List open Jira issues assigned to you (alias: list)
  alias-list                    Show aliases (alias: aliasview)
  alias-add <name> <ISSUE> [comment...]
                                Map a task name to a Jira issue (alias: aliasadd)
  alias-remove <name>           Remove an alias (alias: aliasdel)
  config [key [value]]          View or change settings: url, datafile, aliasfile, log (alias: set)
  version                       Show the version
  help                          Show this help (alias: ?)
  exit                          Save the running task and quit (alias: quit)";

/// Result of reading one line from the user.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Eof,
    /// A read was cut short by a shutdown request.
    Interrupted,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Shell<R, W> {
    app: App,
    input: R,
    out: W,
    shutdown: Shutdown,
    interactive: bool,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(app: App, input: R, out: W, shutdown: Shutdown) -> Self {
        Shell {
            app,
            input,
            out,
            shutdown,
            interactive: false,
        }
    }

    /// Interactive shells turn off echo for password entry.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Runs until exit and returns the process exit code.
    pub fn run(&mut self) -> i32 {
        self.say(INTRO);
        loop {
            if self.shutdown.is_requested() {
                debug!("shutdown requested");
                return self.exit(0);
            }
            self.show_prompt(PROMPT);
            let line = match self.read_line() {
                Input::Line(line) => line,
                Input::Eof => {
                    self.say("");
                    return self.exit(0);
                }
                Input::Interrupted => {
                    self.say("");
                    continue;
                }
            };
            match self.execute(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return self.exit(0),
                Err(e) if e.is_fatal() => {
                    error!("{}", e);
                    self.say(&format!("Error: {}", e));
                    return self.exit(1);
                }
                Err(e) => self.say(&e.to_string()),
            }
        }
    }

    /// Commits the running task, drops credentials and reports what was saved or lost.
    fn exit(&mut self, code: i32) -> i32 {
        let report = self.app.shutdown();
        if let Some(stopped) = report.stopped {
            self.say(&format!(
                "STOPPED {} at {} (duration: {})",
                stopped.task,
                stopped.stopped_at.format(TIME_FORMAT),
                stopped.elapsed
            ));
        }
        if let Some((task, elapsed)) = report.lost {
            self.say(&format!(
                "Could not save \"{}\" ({}). Re-enter it later with: add {} {}",
                task, elapsed, task, elapsed
            ));
            return code.max(1);
        }
        self.say("Goodbye.");
        code
    }

    fn execute(&mut self, line: &str) -> Result<Flow> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };
        debug!("command {:?} {:?}", verb, args);
        match verb.to_ascii_lowercase().as_str() {
            "start" | "begin" => self.cmd_start(args)?,
            "stop" | "end" => self.cmd_stop(args)?,
            "current" => self.cmd_current(),
            "report" => self.cmd_report()?,
            "add" => self.cmd_add(args)?,
            "delete" => self.cmd_delete(args)?,
            "sync" | "jira" => self.cmd_sync()?,
            "list-assigned" | "list" => self.cmd_list_assigned()?,
            "alias-list" | "aliasview" => self.cmd_alias_list()?,
            "alias-add" | "aliasadd" => self.cmd_alias_add(args)?,
            "alias-remove" | "aliasdel" => self.cmd_alias_remove(args)?,
            "config" | "set" => self.cmd_config(args)?,
            "version" => self.say(&format!("Version: {}", env!("CARGO_PKG_VERSION"))),
            "help" | "?" => self.say(HELP),
            "exit" | "quit" => return Ok(Flow::Exit),
            _ => self.say(&format!("*** Unknown syntax: {}", line.trim())),
        }
        Ok(Flow::Continue)
    }

    fn cmd_start(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            self.say("Usage: start <task>");
            return Ok(());
        }
        match self.app.start(&args.join(" "))? {
            StartOutcome::Started { task, at } => {
                self.say(&format!("STARTED {} at {}", task, at.format(TIME_FORMAT)));
            }
            StartOutcome::AlreadyRunning { task, elapsed } => {
                self.say(&format!(
                    "\"{}\" already started! Current duration: {}",
                    task, elapsed
                ));
            }
            StartOutcome::Switched { stopped, task, at } => {
                self.say(&format!(
                    "STOPPED {} at {} (duration: {})",
                    stopped.task,
                    stopped.stopped_at.format(TIME_FORMAT),
                    stopped.elapsed
                ));
                self.say(&format!("STARTED {} at {}", task, at.format(TIME_FORMAT)));
            }
        }
        Ok(())
    }

    fn cmd_stop(&mut self, args: &[&str]) -> Result<()> {
        let named = normalize_task_id(&args.join(" "));
        if let Some((task, _)) = self.app.current() {
            if !named.is_empty() && named != task {
                warn!("\"{}\" is not running; stopping \"{}\"", named, task);
            }
        }
        match self.app.stop()? {
            Some(stopped) => self.say(&format!(
                "STOPPED {} at {} (duration: {})",
                stopped.task,
                stopped.stopped_at.format(TIME_FORMAT),
                stopped.elapsed
            )),
            None => self.say("No task is currently being tracked!"),
        }
        Ok(())
    }

    fn cmd_current(&mut self) {
        match self.app.current() {
            Some((task, elapsed)) => self.say(&format!(
                "Current task: {}, Current duration: {}",
                task, elapsed
            )),
            None => self.say("No task is currently being tracked!"),
        }
    }

    fn cmd_report(&mut self) -> Result<()> {
        let report = self.app.report()?;
        for row in &report.rows {
            self.say(&format!("Task: {}, Duration: {}", row.task, row.duration));
        }
        if let Some((task, elapsed)) = &report.live {
            self.say(&format!(
                "Current task: {}, Current duration: {}",
                task, elapsed
            ));
        }
        self.say(RULE);
        self.say(&format!("Total Duration: {}", report.total));
        Ok(())
    }

    fn cmd_add(&mut self, args: &[&str]) -> Result<()> {
        let [name, duration] = args else {
            self.say("Usage: add <task> <HH:MM:SS>");
            return Ok(());
        };
        let (task, record) = self.app.add(name, duration)?;
        self.say(&format!(
            "Added {} to {} (total: {})",
            WorkDuration::parse(duration)?,
            task,
            record.duration
        ));
        Ok(())
    }

    fn cmd_delete(&mut self, args: &[&str]) -> Result<()> {
        let [name] = args else {
            self.say("Usage: delete <task>");
            return Ok(());
        };
        let task = self.app.find_task(name)?;
        if !self.confirm(&format!("Delete \"{}\"? (y/n) ", task)) {
            return Ok(());
        }
        let removed = self.app.delete(&task)?;
        self.say(&format!("Deleted {} ({})", task, removed.duration));
        Ok(())
    }

    fn cmd_sync(&mut self) -> Result<()> {
        if !self.ensure_credentials() {
            self.say("Credentials are required to post to Jira.");
            return Ok(());
        }
        self.say("Uploading...");
        let Shell { app, out, .. } = &mut *self;
        let report = app.sync(&mut |entry: &TaskSync| {
            write_line(&mut *out, &describe(entry));
            let _ = out.flush();
        })?;
        if report.credentials_rejected() {
            self.say("Jira rejected the credentials; they will be requested again.");
        } else if let Some(SyncAbort::Unreachable(msg)) = &report.aborted {
            self.say(&format!("Jira is unreachable ({}); try again later.", msg));
        } else {
            self.say("done!");
        }
        self.say(&format!(
            "Jira post results: success={}, fail={}",
            report.succeeded.len(),
            report.remaining
        ));
        Ok(())
    }

    fn cmd_list_assigned(&mut self) -> Result<()> {
        if !self.ensure_credentials() {
            self.say("Credentials are required to query Jira.");
            return Ok(());
        }
        let issues = self.app.assigned_issues()?;
        if issues.is_empty() {
            self.say("No open issues are assigned to you.");
        }
        for issue in issues {
            self.say(&format!("{}    :       {}", issue.key, issue.summary));
        }
        Ok(())
    }

    fn cmd_alias_list(&mut self) -> Result<()> {
        let aliases = self.app.alias_list()?;
        if aliases.is_empty() {
            self.say("No aliases defined.");
        }
        for (alias, record) in aliases {
            self.say(&format!(
                "Alias: {}, Story: {}, Comment: {}",
                alias, record.issue, record.comment
            ));
        }
        Ok(())
    }

    fn cmd_alias_add(&mut self, args: &[&str]) -> Result<()> {
        let [alias, issue, comment @ ..] = args else {
            self.say("Usage: alias-add <name> <ISSUE-123> [comment...]");
            return Ok(());
        };
        let record = self.app.alias_add(alias, issue, &comment.join(" "))?;
        self.say(&format!("Alias {} -> {}", alias, record.issue));
        Ok(())
    }

    fn cmd_alias_remove(&mut self, args: &[&str]) -> Result<()> {
        let [alias] = args else {
            self.say("Usage: alias-remove <name>");
            return Ok(());
        };
        let record = self.app.find_alias(alias)?;
        if !self.confirm(&format!(
            "Remove alias \"{}\" ({})? (y/n) ",
            alias, record.issue
        )) {
            return Ok(());
        }
        self.app.alias_remove(alias)?;
        self.say(&format!("Removed alias {}", alias));
        Ok(())
    }

    fn cmd_config(&mut self, args: &[&str]) -> Result<()> {
        let Some((key, value)) = args.split_first() else {
            for key in ["url", "datafile", "aliasfile", "log"] {
                let value = self.config_value(key);
                self.say(&format!("{} = {}", key, value));
            }
            return Ok(());
        };
        let key = key.to_ascii_lowercase();
        if !matches!(key.as_str(), "url" | "datafile" | "aliasfile" | "log") {
            return Err(Error::Config(
                "Available options: url, datafile, aliasfile, log".to_string(),
            ));
        }
        if value.is_empty() {
            let current = self.config_value(&key);
            self.say(&format!("{} = {}", key, current));
            return Ok(());
        }
        let value = value.join(" ");
        let old = match key.as_str() {
            "url" => self.app.set_jira_url(&value)?,
            "datafile" => self
                .app
                .set_data_file(PathBuf::from(&value))
                .display()
                .to_string(),
            "aliasfile" => self
                .app
                .set_alias_file(PathBuf::from(&value))
                .display()
                .to_string(),
            _ => self.app.set_log_level(&value)?,
        };
        let new = self.config_value(&key);
        self.say(&format!("{}: {} -> {}", key, old, new));
        Ok(())
    }

    fn config_value(&self, key: &str) -> String {
        let config = &self.app.config;
        match key {
            "url" => config.jira_url.clone(),
            "datafile" => config.data_file.display().to_string(),
            "aliasfile" => config.alias_file.display().to_string(),
            _ => self.app.log.level().to_string(),
        }
    }

    /// Prompts for a username and password unless valid credentials are cached.
    fn ensure_credentials(&mut self) -> bool {
        if !self.app.sync.needs_credentials() {
            return true;
        }
        let Some(username) = self.ask("Username: ").filter(|u| !u.is_empty()) else {
            return false;
        };
        let password = {
            let _echo = self.interactive.then(signal::disable_echo);
            self.ask("Password: ")
        };
        if self.interactive {
            self.say("");
        }
        let Some(password) = password else {
            return false;
        };
        self.app
            .sync
            .set_credentials(Credentials::new(username, password));
        true
    }

    /// Asks until the answer is y or n. End of input counts as no.
    fn confirm(&mut self, prompt: &str) -> bool {
        loop {
            match self.ask(prompt) {
                Some(answer) if answer.eq_ignore_ascii_case("y") => return true,
                Some(answer) if answer.eq_ignore_ascii_case("n") => return false,
                Some(_) => self.say("Please answer y or n."),
                None => return false,
            }
        }
    }

    fn ask(&mut self, prompt: &str) -> Option<String> {
        self.show_prompt(prompt);
        match self.read_line() {
            Input::Line(line) => Some(line.trim().to_string()),
            Input::Eof | Input::Interrupted => None,
        }
    }

    /// Reads one line. Unlike [`BufRead::read_line`], a read interrupted by a signal
    /// returns [`Input::Interrupted`] when shutdown was requested instead of retrying.
    fn read_line(&mut self) -> Input {
        let mut buf = Vec::new();
        loop {
            let (done, used) = match self.input.fill_buf() {
                Ok(available) if available.is_empty() => {
                    if buf.is_empty() {
                        return Input::Eof;
                    }
                    (true, 0)
                }
                Ok(available) => match available.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        buf.extend_from_slice(&available[..=i]);
                        (true, i + 1)
                    }
                    None => {
                        buf.extend_from_slice(available);
                        (false, available.len())
                    }
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    if self.shutdown.is_requested() {
                        return Input::Interrupted;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("cannot read input: {}", e);
                    return Input::Eof;
                }
            };
            self.input.consume(used);
            if done {
                let line = String::from_utf8_lossy(&buf);
                return Input::Line(line.trim_end_matches(['\r', '\n']).to_string());
            }
        }
    }

    fn show_prompt(&mut self, prompt: &str) {
        let _ = write!(self.out, "{}", prompt);
        let _ = self.out.flush();
    }

    fn say(&mut self, line: &str) {
        write_line(&mut self.out, line);
    }
}

fn write_line<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = writeln!(out, "{}", line) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            warn!("cannot write output: {}", e);
        }
    }
}

fn describe(entry: &TaskSync) -> String {
    match &entry.status {
        TaskStatus::Posted => format!(
            "  {} -> {}: posted {}",
            entry.task,
            entry.issue,
            WorkDuration::from_secs(entry.seconds)
        ),
        TaskStatus::Ambiguous => format!(
            "Unable to post \"{}\" because it is an ambiguous task ID. \
             Please create an alias or post the duration manually.",
            entry.task
        ),
        TaskStatus::Rejected(code) => {
            format!("  {} -> {}: rejected (HTTP {})", entry.task, entry.issue, code)
        }
        TaskStatus::Unauthorized => format!("  {} -> {}: unauthorized", entry.task, entry.issue),
        TaskStatus::Unreachable(msg) => {
            format!("  {} -> {}: not sent ({})", entry.task, entry.issue, msg)
        }
    }
}
