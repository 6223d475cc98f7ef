//! Command execution.
//!
//! Everything the emulation layer does to the host goes through a
//! [`CommandRunner`]: `ip`, `tc`, `sysctl`, the service processes. The
//! [`SystemRunner`] executes commands for real; the [`RecordingRunner`] only
//! records (and optionally prints) them, which backs both `--dry-run` and
//! the unprivileged tests.

use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};

use log::debug;
use thiserror::Error;

/// A command line, optionally executed inside a named network namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub netns: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            netns: None,
        }
    }

    /// `sh -c <command_line>`
    pub fn shell(command_line: &str) -> Self {
        Self::new("sh").args(["-c", command_line])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn in_netns(mut self, netns: Option<String>) -> Self {
        self.netns = netns;
        self
    }

    /// The full argument vector as executed, `ip netns exec` prefix included
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 5);
        if let Some(netns) = &self.netns {
            argv.extend(["ip", "netns", "exec"].map(String::from));
            argv.push(netns.clone());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    fn to_command(&self) -> Command {
        let mut command = match &self.netns {
            Some(netns) => {
                let mut command = Command::new("ip");
                command.args(["netns", "exec", netns.as_str(), self.program.as_str()]);
                command
            }
            None => Command::new(&self.program),
        };
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .argv()
            .into_iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
                    format!("'{}'", arg.replace('\'', r"'\''"))
                } else {
                    arg
                }
            })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("command failed ({status}): {command}\n{stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to open log file {}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait CommandRunner {
    /// Run to completion and return the raw output, whatever the exit status
    fn output(&self, command: &CommandSpec) -> Result<Output, CommandError>;

    /// Start a long-running process with stdout and stderr sent to
    /// `log_path` (or discarded). Runners that do not execute anything
    /// return `None`.
    fn spawn(&self, command: &CommandSpec, log_path: Option<&Path>) -> Result<Option<Child>, CommandError>;

    /// Run to completion, failing on a non-zero exit status
    fn run(&self, command: &CommandSpec) -> Result<Output, CommandError> {
        let output = self.output(command)?;
        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Executes commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, command: &CommandSpec) -> Result<Output, CommandError> {
        debug!("exec: {}", command);
        command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })
    }

    fn spawn(&self, command: &CommandSpec, log_path: Option<&Path>) -> Result<Option<Child>, CommandError> {
        debug!("spawn: {}", command);
        let mut process = command.to_command();
        process.stdin(Stdio::null());

        match log_path {
            Some(path) => {
                let log_error = |source| CommandError::LogFile {
                    path: path.to_path_buf(),
                    source,
                };
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(log_error)?;
                }
                let stdout = File::create(path).map_err(log_error)?;
                let stderr = stdout.try_clone().map_err(log_error)?;
                process.stdout(stdout).stderr(stderr);
            }
            None => {
                process.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // Own process group so teardown can signal the whole tree
        process.process_group(0);

        let child = process.spawn().map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;
        Ok(Some(child))
    }
}

/// Records commands instead of executing them.
///
/// Every command succeeds with empty output unless its rendered form
/// starts with one of the patterns registered with [`RecordingRunner::fail_when`],
/// or its program was marked with [`RecordingRunner::missing_program`].
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: RefCell<Vec<CommandSpec>>,
    failures: RefCell<Vec<String>>,
    missing: RefCell<Vec<String>>,
    echo: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that also prints each command to stdout
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Make every command whose rendered form starts with `pattern` exit
    /// with status 1
    pub fn fail_when(&self, pattern: impl Into<String>) {
        self.failures.borrow_mut().push(pattern.into());
    }

    /// Make every command running `program` fail to start, as if it were
    /// not installed
    pub fn missing_program(&self, program: impl Into<String>) {
        self.missing.borrow_mut().push(program.into());
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.borrow().clone()
    }

    /// Rendered command lines, in execution order
    pub fn rendered(&self) -> Vec<String> {
        self.commands.borrow().iter().map(ToString::to_string).collect()
    }

    fn not_found(&self, command: &CommandSpec) -> Result<(), CommandError> {
        if self.missing.borrow().contains(&command.program) {
            return Err(CommandError::Spawn {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        Ok(())
    }

    fn record(&self, command: &CommandSpec) -> bool {
        let rendered = command.to_string();
        if self.echo {
            println!("{rendered}");
        }
        self.commands.borrow_mut().push(command.clone());
        !self
            .failures
            .borrow()
            .iter()
            .any(|pattern| rendered.starts_with(pattern.as_str()))
    }
}

impl CommandRunner for RecordingRunner {
    fn output(&self, command: &CommandSpec) -> Result<Output, CommandError> {
        let succeeded = self.record(command);
        self.not_found(command)?;
        let (code, stderr) = if succeeded {
            (0, Vec::new())
        } else {
            (1, b"simulated failure".to_vec())
        };
        Ok(Output {
            // Wait status encoding: exit code in the second byte
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr,
        })
    }

    fn spawn(&self, command: &CommandSpec, _log_path: Option<&Path>) -> Result<Option<Child>, CommandError> {
        let succeeded = self.record(command);
        self.not_found(command)?;
        if !succeeded {
            return Err(CommandError::Spawn {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "simulated failure"),
            });
        }
        Ok(None)
    }
}
