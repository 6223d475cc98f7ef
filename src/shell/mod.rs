//! Interactive shell module.
//!
//! A small line-oriented command loop for inspecting the running network,
//! running commands on nodes and resetting the origin servers.

pub mod command;

pub use command::{ShellCommand, HELP};

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::connectivity::ping_all;
use crate::emulation::{CommandRunner, Network, NetworkError};
use crate::process::reset_command;
use crate::signals::{process_flags, SignalFlags};
use crate::topology::DNS;

pub const PROMPT: &str = "harnet> ";

/// How often the idle prompt checks for signals
const SIGNAL_POLL: Duration = Duration::from_millis(100);

pub struct Shell<'a, R: CommandRunner> {
    network: &'a Network<R>,
    signals: &'a SignalFlags,
}

impl<'a, R: CommandRunner> Shell<'a, R> {
    /// A shell reacting to the process-wide signal handlers
    pub fn new(network: &'a Network<R>) -> Shell<'a, R> {
        Self::with_signals(network, process_flags())
    }

    pub fn with_signals(network: &'a Network<R>, signals: &'a SignalFlags) -> Self {
        Self { network, signals }
    }

    /// Read and execute commands until `exit`, `quit`, end of input or a
    /// shutdown request.
    ///
    /// An interrupt at the prompt discards the current line and prompts
    /// again. Lines that are not valid UTF-8 are decoded lossily.
    pub fn run<I, O>(&self, input: I, mut output: O) -> io::Result<()>
    where
        I: BufRead + Send + 'static,
        O: Write,
    {
        let lines = spawn_line_reader(input);
        loop {
            write!(output, "{PROMPT}")?;
            output.flush()?;

            let line = loop {
                if self.signals.shutdown_requested() {
                    writeln!(output)?;
                    return Ok(());
                }
                if self.signals.take_interrupt() {
                    write!(output, "\n{PROMPT}")?;
                    output.flush()?;
                }
                match lines.recv_timeout(SIGNAL_POLL) {
                    Ok(line) => break line?,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        writeln!(output)?;
                        return Ok(());
                    }
                }
            };

            let command = ShellCommand::parse(&line, |name| self.network.is_node(name));
            debug!("shell: {:?}", command);
            if command == ShellCommand::Exit {
                return Ok(());
            }
            self.execute(command, &mut output)?;

            // A Ctrl-C that ended the command is spent
            if self.signals.take_interrupt() {
                writeln!(output)?;
            }
        }
    }

    fn execute<O: Write>(&self, command: ShellCommand, output: &mut O) -> io::Result<()> {
        let plan = self.network.plan();
        match command {
            ShellCommand::Empty | ShellCommand::Exit => {}
            ShellCommand::Help => writeln!(output, "{HELP}")?,
            ShellCommand::Nodes => {
                let names: Vec<&str> = plan.nodes.iter().map(|node| node.name.as_str()).collect();
                writeln!(output, "available nodes are:\n{}", names.join(" "))?;
            }
            ShellCommand::Net => {
                for link in &plan.links {
                    writeln!(
                        output,
                        "{} {}:{}",
                        link.node, link.interface, link.switch_port
                    )?;
                }
            }
            ShellCommand::Dump => {
                for node in &plan.nodes {
                    writeln!(
                        output,
                        "<{} {}: {}>",
                        node.kind.as_str(),
                        node.name,
                        self.network.describe_interfaces(&node.name).join(",")
                    )?;
                }
                for switch in &plan.switches {
                    let ports: Vec<&str> = plan
                        .links_on_switch(&switch.name)
                        .map(|link| link.switch_port.as_str())
                        .collect();
                    writeln!(output, "<switch {}: {}>", switch.name, ports.join(","))?;
                }
            }
            ShellCommand::PingAll => match ping_all(self.network) {
                Ok(report) => writeln!(output, "{report}")?,
                Err(err) => writeln!(output, "*** Error: {err}")?,
            },
            ShellCommand::ResetServers => self.reset_servers(output)?,
            ShellCommand::NodeCommand { node, command } => match self.network.exec(&node, &command) {
                Ok(result) => {
                    output.write_all(&result.stdout)?;
                    output.write_all(&result.stderr)?;
                }
                Err(err) => writeln!(output, "*** Error: {err}")?,
            },
            ShellCommand::MissingNodeCommand(node) => {
                writeln!(output, "*** Enter a command for node: {node} <cmd>")?
            }
            ShellCommand::Unknown(word) => writeln!(output, "*** Unknown command: {word}")?,
        }
        Ok(())
    }

    /// `PUT <origin>/__har_server/reset` for every origin, sent from the
    /// name server node
    fn reset_servers<O: Write>(&self, output: &mut O) -> io::Result<()> {
        write!(output, "Resetting servers")?;
        output.flush()?;

        for host in &self.network.plan().commands {
            let result = self
                .network
                .command_in(DNS, reset_command(&host.origin))
                .and_then(|command| self.network.runner().output(&command).map_err(NetworkError::from));
            match result {
                Ok(status) if status.status.success() => {}
                Ok(status) => warn!(
                    "Reset of {} failed: {}",
                    host.origin,
                    String::from_utf8_lossy(&status.stderr).trim()
                ),
                Err(err) => warn!("Reset of {} failed: {}", host.origin, err),
            }
            write!(output, " .")?;
            output.flush()?;
        }

        writeln!(output, " Done")
    }
}

/// Feed lines from `input` through a channel so the prompt can keep
/// polling for signals while no input arrives
fn spawn_line_reader<I: BufRead + Send + 'static>(mut input: I) -> Receiver<io::Result<String>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match input.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if sender.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = sender.send(Err(err));
                    break;
                }
            }
        }
    });
    receiver
}
