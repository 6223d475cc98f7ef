//! Long-running processes started inside the emulated network.

use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

/// Time a process gets to exit after SIGTERM before it is killed
const TERM_GRACE: Duration = Duration::from_secs(2);

/// A child process that is terminated when the network is stopped.
///
/// The child runs in its own process group, so signals reach whatever the
/// configured shell command forked as well.
pub struct ManagedProcess {
    label: String,
    child: Child,
}

impl ManagedProcess {
    pub fn new(label: impl Into<String>, child: Child) -> Self {
        let label = label.into();
        debug!("{} started with pid {}", label, child.id());
        Self { label, child }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_alive(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Exit code if the process has already exited
    pub fn exit_code(&mut self) -> Option<Option<i32>> {
        self.child.try_wait().ok().flatten().map(|status| status.code())
    }

    /// Send SIGTERM to the process group, wait briefly, then SIGKILL.
    ///
    /// The group is signalled even when the leader has already exited, so
    /// anything the command left running in the background is stopped too.
    pub fn stop(&mut self) {
        let group = self.group();
        if !self.is_alive() && !group_alive(group) {
            debug!("{} already exited", self.label);
            return;
        }

        info!("Stopping {}", self.label);
        signal_group(group, Signal::SIGTERM);

        let deadline = Instant::now() + TERM_GRACE;
        while Instant::now() < deadline {
            if !self.is_alive() && !group_alive(group) {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }

        warn!("{} ignored SIGTERM, killing", self.label);
        signal_group(group, Signal::SIGKILL);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn group(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!("Failed to send {} to process group {}: {}", signal, group, err),
    }
}

/// Whether any process is left in the group
fn group_alive(group: Pid) -> bool {
    !matches!(killpg(group, None), Err(Errno::ESRCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{CommandRunner, CommandSpec, SystemRunner};

    #[test]
    fn test_stop_terminates_process_group() {
        let child = SystemRunner
            .spawn(&CommandSpec::shell("sleep 30 & sleep 30"), None)
            .unwrap()
            .unwrap();
        let mut process = ManagedProcess::new("sleeper", child);
        assert!(process.is_alive());

        process.stop();
        assert!(!process.is_alive());
        assert!(process.exit_code().is_some());
    }

    #[test]
    fn test_stop_after_exit_is_noop() {
        let child = SystemRunner.spawn(&CommandSpec::new("true"), None).unwrap().unwrap();
        let mut process = ManagedProcess::new("short", child);
        thread::sleep(Duration::from_millis(500));
        process.stop();
        assert_eq!(process.exit_code(), Some(Some(0)));
        assert_eq!(process.label(), "short");
    }

    /// Processes whose command line contains `needle`; zombies have none
    fn running_with(needle: &str) -> usize {
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|entry| std::fs::read(entry.ok()?.path().join("cmdline")).ok())
            .filter(|cmdline| String::from_utf8_lossy(cmdline).contains(needle))
            .count()
    }

    #[test]
    fn test_stop_reaches_background_children_of_exited_leader() {
        let child = SystemRunner
            .spawn(&CommandSpec::shell("sleep 27.1828 & exit 0"), None)
            .unwrap()
            .unwrap();
        let mut process = ManagedProcess::new("detached", child);
        thread::sleep(Duration::from_millis(300));
        assert!(!process.is_alive());
        assert_eq!(running_with("sleep\027.1828"), 1);

        process.stop();
        assert_eq!(running_with("sleep\027.1828"), 0);
    }
}
