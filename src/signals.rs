//! Signal handling for the interactive session.
//!
//! Handlers only set atomic flags; the shell loop and the main procedure
//! poll them. SIGINT interrupts the foreground command (which shares the
//! terminal's process group and dies of it) and returns to the prompt.
//! SIGTERM and SIGHUP request an orderly teardown.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Pending interrupt and shutdown requests
#[derive(Debug, Default)]
pub struct SignalFlags {
    interrupted: AtomicBool,
    shutdown: AtomicBool,
}

impl SignalFlags {
    pub const fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt arrived since the last call; clears it
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

static PROCESS_FLAGS: SignalFlags = SignalFlags::new();

/// Flags written by the installed handlers
pub fn process_flags() -> &'static SignalFlags {
    &PROCESS_FLAGS
}

extern "C" fn handle_signal(signal: libc::c_int) {
    if signal == Signal::SIGINT as libc::c_int {
        PROCESS_FLAGS.interrupt();
    } else {
        PROCESS_FLAGS.request_shutdown();
    }
}

/// Route SIGINT, SIGTERM and SIGHUP to [`process_flags`]
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // The handler only touches atomics
        unsafe {
            signal::sigaction(sig, &action)?;
        }
    }

    debug!("Signal handlers installed (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}
