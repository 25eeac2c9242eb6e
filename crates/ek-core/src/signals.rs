//! Signal forwarding for the lifetime of one child process.
//!
//! While a [`ChildScope`] is alive, SIGINT, SIGTERM, SIGHUP and SIGQUIT sent
//! to `ek` with `kill(2)` are relayed to the child. Terminal-generated signals
//! already reach the whole foreground process group, so they are swallowed
//! here instead of being delivered twice. Dropping the scope terminates and
//! reaps a child that is still running, then restores the previous handlers.

use std::io;
use std::process::{Child, Command, ExitStatus};

pub struct ChildScope {
    child: Child,
    reaped: bool,
    #[cfg(unix)]
    previous: Vec<(nix::sys::signal::Signal, nix::sys::signal::SigAction)>,
}

impl ChildScope {
    /// Spawn `cmd` with forwarding already armed. A signal that arrives
    /// before the child exists is swallowed rather than killing `ek`.
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        #[cfg(unix)]
        let previous = unix::install();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                #[cfg(unix)]
                unix::restore(&previous);
                return Err(e);
            }
        };
        #[cfg(unix)]
        unix::set_child(child.id());
        Ok(Self {
            child,
            reaped: false,
            #[cfg(unix)]
            previous,
        })
    }

    /// Block until the child exits.
    pub fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildScope {
    fn drop(&mut self) {
        if !self.reaped {
            if let Ok(None) = self.child.try_wait() {
                tracing::debug!(pid = self.child.id(), "terminating child");
                #[cfg(unix)]
                unix::terminate(self.child.id());
                #[cfg(not(unix))]
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
        #[cfg(unix)]
        unix::restore(&self.previous);
    }
}

#[cfg(unix)]
mod unix {
    use nix::libc;
    use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use nix::unistd::Pid;
    use std::sync::atomic::{AtomicI32, Ordering};

    const FORWARDED: [Signal; 4] = [
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGHUP,
        Signal::SIGQUIT,
    ];

    /// Pid of the child currently in scope, 0 when none.
    static CHILD_PID: AtomicI32 = AtomicI32::new(0);

    extern "C" fn forward(signo: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
        let pid = CHILD_PID.load(Ordering::SeqCst);
        if pid <= 0 {
            return;
        }
        // SAFETY: the kernel hands SA_SIGINFO handlers a valid siginfo_t.
        let user_sent = info.is_null() || unsafe { (*info).si_code } == libc::SI_USER;
        if user_sent {
            // SAFETY: kill(2) is async-signal-safe.
            unsafe {
                libc::kill(pid, signo);
            }
        }
    }

    /// Install the forwarders with no child recorded yet.
    pub(super) fn install() -> Vec<(Signal, SigAction)> {
        CHILD_PID.store(0, Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::SigAction(forward),
            SaFlags::SA_SIGINFO | SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        let mut previous = Vec::with_capacity(FORWARDED.len());
        for sig in FORWARDED {
            // SAFETY: `forward` only touches an atomic and calls kill(2).
            match unsafe { sigaction(sig, &action) } {
                Ok(old) => previous.push((sig, old)),
                Err(e) => tracing::warn!(signal = %sig, error = %e, "could not install signal forwarder"),
            }
        }
        previous
    }

    pub(super) fn set_child(pid: u32) {
        CHILD_PID.store(pid as i32, Ordering::SeqCst);
    }

    pub(super) fn terminate(pid: u32) {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM to child failed");
        }
    }

    pub(super) fn restore(previous: &[(Signal, SigAction)]) {
        CHILD_PID.store(0, Ordering::SeqCst);
        for (sig, old) in previous {
            // SAFETY: restoring the action that was in place before install().
            if let Err(e) = unsafe { sigaction(*sig, old) } {
                tracing::warn!(signal = %sig, error = %e, "could not restore signal handler");
            }
        }
    }
}
