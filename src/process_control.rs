use anyhow::{anyhow, Result};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Stop,
    Continue,
}

#[cfg(unix)]
impl From<ProcessSignal> for Signal {
    fn from(signal: ProcessSignal) -> Self {
        match signal {
            ProcessSignal::Stop => Signal::SIGSTOP,
            ProcessSignal::Continue => Signal::SIGCONT,
        }
    }
}

#[cfg(unix)]
pub fn signal_process(pid: u32, signal: ProcessSignal) -> Result<()> {
    let raw = i32::try_from(pid).map_err(|_| anyhow!("Invalid process id {pid}"))?;
    let sig = Signal::from(signal);
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(anyhow!("Process {pid} has already exited")),
        Err(err) => Err(anyhow!("Failed to send {sig} to process {pid}: {err}")),
    }
}

#[cfg(not(unix))]
pub fn signal_process(pid: u32, signal: ProcessSignal) -> Result<()> {
    Err(anyhow!(
        "Cannot send {signal:?} to process {pid}: pausing external processes is not supported on this platform"
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn signalling_a_missing_process_fails() {
        let err = signal_process(i32::MAX as u32, ProcessSignal::Continue).expect_err("no such process");
        assert!(format!("{err:#}").contains("already exited"));
    }

    #[test]
    fn out_of_range_pid_is_rejected() {
        assert!(signal_process(u32::MAX, ProcessSignal::Stop).is_err());
    }

    #[test]
    fn signals_map_to_stop_and_continue() {
        assert_eq!(Signal::from(ProcessSignal::Stop), Signal::SIGSTOP);
        assert_eq!(Signal::from(ProcessSignal::Continue), Signal::SIGCONT);
    }
}
