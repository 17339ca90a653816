//! Ctrl-C handling and terminal echo control.
//!
//! The signal handler only raises a flag. The shell notices it (its blocking read returns
//! `Interrupted` because the handler is installed without `SA_RESTART`) and runs the normal
//! exit path from ordinary code.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static HANDLER_SHUTDOWN: OnceLock<Shutdown> = OnceLock::new();

/// Shared "please exit" request.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
extern "C" fn on_interrupt(_sig: libc::c_int) {
    if let Some(shutdown) = HANDLER_SHUTDOWN.get() {
        shutdown.request();
    }
}

/// Routes SIGINT and SIGTERM to `shutdown`. Only the first call in a process takes effect.
#[cfg(unix)]
pub fn install_interrupt_handler(shutdown: &Shutdown) -> io::Result<()> {
    if HANDLER_SHUTDOWN.set(shutdown.clone()).is_err() {
        return Ok(());
    }
    for sig in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic store on a flag that lives for the
        // rest of the process.
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(sig, &action, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler(shutdown: &Shutdown) -> io::Result<()> {
    let _ = HANDLER_SHUTDOWN.set(shutdown.clone());
    Ok(())
}

/// True if stdin is a terminal.
pub fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Restores the saved terminal mode when dropped.
pub struct EchoGuard {
    #[cfg(unix)]
    saved: Option<libc::termios>,
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(saved) = self.saved.take() {
                unsafe {
                    libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
                }
            }
        }
    }
}

/// Turns off terminal echo on stdin until the guard is dropped. No-op when stdin is not a TTY.
pub fn disable_echo() -> EchoGuard {
    #[cfg(unix)]
    {
        if !stdin_is_tty() {
            return EchoGuard { saved: None };
        }
        unsafe {
            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut term) != 0 {
                return EchoGuard { saved: None };
            }
            let saved = term;
            term.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) != 0 {
                return EchoGuard { saved: None };
            }
            EchoGuard { saved: Some(saved) }
        }
    }
    #[cfg(not(unix))]
    {
        EchoGuard {}
    }
}
