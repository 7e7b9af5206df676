//! # Timer de Inactividad
//! src/server/timer.rs
//!
//! Un timerfd one-shot por conexión. Se arma al empezar cada ciclo de
//! request; si dispara mientras la conexión espera bytes, el reactor la
//! destruye sin responder.

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

pub struct IdleTimer {
    fd: TimerFd,
    timeout: Duration,
}

impl IdleTimer {
    /// Crea el timer (no bloqueante, close-on-exec) sin armarlo
    pub fn new(timeout: Duration) -> io::Result<Self> {
        let fd = TimerFd::new(
            ClockId::CLOCK_BOOTTIME,
            TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
        )?;
        Ok(Self { fd, timeout })
    }

    /// (Re)arma el timer para que dispare dentro de `timeout`
    pub fn arm(&self) -> io::Result<()> {
        self.fd.set(
            Expiration::OneShot(TimeSpec::from(self.timeout)),
            TimerSetTimeFlags::empty(),
        )?;
        Ok(())
    }

    pub fn disarm(&self) -> io::Result<()> {
        self.fd.unset()?;
        Ok(())
    }

    /// `true` si el timer ya venció (o nunca se armó)
    ///
    /// Permite descartar notificaciones viejas: si entre medio alguien lo
    /// re-armó, todavía le queda tiempo y no está vencido.
    pub fn expired(&self) -> bool {
        match self.fd.get() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                tracing::warn!(error = %e, "timerfd_gettime failed");
                true
            }
        }
    }
}

impl AsFd for IdleTimer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
