//! # Utilidades de I/O
//! src/io_util.rs
//!
//! Lectura y escritura sobre descriptores no bloqueantes, tolerando
//! `EINTR` y `EAGAIN`.

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::time::{Duration, Instant};

/// Resultado de leer hasta que el descriptor bloquearía
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// No hay más bytes por ahora; cuántos se leyeron en esta llamada
    Drained(usize),
    /// El otro extremo cerró (lectura de 0 bytes)
    Closed,
}

/// Lee de `reader` en bloques de `chunk` bytes hasta `WouldBlock`
///
/// Todo lo leído se agrega al final de `out`.
pub fn read_until_blocked<R: Read>(
    reader: &mut R,
    out: &mut Vec<u8>,
    chunk: usize,
) -> io::Result<ReadStatus> {
    let mut buf = vec![0u8; chunk];
    let mut total = 0;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                total += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadStatus::Drained(total)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Escribe `buf` completo, esperando escritura posible con `poll` ante `EAGAIN`
///
/// Falla con `TimedOut` si no se termina antes de `limit`.
pub fn write_all_within<W: Write + AsFd>(writer: &mut W, buf: &[u8], limit: Duration) -> io::Result<()> {
    let deadline = Instant::now() + limit;
    let mut written = 0;

    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !wait_writable(&*writer, remaining)? {
                    return Err(io::ErrorKind::TimedOut.into());
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Espera hasta que `fd` acepte escrituras; `false` si venció el tiempo
fn wait_writable<F: AsFd>(fd: &F, limit: Duration) -> io::Result<bool> {
    let millis = limit.as_millis().clamp(1, u16::MAX as u128) as u16;
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLOUT)];

    loop {
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Pone un descriptor en modo no bloqueante
pub fn set_nonblocking<F: AsFd>(fd: &F) -> io::Result<()> {
    let raw = fd.as_fd().as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}
