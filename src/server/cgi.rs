//! # Ejecutor CGI
//! src/server/cgi.rs
//!
//! Ejecuta un archivo de la raíz de documentos como subproceso:
//!
//! ```text
//!            body del POST                 stdout + stderr
//! servidor ---------------> [pipe] -> hijo -> [pipe] ---------------> body 200
//! ```
//!
//! El hijo corre en su propio grupo de procesos y muere si el servidor
//! muere. Un solo loop, con un solo plazo (`budget`) contado desde el
//! spawn, escribe el body en el stdin del hijo, drena su salida y lo sondea
//! cada `step`. Vencido el plazo le manda `SIGKILL` (al grupo y al pid)
//! hasta poder cosecharlo.
//!
//! Escribir y leer en el mismo loop evita el abrazo mortal de un filtro
//! como `cat`: con el pipe de salida lleno deja de leer su stdin.

use crate::error::HandlerError;
use crate::io_util::{self, ReadStatus};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::prctl;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Bloque de lectura de la salida del hijo
const OUTPUT_CHUNK: usize = 4096;

/// Límites de ejecución de un proceso CGI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgiLimits {
    /// Tiempo total que puede correr el proceso
    pub budget: Duration,
    /// Intervalo entre sondeos
    pub step: Duration,
}

impl Default for CgiLimits {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(1000),
            step: Duration::from_millis(1),
        }
    }
}

fn internal(what: &str, err: impl std::fmt::Display) -> HandlerError {
    tracing::error!(error = %err, "{}", what);
    HandlerError::Internal
}

/// Ejecuta `path` con `body` como stdin y devuelve lo que escribió
///
/// Cualquier falla de recursos, un body que no se pudo entregar completo,
/// un proceso que excede el presupuesto o una salida vacía terminan en
/// `Internal`.
pub fn execute(path: &Path, body: &[u8], limits: &CgiLimits) -> Result<Vec<u8>, HandlerError> {
    let (stdin_read, stdin_write) =
        unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| internal("cannot create stdin pipe", e))?;
    let (output_read, output_write) =
        unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| internal("cannot create output pipe", e))?;
    let stderr_write = output_write
        .try_clone()
        .map_err(|e| internal("cannot duplicate output pipe", e))?;

    // Los extremos del padre son descripciones propias: O_NONBLOCK no
    // alcanza a los del hijo
    let stdin_pipe = File::from(stdin_write);
    let mut output_pipe = File::from(output_read);
    io_util::set_nonblocking(&stdin_pipe)
        .and_then(|_| io_util::set_nonblocking(&output_pipe))
        .map_err(|e| internal("cannot configure CGI pipes", e))?;

    let mut command = Command::new(path);
    command
        .stdin(Stdio::from(stdin_read))
        .stdout(Stdio::from(output_write))
        .stderr(Stdio::from(stderr_write))
        .process_group(0);
    // SAFETY: prctl es una syscall directa, segura entre fork y exec.
    unsafe {
        command.pre_exec(|| {
            prctl::set_pdeathsig(Signal::SIGKILL).map_err(io::Error::from)
        });
    }

    let spawned = command.spawn();
    // Cierra los extremos del hijo en el padre; sin esto nunca llega EOF
    drop(command);
    let mut child = spawned.map_err(|e| internal("cannot spawn CGI process", e))?;
    let deadline = Instant::now() + limits.budget;
    let pid = Pid::from_raw(child.id() as i32);
    tracing::debug!(path = %path.display(), pid = pid.as_raw(), "CGI process started");

    let mut feeder = Feeder::new(stdin_pipe, body);
    feeder.pump();

    let mut output = Vec::new();
    let killed = supervise(
        &mut child,
        pid,
        &mut feeder,
        &mut output_pipe,
        &mut output,
        deadline,
        limits.step,
    )?;
    drain(&mut output_pipe, &mut output);

    if killed {
        tracing::warn!(path = %path.display(), "CGI process killed after exceeding its budget");
        return Err(HandlerError::Internal);
    }
    if !feeder.complete() {
        tracing::warn!(
            path = %path.display(),
            unsent = feeder.unsent(),
            "CGI process did not take the whole request body"
        );
        return Err(HandlerError::Internal);
    }
    if output.is_empty() {
        tracing::warn!(path = %path.display(), "CGI process produced no output");
        return Err(HandlerError::Internal);
    }
    Ok(output)
}

/// Extremo del padre del stdin del hijo
///
/// Se cierra apenas se escribió todo el body, así el hijo ve EOF.
struct Feeder<'a> {
    pipe: Option<File>,
    pending: &'a [u8],
    failed: bool,
}

impl<'a> Feeder<'a> {
    fn new(pipe: File, body: &'a [u8]) -> Self {
        let pipe = (!body.is_empty()).then_some(pipe);
        Self {
            pipe,
            pending: body,
            failed: false,
        }
    }

    /// Escribe lo que el pipe acepte sin bloquear
    fn pump(&mut self) {
        let Some(pipe) = self.pipe.as_mut() else {
            return;
        };
        while !self.pending.is_empty() {
            match pipe.write(self.pending) {
                Ok(0) => return self.fail(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.pending = &self.pending[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return self.fail(e),
            }
        }
        self.pipe = None;
    }

    fn fail(&mut self, err: io::Error) {
        tracing::warn!(error = %err, unsent = self.pending.len(), "writing request body to CGI failed");
        self.failed = true;
        self.pipe = None;
    }

    fn close(&mut self) {
        self.pipe = None;
    }

    fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.pipe.as_ref().map(|pipe| pipe.as_fd())
    }

    fn unsent(&self) -> usize {
        self.pending.len()
    }

    fn complete(&self) -> bool {
        !self.failed && self.pending.is_empty()
    }
}

/// Sondea al hijo hasta cosecharlo; `true` si hubo que matarlo
fn supervise(
    child: &mut Child,
    pid: Pid,
    feeder: &mut Feeder<'_>,
    pipe: &mut File,
    output: &mut Vec<u8>,
    deadline: Instant,
    step: Duration,
) -> Result<bool, HandlerError> {
    let mut killed = false;
    let mut output_open = true;

    loop {
        wait_ready(output_open.then_some(&*pipe), feeder.fd(), step);
        feeder.pump();
        if output_open {
            output_open = drain(pipe, output);
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = pid.as_raw(), %status, "CGI process exited");
                return Ok(killed);
            }
            Ok(None) if Instant::now() >= deadline => {
                terminate(pid);
                feeder.close();
                killed = true;
            }
            Ok(None) => {}
            Err(e) => {
                terminate(pid);
                return Err(internal("waitpid on CGI process failed", e));
            }
        }
    }
}

/// Espera hasta `step` a que haya salida para leer o lugar en el stdin
fn wait_ready(output: Option<&File>, input: Option<BorrowedFd<'_>>, step: Duration) {
    let mut fds = Vec::with_capacity(2);
    if let Some(pipe) = output {
        fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
    }
    if let Some(fd) = input {
        fds.push(PollFd::new(fd, PollFlags::POLLOUT));
    }
    if fds.is_empty() {
        thread::sleep(step);
        return;
    }

    let millis = step.as_millis().clamp(1, u16::MAX as u128) as u16;
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(_) | Err(Errno::EINTR) => {}
        Err(e) => {
            tracing::warn!(error = %e, "poll on CGI pipes failed");
            thread::sleep(step);
        }
    }
}

/// Lee lo disponible; `false` si el pipe llegó a EOF
fn drain(pipe: &mut File, output: &mut Vec<u8>) -> bool {
    match io_util::read_until_blocked(pipe, output, OUTPUT_CHUNK) {
        Ok(ReadStatus::Drained(_)) => true,
        Ok(ReadStatus::Closed) => false,
        Err(e) => {
            tracing::warn!(error = %e, "reading CGI output failed");
            false
        }
    }
}

/// Manda `SIGKILL` al grupo del hijo y al hijo
///
/// Al grupo solo si el hijo ya es su líder: hasta que el hijo llama a
/// setpgid su pgid sigue siendo el del servidor. Si lo llama después de este
/// chequeo los nietos sobreviven; el pid igual recibe la señal.
fn terminate(pid: Pid) {
    if unistd::getpgid(Some(pid)) == Ok(pid) {
        if let Err(e) = signal::killpg(pid, Signal::SIGKILL) {
            tracing::debug!(pid = pid.as_raw(), error = %e, "killpg failed");
        }
    }
    if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
        tracing::debug!(pid = pid.as_raw(), error = %e, "kill failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_echoes_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo.sh", "cat");

        let out = execute(&path, b"hello cgi", &CgiLimits::default()).unwrap();
        assert_eq!(out, b"hello cgi");
    }

    #[test]
    fn test_stderr_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "err.sh", "echo oops 1>&2");

        let out = execute(&path, b"", &CgiLimits::default()).unwrap();
        assert_eq!(out, b"oops\n");
    }

    #[test]
    fn test_empty_output_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "quiet.sh", "exit 0");

        assert!(matches!(
            execute(&path, b"ignored", &CgiLimits::default()),
            Err(HandlerError::Internal)
        ));
    }

    #[test]
    fn test_runaway_process_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "slow.sh", "echo partial\nexec sleep 30");
        let limits = CgiLimits {
            budget: Duration::from_millis(200),
            step: Duration::from_millis(5),
        };

        let started = Instant::now();
        let result = execute(&path, b"", &limits);
        assert!(matches!(result, Err(HandlerError::Internal)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_large_output_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        // Más que la capacidad de un pipe
        let path = script(dir.path(), "big.sh", "head -c 200000 /dev/zero");
        let limits = CgiLimits {
            budget: Duration::from_secs(5),
            step: Duration::from_millis(1),
        };

        let out = execute(&path, b"", &limits).unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[test]
    fn test_filter_echoes_body_larger_than_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "cat.sh", "cat");
        let body: Vec<u8> = (0..1_048_576u32).map(|i| (i % 253) as u8).collect();
        let limits = CgiLimits {
            budget: Duration::from_secs(5),
            step: Duration::from_millis(1),
        };

        let out = execute(&path, &body, &limits).unwrap();
        assert_eq!(out.len(), body.len());
        assert!(out == body);
    }

    #[test]
    fn test_budget_covers_body_delivery() {
        let dir = tempfile::tempdir().unwrap();
        // Nunca lee su stdin: el body queda a medio escribir
        let path = script(dir.path(), "deaf.sh", "exec sleep 30");
        let body = vec![b'x'; 1_048_576];
        let limits = CgiLimits {
            budget: Duration::from_millis(300),
            step: Duration::from_millis(5),
        };

        let started = Instant::now();
        assert!(matches!(execute(&path, &body, &limits), Err(HandlerError::Internal)));
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[test]
    fn test_unread_body_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "partial.sh", "head -c 10 >/dev/null\necho done");
        let body = vec![b'y'; 1_048_576];

        assert!(matches!(
            execute(&path, &body, &CgiLimits::default()),
            Err(HandlerError::Internal)
        ));
    }

    #[test]
    fn test_missing_executable_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            execute(&dir.path().join("missing"), b"", &CgiLimits::default()),
            Err(HandlerError::Internal)
        ));
    }
}
