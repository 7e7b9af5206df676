//! # Reactor
//! src/server/reactor.rs
//!
//! Loop principal del servidor. Un único thread espera eventos de epoll y
//! reparte el trabajo:
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   listener ──>  │ accept hasta EAGAIN -> Connection -> tabla   │
//!   socket   ──>  │ take(id) -> mudo el timer -> pool.submit()   │ ──> worker: run() -> park / drop
//!   timer    ──>  │ take(id) -> vencido? drop : park             │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! El reactor nunca lee ni escribe sockets de clientes.

use super::connection::{Connection, ConnectionSettings, Disposition};
use super::poller::{listener_interest, Poller, Token, MAX_EVENTS};
use super::registry::Registry;
use crate::config::Config;
use crate::workers::{ShutdownMode, Task, WorkerPool};
use anyhow::Context;
use nix::errno::Errno;
use nix::sys::epoll::{EpollEvent, EpollFlags};
use std::fs::File;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

/// Máximo de conexiones que se aceptan y cierran al quedarse sin descriptores
const MAX_SHED: usize = 1024;

const IDLE_FD_PATH: &str = "/dev/null";

pub struct Reactor {
    listener: TcpListener,
    poller: Arc<Poller>,
    registry: Arc<Registry>,
    pool: WorkerPool,
    settings: Arc<ConnectionSettings>,
    /// Descriptor de reserva para poder aceptar (y cerrar) con EMFILE
    idle_fd: Option<File>,
}

impl Reactor {
    /// Prepara el socket de escucha, el multiplexor y el pool de workers
    pub fn bind(config: &Config) -> anyhow::Result<Self> {
        let root = config
            .canonical_root()
            .with_context(|| format!("invalid document root {}", config.document_root.display()))?;

        let listener = TcpListener::bind(config.address())
            .with_context(|| format!("cannot bind {}", config.address()))?;
        listener
            .set_nonblocking(true)
            .context("cannot make listener non-blocking")?;

        let poller = Arc::new(Poller::new().context("cannot create epoll instance")?);
        poller
            .add(&listener, Token::Listener, listener_interest())
            .context("cannot register listener")?;

        let pool = WorkerPool::new(config.workers, config.queue_capacity, ShutdownMode::Graceful)
            .context("cannot start worker pool")?;
        let idle_fd = File::open(IDLE_FD_PATH).context("cannot open idle descriptor")?;

        tracing::info!(root = %root.display(), "document root");

        Ok(Self {
            listener,
            poller,
            registry: Arc::new(Registry::new()),
            pool,
            settings: Arc::new(ConnectionSettings::from_config(config, root)),
            idle_fd: Some(idle_fd),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Atiende eventos hasta que epoll falle
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut events = vec![EpollEvent::empty(); MAX_EVENTS];

        loop {
            let ready = match self.poller.wait(&mut events) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(anyhow::Error::new(e).context("epoll_wait failed")),
            };

            for event in &events[..ready] {
                self.handle_event(event.data(), event.events());
            }
        }
    }

    fn handle_event(&mut self, data: u64, flags: EpollFlags) {
        match Token::from_u64(data) {
            Token::Listener => self.accept_connections(),
            Token::Client(id) => self.handle_readable(id, flags),
            Token::Timer(id) => self.handle_timer(id, flags),
        }
    }

    /// Acepta hasta que no queden conexiones pendientes
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.admit(stream) {
                        if is_fd_exhaustion(&e) {
                            self.shed_pending();
                            break;
                        }
                        tracing::error!(error = %e, "cannot set up connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue
                }
                Err(e) if is_fd_exhaustion(&e) => {
                    self.shed_pending();
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream) -> io::Result<()> {
        let id = self.registry.next_id();
        let conn = Connection::new(id, stream, &self.poller, Arc::clone(&self.settings))?;
        conn.log_status("new connection");
        self.registry.admit(conn);
        Ok(())
    }

    /// Sin descriptores libres: suelta el de reserva, acepta y cierra lo
    /// pendiente, y lo vuelve a abrir
    fn shed_pending(&mut self) {
        self.idle_fd = None;

        let mut dropped = 0;
        while dropped < MAX_SHED {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    drop(stream);
                    dropped += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        self.idle_fd = match File::open(IDLE_FD_PATH) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::error!(error = %e, "cannot reopen idle descriptor");
                None
            }
        };
        tracing::warn!(dropped, "out of file descriptors, dropped pending connections");
    }

    /// Socket con datos: pasa la conexión a un worker
    fn handle_readable(&self, id: u64, flags: EpollFlags) {
        let Some(conn) = self.registry.take(id) else {
            tracing::debug!(conn = id, "event for unknown connection");
            return;
        };

        if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLRDHUP) {
            tracing::info!(conn = id, "peer hung up");
            return;
        }
        if flags.contains(EpollFlags::EPOLLERR) || !flags.contains(EpollFlags::EPOLLIN) {
            tracing::error!(conn = id, ?flags, "socket error");
            return;
        }

        // Mientras el worker trabaja el timer no debe destruir la conexión
        if let Err(e) = conn.mute_timer() {
            tracing::error!(conn = id, error = %e, "cannot mute idle timer");
            return;
        }

        let registry = Arc::clone(&self.registry);
        let task = Task::new(move || {
            let mut conn = conn;
            conn.log_status("new message");
            match conn.run() {
                Disposition::KeepOpen => {
                    registry.park(conn);
                }
                Disposition::Close => drop(conn),
            }
        });

        if let Err(e) = self.pool.submit(task) {
            tracing::warn!(conn = id, "dropping connection: {}", e);
        }
    }

    /// Timer disparado: si de verdad venció, la conexión muere sin respuesta
    fn handle_timer(&self, id: u64, flags: EpollFlags) {
        let Some(conn) = self.registry.take(id) else {
            tracing::debug!(conn = id, "timer for unknown connection");
            return;
        };

        if flags.contains(EpollFlags::EPOLLERR) {
            tracing::error!(conn = id, "timer error");
            return;
        }
        if conn.timer_expired() {
            tracing::info!(conn = id, peer = conn.peer(), "idle timeout");
            return;
        }

        // Notificación vieja: el timer se re-armó después de disparar
        self.registry.park(conn);
    }
}

fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == Errno::EMFILE as i32 || code == Errno::ENFILE as i32
    )
}
