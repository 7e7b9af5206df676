//! # Conexión HTTP
//! src/server/connection.rs
//!
//! Estado por cliente y la máquina de estados que lo avanza. Cada vez que el
//! socket tiene datos, un worker ejecuta una *pasada* (`Connection::run`):
//!
//! ```text
//! leer ──> PARSE_URI ──> PARSE_HEADER ──> PARSE_BODY ──> ANALYZE ──> FINISHED
//!              │              │               │             │
//!              └──────────────┴───────┬───────┴─────────────┘
//!                                     │
//!                     Again: se espera la próxima pasada
//!                     error de cliente/recurso: ERROR (+ página de error)
//!                     error fatal o reintentos agotados: FATAL
//! ```
//!
//! Al terminar un request con keep-alive la conexión se reinicia y vuelve a
//! esperar. Los bytes de un request siguiente que ya estén en el buffer se
//! procesan en la misma pasada.

use super::cgi::{self, CgiLimits};
use super::files;
use super::poller::{client_interest, timer_interest, Poller, Token};
use super::timer::IdleTimer;
use crate::config::Config;
use crate::error::{ErrorKind, HandlerError};
use crate::http::request::{self, Method, RequestLine};
use crate::http::{mime, path, KeepAlive, Response, StatusCode};
use crate::io_util::{self, ReadStatus};
use crate::logging::escape_for_log;
use nix::sys::epoll::EpollFlags;
use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Máximo de bytes de request/response que se vuelcan al log
const LOG_PREVIEW: usize = 512;

/// Parámetros compartidos por todas las conexiones
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Raíz de documentos, ya canónica
    pub root: PathBuf,
    pub request_timeout: Duration,
    pub max_again: u32,
    pub read_chunk: usize,
    pub cgi: CgiLimits,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config, root: PathBuf) -> Self {
        Self {
            root,
            request_timeout: config.request_timeout(),
            max_again: config.max_again,
            read_chunk: config.read_chunk,
            cgi: CgiLimits {
                budget: config.cgi_budget(),
                step: config.cgi_step(),
            },
        }
    }
}

/// Estado del procesamiento del request en curso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ParseUri,
    ParseHeader,
    ParseBody,
    Analyze,
    Finished,
    Error,
    Fatal,
}

/// Qué hacer con la conexión al final de una pasada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Volver a esperar eventos
    KeepOpen,
    /// Destruir la conexión
    Close,
}

pub struct Connection {
    id: u64,
    stream: TcpStream,
    timer: IdleTimer,
    poller: Weak<Poller>,
    settings: Arc<ConnectionSettings>,
    peer: String,

    state: State,
    buffer: Vec<u8>,
    cursor: usize,
    request: Option<RequestLine>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    retries_left: u32,
    keep_alive: bool,
}

impl Connection {
    /// Prepara una conexión recién aceptada (todavía sin registrar)
    pub fn new(
        id: u64,
        stream: TcpStream,
        poller: &Arc<Poller>,
        settings: Arc<ConnectionSettings>,
    ) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let timer = IdleTimer::new(settings.request_timeout)?;
        timer.arm()?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let retries_left = settings.max_again;

        Ok(Self {
            id,
            stream,
            timer,
            poller: Arc::downgrade(poller),
            settings,
            peer,
            state: State::ParseUri,
            buffer: Vec::new(),
            cursor: 0,
            request: None,
            headers: HashMap::new(),
            body: Vec::new(),
            retries_left,
            keep_alive: true,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn poller(&self) -> io::Result<Arc<Poller>> {
        self.poller
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "poller is gone"))
    }

    /// Registra socket y timer con el multiplexor
    pub fn register(&self) -> io::Result<()> {
        let poller = self.poller()?;
        poller.add(&self.stream, Token::Client(self.id), client_interest())?;
        poller.add(&self.timer, Token::Timer(self.id), timer_interest())
    }

    /// Vuelve a habilitar las notificaciones one-shot de socket y timer
    pub fn rearm(&self) -> io::Result<()> {
        let poller = self.poller()?;
        poller.modify(&self.timer, Token::Timer(self.id), timer_interest())?;
        poller.modify(&self.stream, Token::Client(self.id), client_interest())
    }

    /// Silencia el timer mientras un worker procesa la conexión
    pub fn mute_timer(&self) -> io::Result<()> {
        self.poller()?
            .modify(&self.timer, Token::Timer(self.id), EpollFlags::empty())
    }

    pub fn timer_expired(&self) -> bool {
        self.timer.expired()
    }

    /// Registra direcciones local y remota
    pub fn log_status(&self, what: &str) {
        let local = self
            .stream
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(conn = self.id, local = %local, peer = %self.peer, "{}", what);
    }

    /// Prepara la conexión para el próximo request
    ///
    /// Con `keep_leftover` se conservan los bytes que siguen al request
    /// recién terminado; si no, el buffer se descarta entero.
    fn reset(&mut self, keep_leftover: bool) {
        debug_assert!(self.cursor <= self.buffer.len());
        if keep_leftover {
            self.buffer.drain(..self.cursor);
        } else {
            self.buffer.clear();
        }
        self.cursor = 0;
        self.state = State::ParseUri;
        self.request = None;
        self.headers.clear();
        self.body.clear();
        self.retries_left = self.settings.max_again;

        if let Err(e) = self.timer.arm() {
            tracing::warn!(conn = self.id, error = %e, "cannot re-arm idle timer");
        }
    }

    /// Ejecuta una pasada completa de la máquina de estados
    pub fn run(&mut self) -> Disposition {
        let read = self.read_request();
        if !self.dispatch(read) {
            return Disposition::Close;
        }

        loop {
            self.advance();

            match self.state {
                State::Finished | State::Error => {
                    if !self.keep_alive {
                        return Disposition::Close;
                    }
                    let finished = self.state == State::Finished;
                    self.reset(finished);
                    if self.buffer.is_empty() {
                        return Disposition::KeepOpen;
                    }
                    tracing::debug!(conn = self.id, pending = self.buffer.len(), "pipelined request");
                }
                State::Fatal => return Disposition::Close,
                _ => return Disposition::KeepOpen,
            }
        }
    }

    /// Avanza por los pasos del parser hasta que uno no se complete
    fn advance(&mut self) {
        if self.state == State::ParseUri {
            let result = self.parse_uri();
            if self.dispatch(result) {
                self.state = State::ParseHeader;
            }
        }

        if self.state == State::ParseHeader {
            let result = request::parse_headers(&self.buffer, &mut self.cursor, &mut self.headers);
            if self.dispatch(result) {
                self.state = State::ParseBody;
            }
        }

        if self.state == State::ParseBody {
            let is_post = matches!(&self.request, Some(line) if line.method == Method::POST);
            if !is_post {
                // GET/HEAD no consumen body
                self.state = State::Analyze;
            } else {
                let result = request::parse_body(&self.buffer, &mut self.cursor, &self.headers)
                    .map(|body| self.body = body);
                if self.dispatch(result) {
                    self.state = State::Analyze;
                }
            }
        }

        if self.state == State::Analyze {
            let result = self.handle_request();
            if self.dispatch(result) {
                self.state = State::Finished;
            }
        }
    }

    /// Traduce el resultado de un paso a una transición
    ///
    /// Retorna `true` si el paso se completó.
    fn dispatch(&mut self, result: Result<(), HandlerError>) -> bool {
        let err = match result {
            Ok(()) => return true,
            Err(err) => err,
        };

        match err.kind() {
            ErrorKind::Incomplete => {
                self.retries_left = self.retries_left.saturating_sub(1);
                tracing::debug!(conn = self.id, retries_left = self.retries_left, state = ?self.state, "{}", err);
                if self.retries_left == 0 {
                    tracing::warn!(conn = self.id, "reached max read attempts, closing");
                    self.state = State::Fatal;
                }
            }
            ErrorKind::Fatal => {
                if matches!(err, HandlerError::ConnectionClosed) {
                    tracing::info!(conn = self.id, "{}", err);
                } else {
                    tracing::error!(conn = self.id, "{}", err);
                }
                self.state = State::Fatal;
            }
            ErrorKind::Client | ErrorKind::Resource => {
                tracing::warn!(conn = self.id, state = ?self.state, "{}", err);
                if let Some(status) = err.status() {
                    self.send_error(status);
                }
                self.state = State::Error;
            }
        }
        false
    }

    /// Lee todo lo disponible en el socket al buffer
    fn read_request(&mut self) -> Result<(), HandlerError> {
        let before = self.buffer.len();
        let status = io_util::read_until_blocked(&mut self.stream, &mut self.buffer, self.settings.read_chunk)
            .map_err(HandlerError::ReadFailed)?;

        if self.buffer.len() > before {
            tracing::debug!(
                conn = self.id,
                bytes = self.buffer.len() - before,
                data = %escape_for_log(&self.buffer[before..], LOG_PREVIEW),
                "received"
            );
        }

        match status {
            ReadStatus::Closed => Err(HandlerError::ConnectionClosed),
            ReadStatus::Drained(_) => Ok(()),
        }
    }

    fn parse_uri(&mut self) -> Result<(), HandlerError> {
        let (line, consumed) = request::parse_request_line(&self.buffer, &self.settings.root)?;
        tracing::info!(
            conn = self.id,
            method = line.method.as_str(),
            path = %line.path.display(),
            version = line.version.as_str(),
            "request"
        );
        self.cursor = consumed;
        self.request = Some(line);
        Ok(())
    }

    /// Resuelve, ejecuta y responde el request ya parseado
    fn handle_request(&mut self) -> Result<(), HandlerError> {
        let (method, version, target) = match &self.request {
            Some(line) => (line.method, line.version, line.path.clone()),
            None => return Err(HandlerError::Internal),
        };
        self.keep_alive = request::is_keep_alive(version, &self.headers);
        let target = resolve_file(&self.settings.root, target)?;

        let response = match method {
            Method::GET | Method::HEAD => {
                let body = files::read_file(&target)?;
                let content_type = mime::content_type_for_path(&target.to_string_lossy());
                Response::new(StatusCode::Ok)
                    .with_content_type(content_type)
                    .with_body(body)
            }
            Method::POST => {
                let output = cgi::execute(&target, &self.body, &self.settings.cgi)?;
                Response::new(StatusCode::Ok)
                    .with_content_type(mime::DEFAULT_CONTENT_TYPE)
                    .with_body(output)
            }
        };

        self.send(response)
    }

    fn is_head(&self) -> bool {
        matches!(&self.request, Some(line) if line.method == Method::HEAD)
    }

    /// Escribe una respuesta completa, con el header de persistencia que toque
    fn send(&mut self, response: Response) -> Result<(), HandlerError> {
        let keep_alive = self.keep_alive.then(|| KeepAlive {
            timeout_secs: self.settings.request_timeout.as_secs(),
            max: self.retries_left,
        });
        let response = response
            .with_keep_alive(keep_alive)
            .without_body(self.is_head());
        let bytes = response.to_bytes();

        io_util::write_all_within(&mut self.stream, &bytes, self.settings.request_timeout)
            .map_err(HandlerError::SendFailed)?;

        tracing::info!(conn = self.id, status = %response.status(), bytes = bytes.len(), "response sent");
        tracing::debug!(conn = self.id, data = %escape_for_log(&bytes, LOG_PREVIEW), "sent");
        Ok(())
    }

    /// Página de error; si no se puede enviar solo se registra
    fn send_error(&mut self, status: StatusCode) {
        if let Err(e) = self.send(Response::error(status)) {
            tracing::warn!(conn = self.id, status = %status, "cannot send error page: {}", e);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.upgrade() {
            let _ = poller.delete(&self.stream);
            let _ = poller.delete(&self.timer);
        }
        tracing::info!(conn = self.id, peer = %self.peer, "connection closed");
    }
}

/// Para un directorio sirve su `index.html`, que también debe quedar
/// dentro de la raíz. Solo se sirven archivos regulares.
fn resolve_file(root: &Path, target: PathBuf) -> Result<PathBuf, HandlerError> {
    let metadata = std::fs::metadata(&target).map_err(|e| stat_error(&target, e))?;
    let (target, metadata) = if metadata.is_dir() {
        let index = target.join("index.html");
        let metadata = std::fs::metadata(&index).map_err(|e| stat_error(&index, e))?;
        if !path::is_path_parent(root, &index) {
            return Err(HandlerError::NotFound);
        }
        (index, metadata)
    } else {
        (target, metadata)
    };

    // FIFOs, sockets y dispositivos bloquearían al worker en el open
    if !metadata.is_file() {
        tracing::warn!(path = %target.display(), "not a regular file");
        return Err(HandlerError::NotFound);
    }
    Ok(target)
}

fn stat_error(target: &Path, err: io::Error) -> HandlerError {
    if err.kind() == io::ErrorKind::NotFound {
        HandlerError::NotFound
    } else {
        tracing::error!(path = %target.display(), error = %err, "stat failed");
        HandlerError::Internal
    }
}
