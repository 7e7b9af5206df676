//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor orientado a eventos:
//!
//! - `poller`: epoll y los tokens que identifican cada descriptor
//! - `timer`: timer de inactividad por conexión (timerfd)
//! - `registry`: tabla de conexiones que esperan eventos
//! - `connection`: máquina de estados HTTP por cliente
//! - `files`: lectura de archivos estáticos vía mmap
//! - `cgi`: ejecución de recursos como subprocesos
//! - `reactor`: loop de eventos que une todo lo anterior

pub mod cgi;
pub mod connection;
pub mod files;
pub mod poller;
pub mod reactor;
pub mod registry;
pub mod timer;

pub use connection::{Connection, ConnectionSettings, Disposition, State};
pub use reactor::Reactor;
