//! # Tabla de Conexiones
//! src/server/registry.rs
//!
//! Dueña de las conexiones que están esperando eventos. Una conexión vive
//! aquí *o* en manos de un worker, nunca en ambos lados:
//!
//! ```text
//! evento -> take(id) -> worker ejecuta la pasada -> park(conn) -> evento ...
//! ```
//!
//! `park` re-arma los descriptores con el lock tomado, así el reactor no
//! puede ver el evento siguiente antes de que la conexión esté de vuelta en
//! la tabla.

use super::connection::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct Registry {
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Ids crecientes; nunca se reutilizan, así un evento viejo no puede
    /// caer en una conexión nueva
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra una conexión recién aceptada con el multiplexor y la guarda
    pub fn admit(&self, conn: Connection) -> bool {
        let mut connections = self.lock();
        if let Err(e) = conn.register() {
            tracing::error!(conn = conn.id(), error = %e, "cannot register connection");
            return false;
        }
        connections.insert(conn.id(), conn);
        true
    }

    /// Saca la conexión de la tabla para procesarla o destruirla
    pub fn take(&self, id: u64) -> Option<Connection> {
        self.lock().remove(&id)
    }

    /// Devuelve una conexión a la tabla y re-arma sus descriptores
    ///
    /// Si el re-armado falla la conexión se destruye.
    pub fn park(&self, conn: Connection) -> bool {
        let mut connections = self.lock();
        if let Err(e) = conn.rearm() {
            tracing::error!(conn = conn.id(), error = %e, "cannot re-arm connection");
            return false;
        }
        connections.insert(conn.id(), conn);
        true
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
