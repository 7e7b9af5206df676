//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor HTTP leída desde argumentos CLI y variables
//! de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./server 8080 ./www \
//!   --workers 8 \
//!   --queue-capacity 1024 \
//!   --request-timeout 10 \
//!   --cgi-budget 1000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_WORKERS=16 HTTP_LOG_LEVEL=debug ./server 8080 ./www
//! ```

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Configuración del servidor HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "server")]
#[command(about = "Servidor HTTP/1.1 de archivos estáticos y CGI sobre epoll")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    pub port: u16,

    /// Directorio raíz de documentos (todo lo servido/ejecutado vive debajo)
    #[arg(default_value = ".")]
    pub document_root: PathBuf,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    // === Workers ===

    /// Número de workers del pool
    #[arg(long, default_value = "8", env = "HTTP_WORKERS")]
    pub workers: usize,

    /// Capacidad máxima de la cola de tareas
    #[arg(long = "queue-capacity", default_value = "1024", env = "HTTP_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    // === Conexiones ===

    /// Tiempo máximo de inactividad por request, en segundos
    #[arg(long = "request-timeout", default_value = "10", env = "HTTP_REQUEST_TIMEOUT")]
    pub request_timeout_secs: u64,

    /// Cuántas veces se tolera "faltan datos" antes de cerrar la conexión
    #[arg(long = "max-again", default_value = "10", env = "HTTP_MAX_AGAIN")]
    pub max_again: u32,

    /// Tamaño de cada lectura del socket, en bytes
    #[arg(long = "read-chunk", default_value = "1024", env = "HTTP_READ_CHUNK")]
    pub read_chunk: usize,

    // === CGI ===

    /// Tiempo total que puede correr un proceso CGI, en milisegundos
    #[arg(long = "cgi-budget", default_value = "1000", env = "HTTP_CGI_BUDGET_MS")]
    pub cgi_budget_ms: u64,

    /// Intervalo entre sondeos del proceso CGI, en milisegundos
    #[arg(long = "cgi-step", default_value = "1", env = "HTTP_CGI_STEP_MS")]
    pub cgi_step_ms: u64,

    // === Logging ===

    /// Nivel de log (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info", env = "HTTP_LOG_LEVEL")]
    pub log_level: tracing::Level,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    ///
    /// Un puerto ausente o no numérico termina el proceso con un error de uso.
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use redunix_httpd::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resuelve la raíz de documentos a su forma canónica
    ///
    /// Falla si el directorio no existe.
    pub fn canonical_root(&self) -> io::Result<PathBuf> {
        let root = self.document_root.canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(root)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cgi_budget(&self) -> Duration {
        Duration::from_millis(self.cgi_budget_ms)
    }

    pub fn cgi_step(&self) -> Duration {
        Duration::from_millis(self.cgi_step_ms)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be >= 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be > 0".to_string());
        }
        if self.max_again == 0 {
            return Err("Max again must be >= 1".to_string());
        }
        if self.read_chunk == 0 {
            return Err("Read chunk must be >= 1".to_string());
        }
        if self.cgi_budget_ms == 0 || self.cgi_step_ms == 0 {
            return Err("CGI budget and step must be > 0".to_string());
        }
        if self.cgi_step_ms > self.cgi_budget_ms {
            return Err("CGI step must not exceed the CGI budget".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            document_root: PathBuf::from("."),
            host: "0.0.0.0".to_string(),
            workers: 8,
            queue_capacity: 1024,
            request_timeout_secs: 10,
            max_again: 10,
            read_chunk: 1024,
            cgi_budget_ms: 1000,
            cgi_step_ms: 1,
            log_level: tracing::Level::INFO,
        }
    }
}
