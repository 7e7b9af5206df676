//! # RedUnix HTTP Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 orientado a eventos que sirve archivos estáticos de
//! una raíz de documentos y ejecuta recursos como CGI ante un POST.
//!
//! ## Arquitectura
//!
//! - `config`: Configuración por CLI y variables de entorno
//! - `logging`: Inicialización de `tracing` y escape de bytes para logs
//! - `error`: Errores de cada paso del manejo de un request
//! - `io_util`: Lectura/escritura sobre descriptores no bloqueantes
//! - `http`: Parsing de requests, construcción de responses, MIME y rutas
//! - `workers`: Pool fijo de threads con cola acotada
//! - `server`: Reactor epoll, conexiones, timers y CGI
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use redunix_httpd::config::Config;
//! use redunix_httpd::server::Reactor;
//!
//! let config = Config::default();
//! let mut reactor = Reactor::bind(&config).expect("bind");
//! reactor.run().expect("event loop");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod io_util;
pub mod logging;
pub mod server;
pub mod workers;
