//! # Módulo HTTP
//!
//! Implementa la parte del protocolo que usa el servidor, sin librerías de
//! alto nivel:
//!
//! - Parsing incremental de requests HTTP/1.0 y HTTP/1.1
//! - Construcción de responses HTTP/1.1
//! - Códigos de estado
//! - Tabla de tipos MIME
//! - Resolución segura de rutas dentro de la raíz de documentos
//!
//! No hay chunked transfer encoding, ni rangos, ni virtual hosts.

pub mod mime;
pub mod path;
pub mod request;
pub mod response;
pub mod status;

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{Method, RequestLine, Version};
pub use response::{KeepAlive, Response};
pub use status::StatusCode;
