//! # Construcción de Respuestas HTTP
//!
//! Las respuestas siempre salen como `HTTP/1.1`, con los headers en este
//! orden fijo:
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Connection: Keep-Alive\r\n
//! Keep-Alive: timeout=10, max=9\r\n      <- solo si la conexión persiste
//! Server: RedUnix/1.1\r\n
//! Content-length: 13\r\n
//! Content-type: text/html\r\n
//! \r\n
//! <h1>hola</h1>                          <- se omite en HEAD
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use redunix_httpd::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_content_type("text/plain")
//!     .with_body(b"hola".to_vec());
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::StatusCode;

/// Valor del header `Server`
pub const SERVER_NAME: &str = "RedUnix/1.1";

/// Parámetros de persistencia que se anuncian al cliente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Segundos de inactividad tolerados
    pub timeout_secs: u64,
    /// Reintentos que le quedan a la conexión
    pub max: u32,
}

/// Representa una respuesta HTTP completa
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
    keep_alive: Option<KeepAlive>,
    omit_body: bool,
}

impl Response {
    /// Crea una respuesta sin body que cierra la conexión
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: super::mime::DEFAULT_CONTENT_TYPE,
            body: Vec::new(),
            keep_alive: None,
            omit_body: false,
        }
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Marca la conexión como persistente
    pub fn with_keep_alive(mut self, keep_alive: Option<KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Para HEAD: se anuncia el largo real pero no se envían los bytes
    pub fn without_body(mut self, omit: bool) -> Self {
        self.omit_body = omit;
        self
    }

    /// Página HTML de error para un código de estado
    ///
    /// # Ejemplo
    /// ```
    /// use redunix_httpd::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound);
    /// let body = String::from_utf8(response.body().to_vec()).unwrap();
    /// assert!(body.contains("<title>404 Not Found</title>"));
    /// ```
    pub fn error(status: StatusCode) -> Self {
        let body = format!(
            "<html><title>{status}</title><body>{status}<hr><em> RedUnix Web Server</em></body></html>"
        );
        Self::new(status)
            .with_content_type("text/html")
            .with_body(body.into_bytes())
    }

    /// Serializa la respuesta a bytes listos para el socket
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);

        match self.keep_alive {
            Some(ka) => {
                head.push_str("Connection: Keep-Alive\r\n");
                head.push_str(&format!(
                    "Keep-Alive: timeout={}, max={}\r\n",
                    ka.timeout_secs, ka.max
                ));
            }
            None => head.push_str("Connection: Close\r\n"),
        }
        head.push_str(&format!("Server: {}\r\n", SERVER_NAME));
        head.push_str(&format!("Content-length: {}\r\n", self.body.len()));
        head.push_str(&format!("Content-type: {}\r\n", self.content_type));
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        if !self.omit_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
