//! # Parsing Incremental de Requests
//! src/http/request.rs
//!
//! Los bytes de un request llegan en pedazos, a lo largo de varias
//! notificaciones de epoll. Por eso el parser no recibe un request completo:
//! cada función trabaja sobre el buffer acumulado de la conexión y un cursor,
//! y responde `HandlerError::Again` cuando faltan bytes.
//!
//! ## Formato de un Request
//!
//! ```text
//! POST /cgi/echo.sh HTTP/1.1\r\n     <- request line   (parse_request_line)
//! Host: localhost:8080\r\n           <- headers        (parse_headers)
//! Content-Length: 5\r\n
//! \r\n                               <- fin de headers
//! hello                              <- body           (parse_body, solo POST)
//! ```

use crate::error::HandlerError;
use crate::http::path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,

    /// POST - Ejecutar el recurso como CGI con el body como entrada
    POST,
}

impl Method {
    /// Parsea un método HTTP; cualquier otro es "no implementado"
    fn from_str(s: &str) -> Result<Self, HandlerError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            _ => Err(HandlerError::NotImplemented),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
        }
    }
}

/// Versiones HTTP aceptadas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn from_str(s: &str) -> Result<Self, HandlerError> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(HandlerError::VersionNotSupported),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Request line ya validada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    /// Ruta canónica dentro de la raíz de documentos
    pub path: PathBuf,
    pub version: Version,
}

/// Busca el siguiente `\r\n` a partir de `from`
pub fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| from + pos)
}

/// Parsea la request line que empieza en el inicio del buffer
///
/// Formato: `METHOD SP target SP version CRLF`. Se valida en orden:
/// método (501), ruta dentro de `root` (404), versión (505).
///
/// Retorna la request line y cuántos bytes consumió (incluyendo el CRLF).
pub fn parse_request_line(buf: &[u8], root: &Path) -> Result<(RequestLine, usize), HandlerError> {
    let end = find_crlf(buf, 0).ok_or(HandlerError::Again)?;
    let line = std::str::from_utf8(&buf[..end]).map_err(|_| HandlerError::BadRequest)?;

    let (method, rest) = line.split_once(' ').ok_or(HandlerError::BadRequest)?;
    let method = Method::from_str(method)?;

    let (target, version) = rest.split_once(' ').ok_or(HandlerError::BadRequest)?;
    let path = path::resolve_target(root, target).ok_or(HandlerError::NotFound)?;

    let version = Version::from_str(version)?;

    Ok((RequestLine { method, path, version }, end + 2))
}

/// Parsea una línea `key: value`
///
/// La clave no puede estar vacía ni contener espacios; se devuelve en
/// minúsculas. El valor se recorta.
pub fn parse_header_line(line: &[u8]) -> Result<(String, String), HandlerError> {
    let line = std::str::from_utf8(line).map_err(|_| HandlerError::BadRequest)?;
    let (key, value) = line.split_once(':').ok_or(HandlerError::BadRequest)?;

    if key.is_empty() || key.contains(|c: char| c.is_ascii_whitespace()) {
        return Err(HandlerError::BadRequest);
    }

    Ok((key.to_ascii_lowercase(), value.trim().to_string()))
}

/// Parsea headers desde `*cursor` hasta la línea vacía
///
/// El cursor avanza línea a línea: si faltan datos (`Again`) queda al inicio
/// de la primera línea incompleta y la siguiente pasada continúa desde ahí.
/// Al encontrar la línea vacía queda justo después de ella.
pub fn parse_headers(
    buf: &[u8],
    cursor: &mut usize,
    headers: &mut HashMap<String, String>,
) -> Result<(), HandlerError> {
    while let Some(end) = find_crlf(buf, *cursor) {
        let line = &buf[*cursor..end];

        if line.is_empty() {
            *cursor = end + 2;
            return Ok(());
        }

        let (key, value) = parse_header_line(line)?;
        tracing::debug!(header = %key, value = %value, "http header");
        headers.insert(key, value);
        *cursor = end + 2;
    }
    Err(HandlerError::Again)
}

/// Extrae el body de un POST según `content-length`
///
/// - sin `content-length` -> `LengthRequired`
/// - valor vacío o con algo que no sea dígito -> `BadRequest`
/// - menos bytes de los declarados -> `Again`
///
/// Avanza el cursor hasta el final del body.
pub fn parse_body(
    buf: &[u8],
    cursor: &mut usize,
    headers: &HashMap<String, String>,
) -> Result<Vec<u8>, HandlerError> {
    let declared = headers
        .get("content-length")
        .ok_or(HandlerError::LengthRequired)?;

    if declared.is_empty() || !declared.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HandlerError::BadRequest);
    }
    let len: usize = declared.parse().map_err(|_| HandlerError::BadRequest)?;

    let end = cursor.checked_add(len).ok_or(HandlerError::BadRequest)?;
    if buf.len() < end {
        return Err(HandlerError::Again);
    }

    let body = buf[*cursor..end].to_vec();
    *cursor = end;
    Ok(body)
}

/// Decide si la conexión persiste después del request
///
/// HTTP/1.1 persiste por defecto y `Connection: close` lo apaga.
/// HTTP/1.0 siempre cierra, aunque pida `keep-alive`.
pub fn is_keep_alive(version: Version, headers: &HashMap<String, String>) -> bool {
    if version == Version::Http10 {
        return false;
    }
    match headers.get("connection") {
        Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
        Some(value) if value.eq_ignore_ascii_case("close") => false,
        _ => true,
    }
}
