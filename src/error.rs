//! # Errores por Request
//! src/error.rs
//!
//! Cada paso del parser y del manejo de un request devuelve
//! `Result<(), HandlerError>`. El único punto de despacho de la máquina de
//! estados (`Connection::dispatch`) traduce cada variante a una transición.
//!
//! ## Taxonomía
//!
//! | Tipo         | Variantes                                              | Efecto                          |
//! |--------------|--------------------------------------------------------|---------------------------------|
//! | Incompleto   | `Again`                                                | reintento acotado, sin respuesta |
//! | Cliente      | `BadRequest`, `LengthRequired`, `NotImplemented`, `VersionNotSupported` | página de error |
//! | Recurso      | `NotFound`, `Internal`                                 | página de error                 |
//! | Fatal        | `ReadFailed`, `ConnectionClosed`, `SendFailed`         | se cierra sin respuesta         |

use crate::http::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Faltan bytes para terminar el paso actual
    #[error("waiting for more data")]
    Again,

    #[error("read request failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("send response failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("bad request")]
    BadRequest,

    #[error("not found")]
    NotFound,

    #[error("length required")]
    LengthRequired,

    #[error("method not implemented")]
    NotImplemented,

    #[error("internal server error")]
    Internal,

    #[error("http version not supported")]
    VersionNotSupported,
}

/// Clasificación de un `HandlerError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Incomplete,
    Client,
    Resource,
    Fatal,
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Again => ErrorKind::Incomplete,
            HandlerError::ReadFailed(_)
            | HandlerError::ConnectionClosed
            | HandlerError::SendFailed(_) => ErrorKind::Fatal,
            HandlerError::BadRequest
            | HandlerError::LengthRequired
            | HandlerError::NotImplemented
            | HandlerError::VersionNotSupported => ErrorKind::Client,
            HandlerError::NotFound | HandlerError::Internal => ErrorKind::Resource,
        }
    }

    /// Código de estado a enviar, si el error produce respuesta
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HandlerError::BadRequest => Some(StatusCode::BadRequest),
            HandlerError::NotFound => Some(StatusCode::NotFound),
            HandlerError::LengthRequired => Some(StatusCode::LengthRequired),
            HandlerError::NotImplemented => Some(StatusCode::NotImplemented),
            HandlerError::Internal => Some(StatusCode::InternalServerError),
            HandlerError::VersionNotSupported => Some(StatusCode::HttpVersionNotSupported),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_have_no_status() {
        for err in [
            HandlerError::ConnectionClosed,
            HandlerError::ReadFailed(io::Error::from(io::ErrorKind::BrokenPipe)),
            HandlerError::SendFailed(io::Error::from(io::ErrorKind::BrokenPipe)),
        ] {
            assert_eq!(err.kind(), ErrorKind::Fatal);
            assert!(err.status().is_none());
        }
    }

    #[test]
    fn test_again_is_incomplete() {
        assert_eq!(HandlerError::Again.kind(), ErrorKind::Incomplete);
        assert!(HandlerError::Again.status().is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(HandlerError::BadRequest.status(), Some(StatusCode::BadRequest));
        assert_eq!(HandlerError::NotFound.status(), Some(StatusCode::NotFound));
        assert_eq!(HandlerError::LengthRequired.status(), Some(StatusCode::LengthRequired));
        assert_eq!(HandlerError::NotImplemented.status(), Some(StatusCode::NotImplemented));
        assert_eq!(HandlerError::Internal.status(), Some(StatusCode::InternalServerError));
        assert_eq!(
            HandlerError::VersionNotSupported.status(),
            Some(StatusCode::HttpVersionNotSupported)
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(HandlerError::NotFound.kind(), ErrorKind::Resource);
        assert_eq!(HandlerError::Internal.kind(), ErrorKind::Resource);
        assert_eq!(HandlerError::BadRequest.kind(), ErrorKind::Client);
    }
}
