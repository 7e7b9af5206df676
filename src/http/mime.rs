//! Tabla estática extensión -> Content-Type.

/// Tipo por defecto para extensiones desconocidas
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Busca el Content-Type de una extensión (sin el punto)
pub fn content_type(suffix: &str) -> &'static str {
    match suffix {
        "doc" => "application/msword",
        "gz" => "application/x-gzip",
        "ico" => "application/x-ico",
        "gif" => "image/gif",
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "mp3" => "audio/mp3",
        "avi" => "video/x-msvideo",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "c" | "txt" => "text/plain",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Content-Type a partir de la última extensión de una ruta
///
/// Se toma todo lo que sigue al último `.`; sin punto se usa el tipo por
/// defecto.
pub fn content_type_for_path(path: &str) -> &'static str {
    match path.rsplit_once('.') {
        Some((_, suffix)) => content_type(suffix),
        None => DEFAULT_CONTENT_TYPE,
    }
}
