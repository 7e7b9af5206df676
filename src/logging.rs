//! # Logging
//! src/logging.rs
//!
//! Sink de logs del proceso. Todas las líneas pasan por un único `Mutex`
//! sobre stderr, así los workers y el reactor nunca intercalan salida.

use std::io;
use std::sync::Mutex;

/// Instala el subscriber global de `tracing`
///
/// Solo debe llamarse una vez, al arrancar. Si ya había uno instalado
/// (por ejemplo en tests) no hace nada.
pub fn init(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_writer(Mutex::new(io::stderr()))
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(false)
        .try_init();
}

/// Escapa bytes arbitrarios para poder loguearlos en una sola línea
///
/// - ASCII imprimible se deja igual
/// - `\r` y `\n` se convierten en `\\r` y `\\n`
/// - cualquier otro byte se muestra como `\\xNN`
///
/// Si el resultado supera `max` caracteres se trunca y se marca con ` ... ... `.
///
/// # Ejemplo
/// ```
/// use redunix_httpd::logging::escape_for_log;
///
/// assert_eq!(escape_for_log(b"GET / HTTP/1.1\r\n", 64), "GET / HTTP/1.1\\r\\n");
/// ```
pub fn escape_for_log(bytes: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(bytes.len().min(max) + 16);
    for &b in bytes {
        match b {
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }

    if out.len() > max {
        out.truncate(max);
        out.push_str(" ... ... ");
    }
    out
}
