//! # Resolución de Rutas
//! src/http/path.rs
//!
//! Única defensa contra path traversal: toda ruta pedida se canonicaliza y
//! se verifica que quede dentro de la raíz de documentos.
//!
//! ```text
//! raíz:    /srv/www
//! normal:  /srv/www/index.html            -> OK
//! truco:   /srv/www/../../../etc/passwd   -> /etc/passwd -> rechazado
//! vecino:  /srv/www-old/index.html        -> rechazado (no basta el prefijo)
//! ```

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Indica si `child` es `parent` o un descendiente estricto suyo
///
/// Ambas rutas se canonicalizan (deben existir). La forma canónica del hijo
/// tiene que empezar por la del padre seguida de fin de cadena o `/`.
pub fn is_path_parent(parent: &Path, child: &Path) -> bool {
    let parent = match parent.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(path = %parent.display(), error = %e, "cannot resolve parent path");
            return false;
        }
    };
    let child = match child.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(path = %child.display(), error = %e, "cannot resolve child path");
            return false;
        }
    };

    let parent = parent.as_os_str().as_bytes();
    let child = child.as_os_str().as_bytes();

    if !child.starts_with(parent) {
        return false;
    }
    // La raíz "/" ya termina en separador
    if parent.ends_with(b"/") {
        return true;
    }
    matches!(child.get(parent.len()), None | Some(b'/'))
}

/// Resuelve el target de la request line contra la raíz de documentos
///
/// Descarta la query string, concatena `root + "/" + target` y devuelve la
/// forma canónica si queda dentro de la raíz. `None` si no existe o escapa.
pub fn resolve_target(root: &Path, target: &str) -> Option<PathBuf> {
    let target = target.split('?').next().unwrap_or_default();

    let mut joined = OsString::from(root.as_os_str());
    joined.push("/");
    joined.push(target);
    let joined = PathBuf::from(joined);

    if !is_path_parent(root, &joined) {
        return None;
    }
    joined.canonicalize().ok()
}
