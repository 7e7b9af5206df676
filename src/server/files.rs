//! Lectura de archivos estáticos vía mmap.

use crate::error::HandlerError;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::ptr::NonNull;

/// Región mapeada de solo lectura; se desmapea al soltarla
struct Mapping {
    addr: NonNull<c_void>,
    len: NonZeroUsize,
}

impl Mapping {
    fn new(file: &File, len: NonZeroUsize) -> nix::Result<Self> {
        // SAFETY: mapeo privado de solo lectura de un archivo abierto; la
        // región no se expone más allá de la vida de `Mapping`.
        let addr = unsafe { mmap(None, len, ProtFlags::PROT_READ, MapFlags::MAP_PRIVATE, file, 0)? };
        Ok(Self { addr, len })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `addr` apunta a `len` bytes legibles mientras viva el mapeo.
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr() as *const u8, self.len.get()) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `addr`/`len` salen de un mmap exitoso y no hay préstamos vivos.
        if let Err(e) = unsafe { munmap(self.addr, self.len.get()) } {
            tracing::warn!(error = %e, "munmap failed");
        }
    }
}

fn open_error(path: &Path, err: io::Error) -> HandlerError {
    tracing::warn!(path = %path.display(), error = %err, "cannot open file");
    if err.kind() == io::ErrorKind::NotFound {
        HandlerError::NotFound
    } else {
        HandlerError::Internal
    }
}

/// Copia el contenido completo de `path` a memoria
pub fn read_file(path: &Path) -> Result<Vec<u8>, HandlerError> {
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    let len = file.metadata().map_err(|e| open_error(path, e))?.len();
    let len = usize::try_from(len).map_err(|_| HandlerError::Internal)?;

    // mmap no acepta largo cero
    let Some(len) = NonZeroUsize::new(len) else {
        return Ok(Vec::new());
    };

    let mapping = Mapping::new(&file, len).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "cannot map file");
        HandlerError::Internal
    })?;
    Ok(mapping.as_slice().to_vec())
}
