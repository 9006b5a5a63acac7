//! Borrado seguro de originales: sobrescritura multipasada y desvinculación.
//!
//! Es una mitigación de mejor esfuerzo. En SSD, sistemas de archivos con
//! copia en escritura o volúmenes con instantáneas, los bloques anteriores
//! pueden sobrevivir a la sobrescritura; no equivale a un borrado criptográfico.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use rand::RngCore;
use tracing::{debug, warn};

use crate::config::DEFAULT_PASSES;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EraseOutcome {
    /// El archivo no existía; no se hizo nada.
    Absent,
    /// Todas las pasadas se completaron antes de desvincular.
    Overwritten { passes: u32, bytes_per_pass: u64 },
    /// La sobrescritura no fue posible y el archivo solo se desvinculó.
    Degraded { reason: String },
}

impl EraseOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, EraseOutcome::Degraded { .. })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SecureEraser {
    passes: u32,
}

impl Default for SecureEraser {
    fn default() -> Self {
        Self::new(DEFAULT_PASSES)
    }
}

impl SecureEraser {
    pub fn new(passes: u32) -> Self {
        Self {
            passes: passes.max(1),
        }
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Sobrescribe `path` con datos aleatorios y luego con ceros en cada
    /// pasada, sincronizando con el disco tras cada escritura, y lo elimina.
    ///
    /// Solo falla si el archivo no puede desvincularse; cualquier error de
    /// sobrescritura degrada a un borrado simple.
    pub fn erase(&self, path: &Path) -> io::Result<EraseOutcome> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(EraseOutcome::Absent);
            }
            Err(error) => return Err(error),
        };

        let outcome = if metadata.file_type().is_symlink() {
            EraseOutcome::Degraded {
                reason: "enlace simbólico: se elimina el enlace sin tocar el destino".into(),
            }
        } else {
            match self.overwrite(path, metadata.len()) {
                Ok(()) => EraseOutcome::Overwritten {
                    passes: self.passes,
                    bytes_per_pass: metadata.len(),
                },
                Err(error) => EraseOutcome::Degraded {
                    reason: format!("sobrescritura fallida: {error}"),
                },
            }
        };

        if let EraseOutcome::Degraded { reason } = &outcome {
            warn!(path = %path.display(), %reason, "borrado seguro degradado a eliminación simple");
        }

        fs::remove_file(path)?;
        debug!(path = %path.display(), ?outcome, "original eliminado");
        Ok(outcome)
    }

    fn overwrite(&self, path: &Path, len: u64) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut rng = rand::rng();

        for _ in 0..self.passes {
            write_pass(&mut file, len, &mut buffer, |chunk| rng.fill_bytes(chunk))?;
            write_pass(&mut file, len, &mut buffer, |chunk| chunk.fill(0))?;
        }
        Ok(())
    }
}

fn write_pass<F>(file: &mut File, len: u64, buffer: &mut [u8], mut fill: F) -> io::Result<()>
where
    F: FnMut(&mut [u8]),
{
    file.seek(SeekFrom::Start(0))?;
    let mut remaining = len;
    while remaining > 0 {
        let chunk_len = remaining.min(buffer.len() as u64) as usize;
        let chunk = &mut buffer[..chunk_len];
        fill(chunk);
        file.write_all(chunk)?;
        remaining -= chunk_len as u64;
    }
    file.sync_all()
}
