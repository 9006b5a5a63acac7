//! Archivo temporal por fuente: la salida saneada vive aquí hasta el commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

use crate::error::SanitizeError;

/// Nombres alternativos `{stem}{suffix}_{n}` que se prueban antes de desistir.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Salida en preparación junto a `source_path`. Si no se confirma, el archivo
/// temporal se elimina al soltar el valor.
pub struct StagedFile {
    source_path: PathBuf,
    temp_path: TempPath,
    is_destructive: bool,
}

impl StagedFile {
    pub fn create(source_path: &Path, is_destructive: bool) -> Result<Self, SanitizeError> {
        let dir = parent_dir(source_path);
        let stem = source_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = match source_path.extension() {
            Some(ext) => format!(".staged.{}", ext.to_string_lossy()),
            None => ".staged".to_string(),
        };

        let temp_path = Builder::new()
            .prefix(&format!(".{stem}."))
            .suffix(&suffix)
            .tempfile_in(dir)?
            .into_temp_path();

        Ok(Self {
            source_path: source_path.to_path_buf(),
            temp_path,
            is_destructive,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn is_destructive(&self) -> bool {
        self.is_destructive
    }

    /// Comprueba que la salida existe y no está vacía; devuelve su tamaño.
    pub fn verify(&self) -> Result<u64, SanitizeError> {
        let metadata = fs::metadata(&self.temp_path).map_err(|error| {
            SanitizeError::VerificationFailed(format!("la salida no existe: {error}"))
        })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(SanitizeError::VerificationFailed(
                "la salida está vacía".into(),
            ));
        }
        Ok(metadata.len())
    }

    /// Copia los permisos del original sobre la salida, que `tempfile` crea
    /// solo para el propietario. Debe llamarse antes de destruir el original.
    pub fn inherit_permissions(&self) -> Result<(), SanitizeError> {
        let permissions = fs::metadata(&self.source_path)?.permissions();
        fs::set_permissions(&self.temp_path, permissions)?;
        Ok(())
    }

    /// Renombra la salida sobre `target`. En modo destructivo un fallo deja
    /// el temporal en disco para poder recuperarlo.
    pub fn commit(self, target: &Path) -> Result<(), SanitizeError> {
        let is_destructive = self.is_destructive;
        self.temp_path.persist(target).map_err(|error| {
            if is_destructive {
                match error.path.keep() {
                    Ok(stranded) => warn!(
                        stranded = %stranded.display(),
                        target = %target.display(),
                        "no se pudo mover la salida saneada; se conserva el temporal"
                    ),
                    Err(keep_error) => warn!(%keep_error, "no se pudo conservar el temporal"),
                }
            }
            SanitizeError::Io(error.error)
        })
    }

    /// Mueve la salida a `target` sin reemplazar ningún archivo existente. Si
    /// el nombre está ocupado prueba `{stem}_1`, `{stem}_2`... y devuelve la
    /// ruta usada.
    pub fn commit_new(self, target: &Path) -> Result<PathBuf, SanitizeError> {
        let mut temp_path = self.temp_path;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = numbered_path(target, attempt);
            match temp_path.persist_noclobber(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(taken = %candidate.display(), "nombre de salida ocupado");
                    temp_path = error.path;
                }
                Err(error) => return Err(SanitizeError::Io(error.error)),
            }
        }
        Err(SanitizeError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no hay un nombre libre para `{}`", target.display()),
        )))
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn numbered_path(target: &Path, attempt: usize) -> PathBuf {
    if attempt == 0 {
        return target.to_path_buf();
    }
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}_{attempt}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{attempt}"),
    };
    parent_dir(target).join(name)
}

/// Ruta de salida en modo no destructivo: `{stem}{suffix}.{ext}` junto al original.
pub fn derived_output_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    parent_dir(source).join(name)
}
