//! Contrato uniforme de saneamiento y registro de manejadores por categoría.

mod image;
mod media;
mod office;
mod pdf;

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile};

use crate::classifier::Category;
use crate::error::SanitizeError;

pub use self::image::ImageSanitizer;
pub use media::MediaSanitizer;
pub use office::OfficeSanitizer;
pub use pdf::PdfSanitizer;

/// Entrada centinela para distinguir "se ejecutó y no había nada" de "no se ejecutó".
pub const VERIFIED_CLEAN: &str = "Verified Clean";

/// Elimina metadata identificativa de un formato concreto.
///
/// `process` lee `input` y materializa `output` de forma atómica: ante un
/// error interno `output` no queda con contenido parcial.
pub trait Sanitizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, input: &Path, output: &Path) -> Result<Manifest, SanitizeError>;
}

/// Conjunto ordenado de nombres semánticos de campos eliminados.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Manifest {
    fields: Vec<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un campo conservando el orden de inserción y sin duplicados.
    pub fn push(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|existing| existing == field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Campos para el registro de auditoría; un manifiesto vacío se reporta
    /// con el centinela [`VERIFIED_CLEAN`].
    pub fn into_reported(self) -> Vec<String> {
        if self.fields.is_empty() {
            vec![VERIFIED_CLEAN.to_string()]
        } else {
            self.fields
        }
    }
}

impl<S: Into<String>> Extend<S> for Manifest {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for field in iter {
            self.push(field);
        }
    }
}

/// Asignación de categoría a manejador. Los huecos se detectan al construir
/// el orquestador y, en tiempo de ejecución, producen un error reportable.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Category, Arc<dyn Sanitizer>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Category::Image, Arc::new(ImageSanitizer));
        registry.register(Category::Pdf, Arc::new(PdfSanitizer));
        registry.register(Category::OfficeDocument, Arc::new(OfficeSanitizer));
        registry.register(Category::Media, Arc::new(MediaSanitizer));
        registry
    }

    pub fn register(&mut self, category: Category, handler: Arc<dyn Sanitizer>) {
        self.handlers.insert(category, handler);
    }

    pub fn get(&self, category: Category) -> Option<&dyn Sanitizer> {
        self.handlers.get(&category).map(|handler| handler.as_ref())
    }

    /// Categorías manejables que no tienen implementación registrada.
    pub fn missing(&self) -> Vec<Category> {
        Category::HANDLED
            .into_iter()
            .filter(|category| !self.handlers.contains_key(category))
            .collect()
    }
}

/// Crea un archivo de trabajo oculto en el mismo directorio que `output`,
/// de modo que el renombrado final no cruce sistemas de archivos.
pub(crate) fn scratch_beside(output: &Path) -> Result<NamedTempFile, SanitizeError> {
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    Ok(Builder::new()
        .prefix(".filescrub-")
        .suffix(".part")
        .tempfile_in(dir)?)
}

/// Sincroniza el archivo de trabajo y lo renombra sobre `output`.
pub(crate) fn commit_scratch(scratch: NamedTempFile, output: &Path) -> Result<(), SanitizeError> {
    scratch.as_file().sync_all()?;
    scratch
        .persist(output)
        .map_err(|error| SanitizeError::Io(error.error))?;
    Ok(())
}

/// Escribe `output` a través de un archivo de trabajo; si `write_fn` falla el
/// archivo de trabajo se descarta y `output` no se toca.
pub(crate) fn write_atomically<T, F>(output: &Path, write_fn: F) -> Result<T, SanitizeError>
where
    F: FnOnce(&mut File) -> Result<T, SanitizeError>,
{
    let mut scratch = scratch_beside(output)?;
    let value = write_fn(scratch.as_file_mut())?;
    commit_scratch(scratch, output)?;
    Ok(value)
}
