//! Taxonomía de errores del motor de saneamiento.

use std::io;
use std::path::PathBuf;

use crate::classifier::Category;

/// Fallos acotados a un único archivo. Ninguno es transitorio, por lo que
/// el orquestador nunca reintenta.
#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("No se pudo determinar el tipo de contenido")]
    ClassificationIndeterminate,

    #[error("No hay un manejador registrado para la categoría {0}")]
    UnsupportedCategory(Category),

    #[error("Formato no soportado: {0}")]
    UnsupportedFormat(String),

    #[error("Contenido corrupto o ilegible: {0}")]
    CorruptInput(String),

    #[error("La verificación de la salida falló: {0}")]
    VerificationFailed(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] io::Error),
}

impl SanitizeError {
    pub fn corrupt(message: impl std::fmt::Display) -> Self {
        Self::CorruptInput(message.to_string())
    }
}

/// Errores de escritura del registro de auditoría. Son los únicos fatales
/// para una ejecución completa.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("No se pudo escribir el registro de auditoría `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No se pudo serializar el registro de auditoría: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("El registro de auditoría ya fue cerrado")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No se pudo acceder a `{path}`: {source}")]
    Target {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Audit(#[from] AuditError),
}
