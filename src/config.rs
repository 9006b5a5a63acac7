//! Opciones de ejecución reconocidas por el orquestador.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

pub const DEFAULT_PASSES: u32 = 3;
pub const DEFAULT_SUFFIX: &str = "_cleaned";
pub const DEFAULT_AUDIT_DIR: &str = "logs";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Recorre subdirectorios.
    pub recursive: bool,
    /// Borra de forma segura el original y lo reemplaza por la versión limpia.
    pub destructive: bool,
    /// Pasadas de sobrescritura del borrado seguro.
    pub passes: u32,
    /// Omite archivos y directorios ocultos (con prefijo `.`).
    pub ignore_hidden: bool,
    pub follow_symlinks: bool,
    /// Archivos procesados en paralelo.
    pub workers: usize,
    /// Sufijo insertado antes de la extensión en modo no destructivo.
    pub cleaned_suffix: String,
    pub audit_dir: PathBuf,
    /// Con `false` la clasificación se degrada a adivinar por extensión.
    pub content_sniffing: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            destructive: false,
            passes: DEFAULT_PASSES,
            ignore_hidden: true,
            follow_symlinks: false,
            workers: default_workers(),
            cleaned_suffix: DEFAULT_SUFFIX.to_string(),
            audit_dir: PathBuf::from(DEFAULT_AUDIT_DIR),
            content_sniffing: true,
        }
    }
}

impl PipelineOptions {
    /// Ajusta valores fuera de rango a los mínimos admitidos.
    pub fn normalized(mut self) -> Self {
        self.passes = self.passes.max(1);
        self.workers = self.workers.max(1);
        if self.cleaned_suffix.is_empty() {
            self.cleaned_suffix = DEFAULT_SUFFIX.to_string();
        }
        self
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
