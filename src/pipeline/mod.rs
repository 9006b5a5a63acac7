//! Orquestación por archivo: clasificar, despachar, sanear, verificar y
//! confirmar, con un registro de auditoría por cada archivo presentado.

mod staging;
mod walker;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::audit::{AuditRecord, AuditSummary, AuditTrail};
use crate::classifier::{Category, Classifier};
use crate::config::PipelineOptions;
use crate::eraser::{EraseOutcome, SecureEraser};
use crate::error::{AuditError, PipelineError, SanitizeError};
use crate::sanitizer::{HandlerRegistry, Sanitizer};

pub use staging::{StagedFile, derived_output_path};
pub use walker::collect_targets;

const CANCELLED_REASON: &str = "cancelado antes de iniciar";

/// Estados del procesamiento de un archivo.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileState {
    Classified,
    Dispatched,
    Sanitized,
    Verified,
    Committed,
    SkippedUnsupported,
    NoHandler,
    SanitizeFailed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileState::Classified => "classified",
            FileState::Dispatched => "dispatched",
            FileState::Sanitized => "sanitized",
            FileState::Verified => "verified",
            FileState::Committed => "committed",
            FileState::SkippedUnsupported => "skipped-unsupported",
            FileState::NoHandler => "no-handler",
            FileState::SanitizeFailed => "sanitize-failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Cleaned {
        manifest: Vec<String>,
        original_size: u64,
        new_size: u64,
        output_path: PathBuf,
        note: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: SanitizeError,
    },
}

impl ProcessOutcome {
    /// Estado terminal alcanzado.
    pub fn state(&self) -> FileState {
        match self {
            ProcessOutcome::Cleaned { .. } => FileState::Committed,
            ProcessOutcome::Skipped { .. } => FileState::SkippedUnsupported,
            ProcessOutcome::Failed {
                error: SanitizeError::UnsupportedCategory(_),
            } => FileState::NoHandler,
            ProcessOutcome::Failed { .. } => FileState::SanitizeFailed,
        }
    }

    fn to_record(&self, path: &Path, original_size: u64) -> AuditRecord {
        match self {
            ProcessOutcome::Cleaned {
                manifest,
                original_size,
                new_size,
                note,
                ..
            } => AuditRecord::cleaned(path, *original_size, *new_size, manifest.clone(), note.clone()),
            ProcessOutcome::Skipped { reason } => {
                AuditRecord::skipped(path, original_size, reason.clone())
            }
            ProcessOutcome::Failed { error } => {
                AuditRecord::error(path, original_size, error.to_string())
            }
        }
    }
}

/// Eventos de progreso para presentadores externos.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    Started { total: usize },
    Processing { index: usize, total: usize, path: PathBuf },
    Finished { index: usize, path: PathBuf, record: AuditRecord },
    Completed { summary: AuditSummary },
}

#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<(PathBuf, ProcessOutcome)>,
    pub summary: AuditSummary,
    pub audit_path: PathBuf,
}

pub struct Pipeline {
    options: PipelineOptions,
    classifier: Classifier,
    registry: HandlerRegistry,
    eraser: SecureEraser,
    audit: AuditTrail,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(options: PipelineOptions, registry: HandlerRegistry, audit: AuditTrail) -> Self {
        let options = options.normalized();
        for category in registry.missing() {
            warn!(%category, "categoría sin manejador registrado; sus archivos se reportarán como error");
        }

        let classifier = if options.content_sniffing {
            Classifier::new()
        } else {
            warn!("clasificación por extensión activa: los archivos con extensión falsificada no se detectan");
            Classifier::extension_only()
        };

        Self {
            eraser: SecureEraser::new(options.passes),
            options,
            classifier,
            registry,
            audit,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Orquestador con los cuatro manejadores y el registro de auditoría en
    /// `options.audit_dir`.
    pub fn with_defaults(options: PipelineOptions) -> Result<Self, PipelineError> {
        let audit = AuditTrail::open(&options.audit_dir)?;
        Ok(Self::new(options, HandlerRegistry::with_defaults(), audit))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Bandera compartida: al activarla, los archivos aún no iniciados se
    /// registran como omitidos.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn audit_path(&self) -> &Path {
        self.audit.path()
    }

    /// Procesa un único archivo y anexa su registro. Solo falla si el
    /// registro de auditoría no puede escribirse.
    pub fn process_file(&self, path: &Path) -> Result<ProcessOutcome, PipelineError> {
        let (outcome, record) = self.process_and_record(path);
        self.audit.append(&record)?;
        Ok(outcome)
    }

    /// Recorre `target` y procesa cada archivo encontrado.
    pub fn run(
        &self,
        target: &Path,
        events: Option<Sender<PipelineEvent>>,
    ) -> Result<RunReport, PipelineError> {
        let audit_file = fs::canonicalize(self.audit.path()).ok();
        let files: Vec<PathBuf> = collect_targets(target, &self.options)?
            .into_iter()
            .filter(|path| audit_file.is_none() || fs::canonicalize(path).ok() != audit_file)
            .collect();

        info!(target = %target.display(), files = files.len(), "iniciando saneamiento");
        self.process_files(files, events)
    }

    /// Procesa `files` con un grupo acotado de hilos. Cada archivo produce
    /// exactamente un registro; un fallo de auditoría detiene la ejecución.
    pub fn process_files(
        &self,
        files: Vec<PathBuf>,
        events: Option<Sender<PipelineEvent>>,
    ) -> Result<RunReport, PipelineError> {
        let total = files.len();
        emit(events.as_ref(), PipelineEvent::Started { total });

        let next = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);
        let fatal: Mutex<Option<AuditError>> = Mutex::new(None);
        let summary = Mutex::new(AuditSummary::default());
        let slots: Mutex<Vec<Option<ProcessOutcome>>> =
            Mutex::new((0..total).map(|_| None).collect());

        let workers = self.options.workers.min(total).max(1);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if aborted.load(Ordering::SeqCst) {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(path) = files.get(index) else {
                            break;
                        };

                        emit(
                            events.as_ref(),
                            PipelineEvent::Processing {
                                index: index + 1,
                                total,
                                path: path.clone(),
                            },
                        );

                        let (outcome, record) = self.process_and_record(path);
                        if let Err(error) = self.audit.append(&record) {
                            warn!(%error, "no se pudo escribir el registro de auditoría; se detiene la ejecución");
                            aborted.store(true, Ordering::SeqCst);
                            fatal
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .get_or_insert(error);
                            break;
                        }

                        summary
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record(&record);
                        slots.lock().unwrap_or_else(PoisonError::into_inner)[index] =
                            Some(outcome);
                        emit(
                            events.as_ref(),
                            PipelineEvent::Finished {
                                index: index + 1,
                                path: path.clone(),
                                record,
                            },
                        );
                    }
                });
            }
        });

        if let Some(error) = fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(error.into());
        }

        let summary = summary.into_inner().unwrap_or_else(PoisonError::into_inner);
        emit(events.as_ref(), PipelineEvent::Completed { summary });

        let outcomes = files
            .into_iter()
            .zip(slots.into_inner().unwrap_or_else(PoisonError::into_inner))
            .filter_map(|(path, outcome)| outcome.map(|outcome| (path, outcome)))
            .collect();

        Ok(RunReport {
            outcomes,
            summary,
            audit_path: self.audit.path().to_path_buf(),
        })
    }

    /// Cierra el registro de auditoría y devuelve su ruta.
    pub fn finish(self) -> Result<PathBuf, AuditError> {
        self.audit.close()?;
        Ok(self.audit.path().to_path_buf())
    }

    fn process_and_record(&self, path: &Path) -> (ProcessOutcome, AuditRecord) {
        let original_size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);

        let outcome = if self.cancelled.load(Ordering::SeqCst) {
            ProcessOutcome::Skipped {
                reason: CANCELLED_REASON.to_string(),
            }
        } else {
            self.process(path, original_size)
        };

        match &outcome {
            ProcessOutcome::Failed { error } => {
                warn!(path = %path.display(), state = %outcome.state(), %error, "archivo no saneado")
            }
            _ => debug!(path = %path.display(), state = %outcome.state(), "archivo procesado"),
        }

        let record = outcome.to_record(path, original_size);
        (outcome, record)
    }

    fn process(&self, path: &Path, original_size: u64) -> ProcessOutcome {
        let identity = self.classifier.classify(path);
        if identity.is_degraded() {
            warn!(path = %path.display(), mime = ?identity.detected_mime, "tipo adivinado por extensión");
        }
        debug!(path = %path.display(), state = %FileState::Classified, category = %identity.category);

        if identity.category == Category::Unsupported {
            let reason = match identity.detected_mime {
                Some(mime) => format!("tipo no soportado: {mime}"),
                None => SanitizeError::ClassificationIndeterminate.to_string(),
            };
            return ProcessOutcome::Skipped { reason };
        }

        let Some(handler) = self.registry.get(identity.category) else {
            return ProcessOutcome::Failed {
                error: SanitizeError::UnsupportedCategory(identity.category),
            };
        };

        match self.sanitize_and_commit(path, handler) {
            Ok((manifest, output_path, new_size, note)) => ProcessOutcome::Cleaned {
                manifest,
                original_size,
                new_size,
                output_path,
                note,
            },
            Err(error) => ProcessOutcome::Failed { error },
        }
    }

    fn sanitize_and_commit(
        &self,
        path: &Path,
        handler: &dyn Sanitizer,
    ) -> Result<(Vec<String>, PathBuf, u64, Option<String>), SanitizeError> {
        let staged = StagedFile::create(path, self.options.destructive)?;
        debug!(path = %path.display(), state = %FileState::Dispatched, handler = handler.name());

        let manifest = handler.process(path, staged.temp_path())?;
        debug!(path = %path.display(), state = %FileState::Sanitized, fields = manifest.fields().len());

        let new_size = staged.verify()?;
        staged.inherit_permissions()?;
        debug!(path = %path.display(), state = %FileState::Verified, new_size);

        let (output_path, note) = if staged.is_destructive() {
            let source = staged.source_path().to_path_buf();
            let erased = self.eraser.erase(&source);
            // Borrar antes de mover: si el renombrado falla, el temporal se conserva.
            staged.commit(&source)?;
            (source, erase_note(erased))
        } else {
            // Los nombres derivados se reservan de forma atómica: ni un archivo del
            // usuario ni la salida de otro trabajador se sobrescriben.
            let derived = derived_output_path(path, &self.options.cleaned_suffix);
            (staged.commit_new(&derived)?, None)
        };

        info!(
            path = %path.display(),
            output = %output_path.display(),
            state = %FileState::Committed,
            "archivo saneado"
        );
        Ok((manifest.into_reported(), output_path, new_size, note))
    }
}

fn erase_note(erased: io::Result<EraseOutcome>) -> Option<String> {
    match erased {
        Ok(EraseOutcome::Degraded { reason }) => Some(format!("borrado seguro degradado: {reason}")),
        Ok(_) => None,
        Err(error) => {
            warn!(%error, "el original no pudo eliminarse antes del reemplazo");
            Some(format!("borrado seguro fallido, el original se sobrescribió por renombrado: {error}"))
        }
    }
}

fn emit(events: Option<&Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}
