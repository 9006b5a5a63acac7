//! FileScrub: saneamiento de metadata con clasificación por contenido,
//! reemplazo atómico de archivos y borrado seguro de originales.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod eraser;
pub mod error;
pub mod formatting;
pub mod pipeline;
pub mod sanitizer;
pub mod ui;

pub use audit::{AuditRecord, AuditStatus, AuditSummary, AuditTrail};
pub use classifier::{Category, Classifier, Confidence, FileIdentity};
pub use config::PipelineOptions;
pub use eraser::{EraseOutcome, SecureEraser};
pub use error::{AuditError, PipelineError, SanitizeError};
pub use pipeline::{Pipeline, PipelineEvent, ProcessOutcome, RunReport};
pub use sanitizer::{HandlerRegistry, Manifest, Sanitizer};

#[cfg(test)]
pub(crate) mod test_support;
