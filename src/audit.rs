//! Registro de auditoría en JSON Lines: un objeto por línea, solo anexado.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AuditError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Cleaned,
    Error,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub file_path: String,
    pub status: AuditStatus,
    pub original_size: u64,
    pub new_size: u64,
    pub cleaned_fields: Vec<String>,
    pub error: Option<String>,
    /// Motivo de omisión o advertencia de borrado degradado.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AuditRecord {
    fn new(path: &Path, status: AuditStatus) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            file_path: path.display().to_string(),
            status,
            original_size: 0,
            new_size: 0,
            cleaned_fields: Vec::new(),
            error: None,
            note: None,
        }
    }

    pub fn cleaned(
        path: &Path,
        original_size: u64,
        new_size: u64,
        cleaned_fields: Vec<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            original_size,
            new_size,
            cleaned_fields,
            note,
            ..Self::new(path, AuditStatus::Cleaned)
        }
    }

    pub fn skipped(path: &Path, original_size: u64, reason: impl Into<String>) -> Self {
        Self {
            original_size,
            note: Some(reason.into()),
            ..Self::new(path, AuditStatus::Skipped)
        }
    }

    pub fn error(path: &Path, original_size: u64, error: impl Into<String>) -> Self {
        Self {
            original_size,
            error: Some(error.into()),
            ..Self::new(path, AuditStatus::Error)
        }
    }
}

/// Destino de auditoría de una ejecución. Se abre una vez, serializa las
/// escrituras concurrentes y vacía el búfer tras cada registro.
pub struct AuditTrail {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl AuditTrail {
    /// Crea un archivo nuevo `filescrub_audit_{fecha}.jsonl` dentro de `dir`.
    pub fn open(dir: &Path) -> Result<Self, AuditError> {
        fs::create_dir_all(dir).map_err(|source| AuditError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("filescrub_audit_{stamp}.jsonl")
            } else {
                format!("filescrub_audit_{stamp}_{attempt}.jsonl")
            };
            let path = dir.join(name);

            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    info!(path = %path.display(), "registro de auditoría abierto");
                    return Ok(Self {
                        path,
                        writer: Mutex::new(Some(BufWriter::new(file))),
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(AuditError::Io { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Anexa un registro completo en una línea y lo vacía al disco.
    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard.as_mut().ok_or(AuditError::Closed)?;
        writer
            .write_all(&line)
            .and_then(|()| writer.flush())
            .map_err(|source| self.io_error(source))
    }

    /// Vacía y sincroniza el archivo. Los `append` posteriores fallan.
    pub fn close(&self) -> Result<(), AuditError> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut writer) = guard.take() else {
            return Ok(());
        };
        writer.flush().map_err(|source| self.io_error(source))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Lee un registro de auditoría omitiendo las líneas que no se pueden
/// interpretar (por ejemplo, la última línea de una ejecución interrumpida).
pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(error) => debug!(line = index + 1, %error, "línea de auditoría ilegible omitida"),
        }
    }
    Ok(records)
}

/// Totales de una ejecución para la presentación final.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AuditSummary {
    pub total: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: usize,
    pub bytes_saved: u64,
}

impl AuditSummary {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        records.iter().fold(Self::default(), |mut summary, record| {
            summary.record(record);
            summary
        })
    }

    pub fn record(&mut self, record: &AuditRecord) {
        self.total += 1;
        match record.status {
            AuditStatus::Cleaned => {
                self.cleaned += 1;
                self.bytes_saved += record.original_size.saturating_sub(record.new_size);
            }
            AuditStatus::Skipped => self.skipped += 1,
            AuditStatus::Error => self.errors += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_writes_one_json_object_per_line() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let trail = AuditTrail::open(&dir.path().join("logs"))?;

        trail.append(&AuditRecord::cleaned(
            Path::new("a.jpg"),
            100,
            60,
            vec!["GPS".into()],
            None,
        ))?;
        trail.append(&AuditRecord::skipped(Path::new("b.bin"), 10, "tipo no soportado"))?;
        trail.close()?;

        let contents = fs::read_to_string(trail.path())?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"status\":\"CLEANED\""));
        assert!(lines[0].contains("\"error\":null"));
        assert!(!lines[0].contains("note"));
        assert!(lines[1].contains("\"status\":\"SKIPPED\""));

        let name = trail
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("filescrub_audit_"));
        assert!(name.ends_with(".jsonl"));
        Ok(())
    }

    #[test]
    fn append_after_close_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let trail = AuditTrail::open(dir.path())?;
        trail.close()?;

        let result = trail.append(&AuditRecord::error(Path::new("x"), 0, "fallo"));
        assert!(matches!(result, Err(AuditError::Closed)));
        Ok(())
    }

    #[test]
    fn two_trails_in_the_same_second_do_not_collide() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = AuditTrail::open(dir.path())?;
        let second = AuditTrail::open(dir.path())?;
        assert_ne!(first.path(), second.path());
        Ok(())
    }

    #[test]
    fn read_records_skips_malformed_lines() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let trail = AuditTrail::open(dir.path())?;
        trail.append(&AuditRecord::cleaned(Path::new("a.pdf"), 500, 300, vec![], None))?;
        trail.append(&AuditRecord::error(Path::new("b.pdf"), 40, "corrupto"))?;
        trail.close()?;

        let mut file = OpenOptions::new().append(true).open(trail.path())?;
        file.write_all(b"{\"timestamp\": \"truncad")?;
        drop(file);

        let records = read_records(trail.path())?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].error.as_deref(), Some("corrupto"));

        let summary = AuditSummary::from_records(&records);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.cleaned, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.bytes_saved, 200);
        Ok(())
    }
}
