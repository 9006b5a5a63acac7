//! FileScrub: elimina metadata identificativa de imágenes, PDF, documentos
//! Office y archivos multimedia.
//!
//! Uso: `filescrub <RUTA> [--destructive] [--passes N] ...`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, anyhow};
use clap::Parser;
use filescrub::config::{DEFAULT_AUDIT_DIR, DEFAULT_PASSES, DEFAULT_SUFFIX};
use filescrub::{Pipeline, PipelineOptions, ui};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filescrub", version, about = "Saneamiento de metadata con auditoría")]
struct Cli {
    /// Archivo o directorio a sanear
    target: PathBuf,

    /// No recorre subdirectorios
    #[arg(long)]
    no_recursive: bool,

    /// Borra de forma segura los originales y los reemplaza por la versión limpia
    #[arg(long, env = "FILESCRUB_DESTRUCTIVE")]
    destructive: bool,

    /// Pasadas de sobrescritura del borrado seguro
    #[arg(long, default_value_t = DEFAULT_PASSES, env = "FILESCRUB_PASSES")]
    passes: u32,

    /// Incluye archivos y directorios ocultos
    #[arg(long)]
    include_hidden: bool,

    /// Archivos procesados en paralelo (por defecto, los núcleos disponibles)
    #[arg(long, env = "FILESCRUB_WORKERS")]
    workers: Option<usize>,

    /// Directorio del registro de auditoría
    #[arg(long, default_value = DEFAULT_AUDIT_DIR, env = "FILESCRUB_AUDIT_DIR")]
    audit_dir: PathBuf,

    /// Sufijo de las copias limpias en modo no destructivo
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    /// Clasifica por extensión en lugar de por contenido (inseguro)
    #[arg(long)]
    extension_only: bool,
}

impl Cli {
    fn options(&self) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            recursive: !self.no_recursive,
            destructive: self.destructive,
            passes: self.passes,
            ignore_hidden: !self.include_hidden,
            workers: self.workers.unwrap_or(defaults.workers),
            cleaned_suffix: self.suffix.clone(),
            audit_dir: self.audit_dir.clone(),
            content_sniffing: !self.extension_only,
            ..defaults
        }
        .normalized()
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filescrub=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = cli.options();

    ui::render_header();
    if options.destructive {
        ui::render_destructive_warning(options.passes);
    }

    let pipeline = Pipeline::with_defaults(options)
        .context("No se pudo iniciar el registro de auditoría")?;

    let (sender, receiver) = mpsc::channel();
    let progress = thread::spawn(move || ui::track_progress(receiver));

    let started = Instant::now();
    let report = pipeline.run(&cli.target, Some(sender));
    let failures = progress
        .join()
        .map_err(|_| anyhow!("El hilo de progreso terminó de forma inesperada"))?;
    let report = report
        .with_context(|| format!("No se pudo procesar `{}`", cli.target.display()))?;

    let audit_path = pipeline
        .finish()
        .context("No se pudo cerrar el registro de auditoría")?;

    ui::render_summary(&report.summary, &audit_path, started.elapsed());
    ui::render_failures(&failures);

    Ok(if report.summary.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
