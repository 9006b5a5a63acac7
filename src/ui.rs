//! Presentación en terminal: cabecera, progreso y resumen final.

use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Row, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::{AuditRecord, AuditStatus, AuditSummary};
use crate::formatting::{format_duration, format_size};
use crate::pipeline::PipelineEvent;

const HEADER_WIDTH: usize = 66;

pub fn render_header() {
    let border = "═".repeat(HEADER_WIDTH - 2);
    println!("{}", style(format!("╔{}╗", border)).cyan().bold());
    println!(
        "{}",
        style(format!(
            "║ {:^inner_width$} ║",
            "FileScrub | Saneamiento de metadata",
            inner_width = HEADER_WIDTH - 4
        ))
        .cyan()
        .bold()
    );
    println!("{}\n", style(format!("╚{}╝", border)).cyan().bold());
}

pub fn render_destructive_warning(passes: u32) {
    println!(
        "{}",
        style(format!(
            "Modo destructivo: los originales se sobrescriben {passes} vez/veces y se reemplazan."
        ))
        .yellow()
        .bold()
    );
    println!(
        "{}\n",
        style("El borrado seguro es de mejor esfuerzo; en SSD o sistemas con instantáneas pueden quedar copias.")
            .yellow()
            .dim()
    );
}

/// Consume los eventos del orquestador mostrando una barra de progreso.
/// Devuelve los registros con error para el resumen final.
pub fn track_progress(events: Receiver<PipelineEvent>) -> Vec<AuditRecord> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .map(|style| style.progress_chars("█▸ "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut failures = Vec::new();
    for event in events {
        match event {
            PipelineEvent::Started { total } => bar.set_length(total as u64),
            PipelineEvent::Processing { path, .. } => {
                bar.set_message(style(path.display().to_string()).dim().to_string());
            }
            PipelineEvent::Finished { path, record, .. } => {
                bar.inc(1);
                match record.status {
                    AuditStatus::Cleaned => {}
                    AuditStatus::Skipped => bar.println(format!(
                        "{} {}",
                        style("OMITIDO").yellow(),
                        path.display()
                    )),
                    AuditStatus::Error => {
                        bar.println(format!("{} {}", style("ERROR").red().bold(), path.display()));
                        failures.push(record);
                    }
                }
            }
            PipelineEvent::Completed { .. } => bar.finish_and_clear(),
        }
    }
    bar.finish_and_clear();
    failures
}

pub fn render_summary(summary: &AuditSummary, audit_path: &Path, elapsed: Duration) {
    let mut table = build_table(&["Resultado", "Valor"]);
    table.add_row(build_row("Archivos", &summary.total.to_string(), Color::White));
    table.add_row(build_row("Saneados", &summary.cleaned.to_string(), Color::Green));
    table.add_row(build_row("Omitidos", &summary.skipped.to_string(), Color::Yellow));
    table.add_row(build_row(
        "Errores",
        &summary.errors.to_string(),
        if summary.errors > 0 { Color::Red } else { Color::White },
    ));
    table.add_row(build_row("Bytes eliminados", &format_size(summary.bytes_saved), Color::White));
    table.add_row(build_row("Duración", &format_duration(elapsed), Color::White));
    table.add_row(build_row(
        "Registro de auditoría",
        &audit_path.display().to_string(),
        Color::DarkGrey,
    ));
    println!("{table}");
}

pub fn render_failures(failures: &[AuditRecord]) {
    if failures.is_empty() {
        return;
    }

    let mut table = build_table(&["Archivo", "Error"]);
    for record in failures {
        table.add_row(Row::from(vec![
            Cell::new(&record.file_path),
            Cell::new(record.error.as_deref().unwrap_or("desconocido")).fg(Color::Red),
        ]));
    }
    println!("\n{}", style("Archivos no saneados").red().bold());
    println!("{table}");
}

fn build_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(headers.iter().map(|text| header_cell(text)).collect::<Vec<_>>());
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
        .add_attribute(Attribute::Underlined)
}

fn build_row(label: &str, value: &str, value_color: Color) -> Row {
    Row::from(vec![
        Cell::new(label).fg(Color::Rgb {
            r: 160,
            g: 196,
            b: 255,
        }),
        Cell::new(value).fg(value_color),
    ])
}
