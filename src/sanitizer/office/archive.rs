use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{DateTime, ZipArchive, ZipWriter};

use crate::error::SanitizeError;

/// Reescribe un paquete ZIP entrada por entrada aplicando `transform` al
/// contenido. Las marcas de tiempo de todas las entradas se normalizan a la
/// fecha mínima del formato.
pub(crate) fn rewrite_archive<F>(
    input: &Path,
    target: &mut File,
    mut transform: F,
) -> Result<(), SanitizeError>
where
    F: FnMut(&str, Vec<u8>) -> Result<Vec<u8>, SanitizeError>,
{
    let source = File::open(input)?;
    let mut archive = ZipArchive::new(source)
        .map_err(|e| SanitizeError::corrupt(format!("No es un documento Office válido: {e}")))?;

    let mut writer = ZipWriter::new(target);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error)?;
        let name = entry.name().to_string();

        let mut options = FileOptions::<'_, ()>::default()
            .compression_method(entry.compression())
            .last_modified_time(DateTime::default());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }

        if entry.is_dir() {
            writer.add_directory(name, options).map_err(zip_error)?;
            continue;
        }

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;

        let data = transform(&name, contents)?;

        writer.start_file(name, options).map_err(zip_error)?;
        writer.write_all(&data)?;
    }

    writer.finish().map_err(zip_error)?;
    Ok(())
}

fn zip_error(error: ZipError) -> SanitizeError {
    match error {
        ZipError::Io(inner) => SanitizeError::Io(inner),
        other => SanitizeError::corrupt(format!("Error procesando el paquete ZIP: {other}")),
    }
}
