//! Saneamiento de documentos Office Open XML (docx, xlsx, pptx).

mod archive;
mod fields;
mod xml;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use self::archive::rewrite_archive;
use self::fields::{
    APP_FIELDS, APP_PROPERTIES_ENTRY, CORE_FIELDS, CORE_PROPERTIES_ENTRY, CUSTOM_PROPERTIES_ENTRY,
};
use self::xml::{clear_custom_properties, clear_fields};
use super::{Manifest, SanitizeError, Sanitizer, write_atomically};

/// Firma de los contenedores OLE2 de Office 97-2003.
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub struct OfficeSanitizer;

impl Sanitizer for OfficeSanitizer {
    fn name(&self) -> &'static str {
        "office"
    }

    fn process(&self, input: &Path, output: &Path) -> Result<Manifest, SanitizeError> {
        if is_legacy_ole(input)? {
            return Err(SanitizeError::UnsupportedFormat(
                "documento Office binario (OLE2) no soportado".into(),
            ));
        }

        let mut manifest = Manifest::new();
        write_atomically(output, |file| {
            rewrite_archive(input, file, |name, contents| match name {
                CORE_PROPERTIES_ENTRY => {
                    let (data, removed) = clear_fields(contents, &CORE_FIELDS)?;
                    manifest.extend(removed);
                    Ok(data)
                }
                APP_PROPERTIES_ENTRY => {
                    let (data, removed) = clear_fields(contents, &APP_FIELDS)?;
                    manifest.extend(removed);
                    Ok(data)
                }
                CUSTOM_PROPERTIES_ENTRY => {
                    let (data, had_properties) = clear_custom_properties(&contents);
                    if had_properties {
                        manifest.push("Custom Properties");
                    }
                    Ok(data)
                }
                _ => Ok(contents),
            })
        })?;

        debug!(path = %input.display(), fields = manifest.fields().len(), "paquete Office reescrito");
        Ok(manifest)
    }
}

fn is_legacy_ole(path: &Path) -> Result<bool, SanitizeError> {
    let mut header = [0u8; 8];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(read == header.len() && header == OLE_SIGNATURE)
}
