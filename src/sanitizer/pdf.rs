//! Saneamiento de PDF: diccionario Info, flujo XMP, PieceInfo e historial
//! de actualizaciones incrementales mediante una reescritura completa.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use super::{Manifest, SanitizeError, Sanitizer, write_atomically};

const INFO_FIELDS: [(&[u8], &str); 8] = [
    (b"Title", "Title"),
    (b"Author", "Author"),
    (b"Subject", "Subject"),
    (b"Keywords", "Keywords"),
    (b"Creator", "Creator Application"),
    (b"Producer", "Producer"),
    (b"CreationDate", "Creation Date"),
    (b"ModDate", "Modification Date"),
];

pub struct PdfSanitizer;

impl Sanitizer for PdfSanitizer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn process(&self, input: &Path, output: &Path) -> Result<Manifest, SanitizeError> {
        let bytes = fs::read(input)?;
        let mut doc = Document::load_mem(&bytes).map_err(SanitizeError::corrupt)?;
        let had_incremental_updates = has_incremental_updates(&bytes, &doc);
        let mut manifest = Manifest::new();

        manifest.extend(remove_document_info(&mut doc));
        manifest.extend(remove_catalog_entries(&mut doc)?);
        manifest.extend(remove_page_entries(&mut doc));

        if !doc.trailer.has(b"Encrypt") && doc.trailer.remove(b"ID").is_some() {
            manifest.push("Document ID");
        }
        doc.trailer.remove(b"Prev");
        doc.trailer.remove(b"XRefStm");

        let pruned = doc.prune_objects();
        debug!(path = %input.display(), pruned = pruned.len(), "objetos PDF huérfanos eliminados");

        // lopdf siempre serializa el documento completo con una sola tabla de
        // referencias cruzadas, lo que descarta las secciones incrementales.
        write_atomically(output, |file| {
            let mut writer = BufWriter::new(file);
            doc.save_to(&mut writer).map_err(SanitizeError::corrupt)?;
            writer.flush()?;
            Ok(())
        })?;

        if had_incremental_updates {
            manifest.push("Incremental Updates (History)");
        }
        Ok(manifest)
    }
}

fn remove_document_info(doc: &mut Document) -> Vec<&'static str> {
    let Some(info) = doc.trailer.remove(b"Info") else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    if let Some(dict) = deref_dictionary(doc, &info) {
        for (key, value) in dict.iter() {
            let Some(text) = object_to_string(doc, value) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let name = INFO_FIELDS
                .iter()
                .find(|(known, _)| *known == key.as_slice())
                .map(|(_, name)| *name)
                .unwrap_or("Document Info");
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
    }

    if let Object::Reference(id) = info {
        doc.objects.remove(&id);
    }
    fields
}

fn remove_catalog_entries(doc: &mut Document) -> Result<Vec<&'static str>, SanitizeError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| SanitizeError::corrupt("el trailer no referencia un catálogo"))?;

    let catalog = doc
        .get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .map_err(SanitizeError::corrupt)?;

    let mut fields = Vec::new();
    let mut orphaned = Vec::new();
    if let Some(metadata) = catalog.remove(b"Metadata") {
        fields.push("XMP Metadata");
        orphaned.extend(reference_of(&metadata));
    }
    if let Some(piece_info) = catalog.remove(b"PieceInfo") {
        fields.push("PieceInfo");
        orphaned.extend(reference_of(&piece_info));
    }

    for id in orphaned {
        doc.objects.remove(&id);
    }
    Ok(fields)
}

fn remove_page_entries(doc: &mut Document) -> Vec<&'static str> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    let mut fields = Vec::new();
    let mut orphaned = Vec::new();
    for page_id in page_ids {
        let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) else {
            continue;
        };
        if let Some(metadata) = page.remove(b"Metadata") {
            orphaned.extend(reference_of(&metadata));
            if !fields.contains(&"XMP Metadata") {
                fields.push("XMP Metadata");
            }
        }
        if let Some(piece_info) = page.remove(b"PieceInfo") {
            orphaned.extend(reference_of(&piece_info));
            if !fields.contains(&"PieceInfo") {
                fields.push("PieceInfo");
            }
        }
    }

    for id in orphaned {
        doc.objects.remove(&id);
    }
    fields
}

fn reference_of(object: &Object) -> Option<ObjectId> {
    match object {
        Object::Reference(id) => Some(*id),
        _ => None,
    }
}

fn deref_dictionary<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(reference) => doc.get_dictionary(*reference).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn object_to_string(doc: &Document, obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).trim().to_string()),
        Object::Reference(reference) => doc
            .get_object(*reference)
            .ok()
            .and_then(|inner| object_to_string(doc, inner)),
        _ => None,
    }
}

fn decode_pdf_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units).trim().to_string();
    }
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Un archivo sin historial tiene una sola sección `startxref`, o dos si está
/// linealizado (la de la primera página enlaza con la principal por `/Prev`).
fn has_incremental_updates(bytes: &[u8], doc: &Document) -> bool {
    let sections = count_occurrences(bytes, b"startxref");
    let base_sections = if is_linearized(doc) { 2 } else { 1 };
    sections > base_sections
}

fn is_linearized(doc: &Document) -> bool {
    doc.objects
        .values()
        .any(|object| object.as_dict().is_ok_and(|dict| dict.has(b"Linearized")))
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}
