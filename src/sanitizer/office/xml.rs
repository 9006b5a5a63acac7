use std::io::Cursor;

use tracing::debug;
use xmltree::{Element, EmitterConfig, XMLNode};

use super::fields::{CUSTOM_PROPERTIES_EMPTY, FieldSpec};
use crate::error::SanitizeError;

/// Limpia los campos de `specs` en cualquier nivel del árbol. Devuelve el XML
/// (sin reserializar si nada cambió) y las etiquetas de los campos borrados.
pub(crate) fn clear_fields(
    contents: Vec<u8>,
    specs: &[FieldSpec],
) -> Result<(Vec<u8>, Vec<&'static str>), SanitizeError> {
    let mut root = Element::parse(Cursor::new(&contents[..]))
        .map_err(|e| SanitizeError::corrupt(format!("XML de metadata ilegible: {e}")))?;

    let mut removed = Vec::new();
    let mut modified = false;
    for spec in specs {
        let outcome = clear_matching(&mut root, spec);
        modified |= outcome.modified;
        if outcome.had_value && !removed.contains(&spec.label) {
            removed.push(spec.label);
        }
    }

    if !modified {
        return Ok((contents, removed));
    }

    let mut output = Vec::new();
    let mut config = EmitterConfig::new();
    config.perform_indent = false;
    config.write_document_declaration = true;
    root.write_with_config(&mut output, config)
        .map_err(|e| SanitizeError::corrupt(format!("No se pudo escribir el XML saneado: {e}")))?;

    Ok((output, removed))
}

#[derive(Default)]
struct ClearOutcome {
    modified: bool,
    had_value: bool,
}

fn clear_matching(element: &mut Element, spec: &FieldSpec) -> ClearOutcome {
    let mut outcome = ClearOutcome::default();
    for node in element.children.iter_mut() {
        let XMLNode::Element(child) = node else {
            continue;
        };

        if element_matches(child, spec) {
            let current = element_text_content(child);
            if current != spec.cleared_value && !current.is_empty() {
                outcome.had_value = true;
            }
            outcome.modified |= set_element_text(child, spec.cleared_value);
        } else {
            let nested = clear_matching(child, spec);
            outcome.modified |= nested.modified;
            outcome.had_value |= nested.had_value;
        }
    }
    outcome
}

/// Nombre local normalizado: descarta cualquier prefijo que el productor haya
/// dejado embebido en el nombre.
fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Coincidencia por nombre local. Un espacio de nombres distinto del esperado
/// no impide la coincidencia porque los productores no lo vinculan de forma
/// consistente; solo se registra.
pub(crate) fn element_matches(element: &Element, spec: &FieldSpec) -> bool {
    if local_name(&element.name) != spec.local_name {
        return false;
    }

    let actual = element.namespace.as_deref().unwrap_or(spec.namespace);
    if actual != spec.namespace {
        debug!(
            field = spec.local_name,
            expected = spec.namespace,
            actual,
            "campo con espacio de nombres inesperado"
        );
    }
    true
}

/// Sustituye el texto de un elemento si difiere del valor actual.
pub(crate) fn set_element_text(element: &mut Element, new_value: &str) -> bool {
    let has_markup = element
        .children
        .iter()
        .any(|node| !matches!(node, XMLNode::Text(_)));
    if !has_markup && element_text_content(element) == new_value {
        return false;
    }

    element.children.clear();
    if !new_value.is_empty() {
        element.children.push(XMLNode::Text(new_value.to_string()));
    }
    true
}

/// Devuelve el texto plano contenido dentro de un elemento.
pub(crate) fn element_text_content(element: &Element) -> String {
    let mut content = String::new();
    for node in &element.children {
        match node {
            XMLNode::Text(text) | XMLNode::CData(text) => content.push_str(text),
            XMLNode::Element(child) => content.push_str(&element_text_content(child)),
            _ => {}
        }
    }
    content.trim().to_string()
}

/// Reemplaza las propiedades personalizadas por un conjunto vacío. Indica si
/// el original contenía alguna propiedad.
pub(crate) fn clear_custom_properties(contents: &[u8]) -> (Vec<u8>, bool) {
    let had_properties = match Element::parse(Cursor::new(contents)) {
        Ok(root) => root.children.iter().any(|node| match node {
            XMLNode::Element(_) => true,
            XMLNode::Text(text) => !text.trim().is_empty(),
            _ => false,
        }),
        Err(_) => contents != CUSTOM_PROPERTIES_EMPTY.as_bytes(),
    };
    (CUSTOM_PROPERTIES_EMPTY.as_bytes().to_vec(), had_properties)
}
