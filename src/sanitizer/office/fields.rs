//! Campos de `docProps` que se limpian y su nombre semántico en el manifiesto.

pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const CP_NS: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const APP_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";

pub const CORE_PROPERTIES_ENTRY: &str = "docProps/core.xml";
pub const APP_PROPERTIES_ENTRY: &str = "docProps/app.xml";
pub const CUSTOM_PROPERTIES_ENTRY: &str = "docProps/custom.xml";

pub const CUSTOM_PROPERTIES_EMPTY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/custom-properties\" xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\"/>\n";

/// Identifica un campo por (espacio de nombres, nombre local) y define el
/// valor que se considera limpio.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub namespace: &'static str,
    pub local_name: &'static str,
    pub cleared_value: &'static str,
    pub label: &'static str,
}

const fn field(
    namespace: &'static str,
    local_name: &'static str,
    cleared_value: &'static str,
    label: &'static str,
) -> FieldSpec {
    FieldSpec {
        namespace,
        local_name,
        cleared_value,
        label,
    }
}

pub const CORE_FIELDS: [FieldSpec; 11] = [
    field(DC_NS, "creator", "", "Author"),
    field(CP_NS, "lastModifiedBy", "", "Last Modified By"),
    field(CP_NS, "revision", "", "Revision Number"),
    field(DCTERMS_NS, "created", "", "Creation Date"),
    field(DCTERMS_NS, "modified", "", "Modification Date"),
    field(DC_NS, "title", "", "Title"),
    field(DC_NS, "subject", "", "Subject"),
    field(DC_NS, "description", "", "Description"),
    field(CP_NS, "keywords", "", "Keywords"),
    field(CP_NS, "category", "", "Category"),
    field(CP_NS, "contentStatus", "", "Content Status"),
];

// TotalTime es numérico: se reinicia a cero en lugar de vaciarse.
pub const APP_FIELDS: [FieldSpec; 4] = [
    field(APP_NS, "TotalTime", "0", "Editing Time"),
    field(APP_NS, "Company", "", "Company"),
    field(APP_NS, "Manager", "", "Manager"),
    field(APP_NS, "Application", "", "Application"),
];
