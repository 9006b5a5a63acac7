//! Clasificación de archivos por contenido (números mágicos), nunca por nombre.

use infer::Infer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const OFFICE_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
];

const ZIP_MIME: &str = "application/zip";
const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";

/// Carpeta de la parte principal de cada paquete OOXML.
const OOXML_MAIN_FOLDERS: [(&str, &str); 3] = [
    ("word/", OFFICE_MIME_TYPES[0]),
    ("xl/", OFFICE_MIME_TYPES[1]),
    ("ppt/", OFFICE_MIME_TYPES[2]),
];

/// Categoría gruesa derivada del tipo MIME detectado.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Category {
    Image,
    Pdf,
    OfficeDocument,
    Media,
    Unsupported,
}

impl Category {
    /// Categorías que requieren un manejador registrado.
    pub const HANDLED: [Category; 4] = [
        Category::Image,
        Category::Pdf,
        Category::OfficeDocument,
        Category::Media,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Pdf => "pdf",
            Category::OfficeDocument => "office",
            Category::Media => "media",
            Category::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Origen del tipo MIME devuelto.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Confidence {
    /// Firma binaria reconocida en el contenido.
    Content,
    /// Modo degradado: el tipo se adivinó por la extensión y puede estar falsificado.
    ExtensionGuess,
    /// No se pudo derivar ningún tipo.
    Indeterminate,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub detected_mime: Option<String>,
    pub category: Category,
    pub confidence: Confidence,
}

impl FileIdentity {
    fn indeterminate(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            detected_mime: None,
            category: Category::Unsupported,
            confidence: Confidence::Indeterminate,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.confidence == Confidence::ExtensionGuess
    }
}

pub struct Classifier {
    infer: Infer,
    content_sniffing: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            infer: Infer::new(),
            content_sniffing: true,
        }
    }

    /// Clasificador sin inspección de contenido. Solo para entornos donde la
    /// detección por firmas no está disponible.
    pub fn extension_only() -> Self {
        Self {
            infer: Infer::new(),
            content_sniffing: false,
        }
    }

    /// Clasifica `path` leyendo su cabecera. Nunca falla: un archivo ausente,
    /// ilegible o irreconocible queda como `Unsupported` sin MIME.
    pub fn classify(&self, path: &Path) -> FileIdentity {
        if !self.content_sniffing {
            return classify_by_extension(path);
        }

        let mut mime = match self.infer.get_from_path(path) {
            Ok(Some(kind)) => kind.mime_type().to_string(),
            Ok(None) | Err(_) => return FileIdentity::indeterminate(path),
        };
        // `infer` solo reconoce OOXML por el orden de las entradas del ZIP.
        if mime == ZIP_MIME {
            if let Some(office) = ooxml_package_mime(path) {
                mime = office.to_string();
            }
        }

        FileIdentity {
            path: path.to_path_buf(),
            category: category_for_mime(&mime),
            detected_mime: Some(mime),
            confidence: Confidence::Content,
        }
    }
}

/// Tabla fija de MIME a categoría.
pub fn category_for_mime(mime: &str) -> Category {
    if mime.starts_with("image/") {
        Category::Image
    } else if mime == "application/pdf" {
        Category::Pdf
    } else if OFFICE_MIME_TYPES.contains(&mime) {
        Category::OfficeDocument
    } else if mime.starts_with("audio/") || mime.starts_with("video/") {
        Category::Media
    } else {
        Category::Unsupported
    }
}

/// Identifica un paquete OOXML por su contenido: `[Content_Types].xml` más
/// la carpeta de la parte principal, en cualquier orden de entradas.
fn ooxml_package_mime(path: &Path) -> Option<&'static str> {
    let archive = ZipArchive::new(File::open(path).ok()?).ok()?;
    if !archive.file_names().any(|name| name == CONTENT_TYPES_ENTRY) {
        return None;
    }
    OOXML_MAIN_FOLDERS
        .iter()
        .find(|(folder, _)| archive.file_names().any(|name| name.starts_with(folder)))
        .map(|(_, mime)| *mime)
}

fn classify_by_extension(path: &Path) -> FileIdentity {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "docx" => OFFICE_MIME_TYPES[0],
        "xlsx" => OFFICE_MIME_TYPES[1],
        "pptx" => OFFICE_MIME_TYPES[2],
        "doc" => OFFICE_MIME_TYPES[3],
        "xls" => OFFICE_MIME_TYPES[4],
        "ppt" => OFFICE_MIME_TYPES[5],
        "mp3" => "audio/mpeg",
        "flac" => "audio/x-flac",
        "wav" => "audio/x-wav",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/m4a",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return FileIdentity::indeterminate(path),
    };

    if !path.is_file() {
        return FileIdentity::indeterminate(path);
    }

    FileIdentity {
        path: path.to_path_buf(),
        detected_mime: Some(mime.to_string()),
        category: category_for_mime(mime),
        confidence: Confidence::ExtensionGuess,
    }
}
