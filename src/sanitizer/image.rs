//! Saneamiento de imágenes: inventario de etiquetas EXIF y bloques auxiliares,
//! y reconstrucción desde píxeles decodificados en un contenedor nuevo.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader};
use tracing::debug;

use super::{Manifest, SanitizeError, Sanitizer, commit_scratch, scratch_beside};

pub struct ImageSanitizer;

impl Sanitizer for ImageSanitizer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn process(&self, input: &Path, output: &Path) -> Result<Manifest, SanitizeError> {
        let bytes = fs::read(input)?;

        let mut manifest = Manifest::new();
        manifest.extend(exif_fields(&bytes)?);
        manifest.extend(container_fields(&bytes));

        let reader = ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(SanitizeError::Io)?;
        let format = reader
            .format()
            .ok_or_else(|| SanitizeError::UnsupportedFormat("imagen sin formato reconocible".into()))?;

        let mut decoder = reader.into_decoder().map_err(map_image_error)?;
        if decoder.icc_profile().map_err(map_image_error)?.is_some() {
            manifest.push("ICC Profile");
        }
        let orientation = decoder.orientation().map_err(map_image_error)?;

        // Solo se conservan los píxeles; la orientación se aplica antes de
        // descartar la etiqueta para no alterar la imagen visible.
        let mut pixels = DynamicImage::from_decoder(decoder).map_err(map_image_error)?;
        pixels.apply_orientation(orientation);
        let pixels = fresh_pixels(pixels, format);

        let mut scratch = scratch_beside(output)?;
        {
            let mut writer = BufWriter::new(scratch.as_file_mut());
            pixels
                .write_to(&mut writer, format)
                .map_err(map_image_error)?;
            writer.flush()?;
        }

        if !verify_image_metadata_clean(scratch.path())? {
            return Err(SanitizeError::VerificationFailed(
                "la imagen reconstruida conserva campos EXIF".into(),
            ));
        }

        commit_scratch(scratch, output)?;
        debug!(path = %input.display(), ?format, fields = manifest.fields().len(), "imagen reconstruida");
        Ok(manifest)
    }
}

/// Ajusta el búfer a lo que el codificador del formato original admite.
fn fresh_pixels(pixels: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Jpeg => match pixels {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => pixels,
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => {
                DynamicImage::ImageLuma8(pixels.to_luma8())
            }
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        _ => pixels,
    }
}

fn map_image_error(error: ImageError) -> SanitizeError {
    match error {
        ImageError::Unsupported(inner) => SanitizeError::UnsupportedFormat(inner.to_string()),
        ImageError::IoError(inner) => SanitizeError::Io(inner),
        other => SanitizeError::corrupt(other),
    }
}

/// Campos EXIF presentes y no vacíos, agrupados por nombre semántico.
fn exif_fields(bytes: &[u8]) -> Result<Vec<&'static str>, SanitizeError> {
    let mut reader = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_))
        | Err(exif::Error::BlankValue(_))
        | Err(exif::Error::InvalidFormat(_))
        | Err(exif::Error::NotSupported(_)) => return Ok(Vec::new()),
        Err(exif::Error::Io(error)) => return Err(SanitizeError::Io(error)),
        Err(other) => {
            debug!(error = %other, "bloque EXIF ilegible, se descarta en la reconstrucción");
            return Ok(vec!["Exif Data"]);
        }
    };

    let mut fields = Vec::new();
    for field in exif.fields() {
        if field.display_value().to_string().trim().trim_matches('"').is_empty() {
            continue;
        }
        let name = exif_field_name(field.tag);
        if !fields.contains(&name) {
            fields.push(name);
        }
    }
    Ok(fields)
}

fn exif_field_name(tag: exif::Tag) -> &'static str {
    use exif::Tag;

    if tag.context() == exif::Context::Gps {
        return "GPS";
    }

    match tag {
        Tag::Make | Tag::Model => "Make/Model",
        Tag::BodySerialNumber
        | Tag::LensSerialNumber
        | Tag::LensMake
        | Tag::LensModel
        | Tag::CameraOwnerName
        | Tag::ImageUniqueID => "Device Identifiers",
        Tag::Orientation => "Orientation",
        Tag::DateTime | Tag::DateTimeOriginal | Tag::DateTimeDigitized => "Date/Time",
        Tag::Software => "Software",
        Tag::Artist => "Artist",
        Tag::Copyright => "Copyright",
        Tag::ImageDescription | Tag::UserComment => "Description",
        _ => "Exif Data",
    }
}

/// Bloques auxiliares fuera de EXIF: texto PNG y segmentos JPEG de aplicación.
fn container_fields(bytes: &[u8]) -> Vec<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return png_fields(bytes);
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return jpeg_fields(bytes);
    }
    Vec::new()
}

fn png_fields(bytes: &[u8]) -> Vec<&'static str> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(_) => return Vec::new(),
    };
    let info = reader.info();

    let mut fields = Vec::new();
    if !info.uncompressed_latin1_text.is_empty()
        || !info.compressed_latin1_text.is_empty()
        || !info.utf8_text.is_empty()
    {
        fields.push("Text Chunks");
    }
    fields
}

fn jpeg_fields(bytes: &[u8]) -> Vec<&'static str> {
    const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/";

    let mut fields = Vec::new();
    let mut offset = 2;
    while offset + 4 <= bytes.len() && bytes[offset] == 0xFF {
        let marker = bytes[offset + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        let length = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
        let payload_end = (offset + 2 + length).min(bytes.len());
        let payload = &bytes[(offset + 4).min(payload_end)..payload_end];

        match marker {
            0xE1 if payload.starts_with(XMP_SIGNATURE) => fields.push("XMP Metadata"),
            0xED => fields.push("IPTC/Photoshop"),
            0xFE if !payload.iter().all(|b| b.is_ascii_whitespace() || *b == 0) => {
                fields.push("Comment")
            }
            _ => {}
        }
        offset += 2 + length;
    }
    fields
}

/// Comprueba que una imagen carece de campos EXIF residuales.
pub fn verify_image_metadata_clean(path: &Path) -> Result<bool, SanitizeError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(exif.fields().next().is_none()),
        Err(exif::Error::NotFound(_)) | Err(exif::Error::BlankValue(_)) => Ok(true),
        Err(exif::Error::InvalidFormat(_)) | Err(exif::Error::NotSupported(_)) => Ok(true),
        Err(exif::Error::Io(err)) => Err(SanitizeError::Io(err)),
        Err(other) => Err(SanitizeError::VerificationFailed(format!(
            "Error verificando metadata EXIF: {other}"
        ))),
    }
}
