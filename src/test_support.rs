//! Archivos de muestra con metadata identificativa, generados en memoria.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document, Object, Stream, dictionary};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const CAMERA_MAKE: &str = "SpyCam 3000";
pub const CAMERA_SOFTWARE: &str = "Tuner 1.0";
pub const PDF_AUTHOR: &str = "Jane Informant";
pub const PDF_REVISED_AUTHOR: &str = "Revisor Interno";

/// JPEG de 8x8 con un segmento APP1 EXIF (Make y Software) tras el SOI.
pub fn jpeg_with_exif() -> TestResult<Vec<u8>> {
    let mut plain = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 16, 16])))
        .write_to(&mut Cursor::new(&mut plain), ImageFormat::Jpeg)?;

    let tiff = exif_tiff_block();
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);
    let segment_len = u16::try_from(payload.len() + 2)?;

    let mut jpeg = Vec::with_capacity(plain.len() + payload.len() + 4);
    jpeg.extend_from_slice(&plain[..2]);
    jpeg.extend_from_slice(&[0xFF, 0xE1]);
    jpeg.extend_from_slice(&segment_len.to_be_bytes());
    jpeg.extend_from_slice(&payload);
    jpeg.extend_from_slice(&plain[2..]);
    Ok(jpeg)
}

fn exif_tiff_block() -> Vec<u8> {
    let make = format!("{CAMERA_MAKE}\0");
    let software = format!("{CAMERA_SOFTWARE}\0");
    // Cabecera (8) + número de entradas (2) + 2 entradas (24) + siguiente IFD (4).
    let data_offset = 8 + 2 + 2 * 12 + 4;

    let mut tiff = b"MM\0\x2A".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&2u16.to_be_bytes());
    push_ascii_entry(&mut tiff, 0x010F, make.len(), data_offset);
    push_ascii_entry(&mut tiff, 0x0131, software.len(), data_offset + make.len());
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(make.as_bytes());
    tiff.extend_from_slice(software.as_bytes());
    tiff
}

fn push_ascii_entry(tiff: &mut Vec<u8>, tag: u16, count: usize, offset: usize) {
    tiff.extend_from_slice(&tag.to_be_bytes());
    tiff.extend_from_slice(&2u16.to_be_bytes());
    tiff.extend_from_slice(&(count as u32).to_be_bytes());
    tiff.extend_from_slice(&(offset as u32).to_be_bytes());
}

/// JPEG de 8x8 sin ningún bloque de metadata.
pub fn plain_jpeg() -> TestResult<Vec<u8>> {
    let mut plain = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([16, 200, 16])))
        .write_to(&mut Cursor::new(&mut plain), ImageFormat::Jpeg)?;
    Ok(plain)
}

/// PNG de 4x4 con un fragmento tEXt.
pub fn png_with_text() -> TestResult<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, 4, 4);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.add_text_chunk("Author".to_string(), "Jane Informant".to_string())?;
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&[90u8; 4 * 4 * 3])?;
        writer.finish()?;
    }
    Ok(bytes)
}

/// PDF de una página con diccionario Info y flujo XMP en el catálogo.
pub fn pdf_with_info() -> TestResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
        }),
    );

    let metadata_id = doc.add_object(Stream::new(
        dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
        b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">Jane Informant</x:xmpmeta>".to_vec(),
    ));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "Metadata" => metadata_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Author" => Object::string_literal(PDF_AUTHOR),
        "Producer" => Object::string_literal("ScanSuite 9"),
        "Title" => Object::string_literal(""),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Relleno que deja el `%%EOF` anterior fuera de los últimos 512 bytes, donde
/// los lectores buscan el último `startxref`.
fn eof_window_padding() -> String {
    format!("\n%{}\n", "-".repeat(600))
}

/// `pdf_with_info` seguido de una actualización incremental que sustituye el
/// diccionario Info. La revisión anterior sigue en los bytes del archivo.
pub fn pdf_with_incremental_update() -> TestResult<Vec<u8>> {
    let mut bytes = pdf_with_info()?;
    let base = Document::load_mem(&bytes)?;
    let (root_number, root_generation) = base.trailer.get(b"Root")?.as_reference()?;
    let info_id = base.max_id + 1;

    bytes.extend_from_slice(eof_window_padding().as_bytes());
    let object_offset = bytes.len();
    bytes.extend_from_slice(
        format!("{info_id} 0 obj\n<< /Author ({PDF_REVISED_AUTHOR}) >>\nendobj\n").as_bytes(),
    );
    let xref_offset = bytes.len();
    bytes.extend_from_slice(
        format!(
            "xref\n{info_id} 1\n{object_offset:010} 00000 n\r\n\
             trailer\n<< /Size {size} /Root {root_number} {root_generation} R \
             /Info {info_id} 0 R /Prev {prev} >>\n\
             startxref\n{xref_offset}\n%%EOF\n",
            size = info_id + 1,
            prev = base.xref_start,
        )
        .as_bytes(),
    );
    Ok(bytes)
}

/// PDF linealizado de una página y sin metadata: sección de referencias de la
/// primera página al inicio, enlazada por `/Prev` con la principal al final.
pub fn linearized_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.5\n".to_vec();

    let linearization_offset = bytes.len();
    bytes.extend_from_slice(
        b"1 0 obj\n<< /Linearized 1 /O 3 /E 0 /N 1 /T 0 /H [0 0] >>\nendobj\n",
    );

    // Los desplazamientos de la sección principal se conocen al final; la
    // sección de la primera página se reserva con ancho fijo.
    let first_xref_offset = bytes.len();
    let first_section = |main_xref: usize| {
        format!(
            "xref\n1 1\n{linearization_offset:010} 00000 n\r\n\
             trailer\n<< /Size 5 /Root 2 0 R /Prev {main_xref:010} >>\n\
             startxref\n0\n%%EOF"
        )
    };
    let placeholder_len = first_section(0).len();
    bytes.extend_from_slice(first_section(0).as_bytes());
    bytes.extend_from_slice(eof_window_padding().as_bytes());

    let mut offsets = Vec::new();
    for object in [
        "2 0 obj\n<< /Type /Catalog /Pages 4 0 R >>\nendobj\n",
        "3 0 obj\n<< /Type /Page /Parent 4 0 R >>\nendobj\n",
        "4 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 200 200] >>\nendobj\n",
    ] {
        offsets.push(bytes.len());
        bytes.extend_from_slice(object.as_bytes());
    }

    let main_xref_offset = bytes.len();
    let mut main = String::from("xref\n0 1\n0000000000 65535 f\r\n2 3\n");
    for offset in offsets {
        main.push_str(&format!("{offset:010} 00000 n\r\n"));
    }
    main.push_str(&format!(
        "trailer\n<< /Size 5 >>\nstartxref\n{first_xref_offset}\n%%EOF\n"
    ));
    bytes.extend_from_slice(main.as_bytes());

    let first = first_section(main_xref_offset);
    debug_assert_eq!(first.len(), placeholder_len);
    bytes[first_xref_offset..first_xref_offset + placeholder_len].copy_from_slice(first.as_bytes());
    bytes
}

pub const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
                   xmlns:dc="http://purl.org/dc/elements/1.1/"
                   xmlns:dcterms="http://purl.org/dc/terms/"
                   xmlns:dcmitype="http://purl.org/dc/dcmitype/"
                   xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <dc:creator>Autor Prueba</dc:creator>
    <cp:lastModifiedBy>Editor Prueba</cp:lastModifiedBy>
    <dcterms:created xsi:type="dcterms:W3CDTF">2024-01-01T00:00:00Z</dcterms:created>
    <dcterms:modified xsi:type="dcterms:W3CDTF">2024-02-01T00:00:00Z</dcterms:modified>
    <dc:title>Documento Demo</dc:title>
    <cp:revision>6</cp:revision>
</cp:coreProperties>
"#;

pub const APP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"
            xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
    <Application>Microsoft Word</Application>
    <TotalTime>42</TotalTime>
    <Company>Compania Demo</Company>
    <Pages>2</Pages>
</Properties>
"#;

const CUSTOM_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties"
            xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
    <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="CustomField">
        <vt:lpwstr>Dato Confidencial</vt:lpwstr>
    </property>
</Properties>
"#;

/// DOCX mínimo con `core.xml`, `app.xml` y `custom.xml` rellenos.
pub fn write_sample_docx(path: &Path) -> TestResult {
    write_docx_with(path, CORE_XML, APP_XML, Some(CUSTOM_XML))
}

pub fn write_docx_with(
    path: &Path,
    core_xml: &str,
    app_xml: &str,
    custom_xml: Option<&str>,
) -> TestResult {
    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>
"#;

    const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>
"#;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
    <w:body>
        <w:p><w:r><w:t>Documento de prueba</w:t></w:r></w:p>
    </w:body>
</w:document>
"#;

    let file = File::create(path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Stored);

    writer.start_file("[Content_Types].xml", options)?;
    writer.write_all(CONTENT_TYPES.as_bytes())?;

    writer.start_file("_rels/.rels", options)?;
    writer.write_all(RELS_XML.as_bytes())?;

    writer.start_file("word/document.xml", options)?;
    writer.write_all(DOCUMENT_XML.as_bytes())?;

    writer.start_file("docProps/core.xml", options)?;
    writer.write_all(core_xml.as_bytes())?;

    writer.start_file("docProps/app.xml", options)?;
    writer.write_all(app_xml.as_bytes())?;

    if let Some(custom_xml) = custom_xml {
        writer.start_file("docProps/custom.xml", options)?;
        writer.write_all(custom_xml.as_bytes())?;
    }

    writer.finish()?;
    Ok(())
}

/// Cuadros MPEG de relleno que simulan el flujo de audio.
pub fn mpeg_frames() -> Vec<u8> {
    let mut frames = Vec::new();
    for _ in 0..4 {
        frames.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        frames.extend_from_slice(&[0u8; 413]);
    }
    frames
}

/// MP3 con etiqueta ID3v2.3 al inicio e ID3v1 al final.
pub fn mp3_with_tags() -> Vec<u8> {
    let mut frame = b"TIT2".to_vec();
    let text = b"\0Cancion Secreta";
    frame.extend_from_slice(&(text.len() as u32).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(text);

    let mut bytes = b"ID3\x03\x00\x00".to_vec();
    let size = frame.len();
    bytes.extend_from_slice(&[
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]);
    bytes.extend_from_slice(&frame);
    bytes.extend_from_slice(&mpeg_frames());

    let mut id3v1 = vec![0u8; 128];
    id3v1[..3].copy_from_slice(b"TAG");
    id3v1[3..18].copy_from_slice(b"Cancion Secreta");
    bytes.extend_from_slice(&id3v1);
    bytes
}

pub fn flac_audio() -> Vec<u8> {
    vec![0xFF, 0xF8, 0x69, 0x08, 0x00, 0x00, 0x12, 0x34]
}

/// FLAC con STREAMINFO y un VORBIS_COMMENT como último bloque.
pub fn flac_with_comments() -> Vec<u8> {
    let comment = b"\x0b\0\0\0referenceXX\x01\0\0\0\x0e\0\0\0ARTIST=Espia01";

    let mut bytes = b"fLaC".to_vec();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 34]);
    bytes.extend_from_slice(&[0x11; 34]);
    bytes.push(0x84);
    bytes.extend_from_slice(&[0x00, 0x00, comment.len() as u8]);
    bytes.extend_from_slice(comment);
    bytes.extend_from_slice(&flac_audio());
    bytes
}

pub fn riff_chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut chunk = id.to_vec();
    chunk.extend_from_slice(&(data.len() as u32).to_le_bytes());
    chunk.extend_from_slice(data);
    if data.len() % 2 == 1 {
        chunk.push(0);
    }
    chunk
}

pub fn wav_from_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(&body);
    bytes
}

pub fn wav_fmt_chunk() -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&8000u32.to_le_bytes());
    fmt.extend_from_slice(&16000u32.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());
    riff_chunk(b"fmt ", &fmt)
}

/// WAV con LIST/INFO (tamaño impar, con relleno) y un chunk `bext`.
pub fn wav_with_info() -> Vec<u8> {
    let mut info = b"INFO".to_vec();
    info.extend_from_slice(&riff_chunk(b"IART", b"Espia"));
    wav_from_chunks(&[
        wav_fmt_chunk(),
        riff_chunk(b"LIST", &info),
        riff_chunk(b"bext", &[0x20; 17]),
        riff_chunk(b"data", &[0u8; 64]),
    ])
}

pub const MP4_GPS: &str = "+40.4461-079.9822/";
pub const MP4_TITLE: &str = "Reunion Privada";
pub const MP4_SAMPLES: [u8; 64] = [0x5A; 64];

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut bytes = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(kind);
    bytes.extend_from_slice(payload);
    bytes
}

/// MP4 con coordenadas en `moov/udta/©xyz`, título en `moov/meta/ilst` y las
/// muestras en un `mdat` final.
pub fn mp4_with_user_data() -> Vec<u8> {
    let mut location = (MP4_GPS.len() as u16).to_be_bytes().to_vec();
    location.extend_from_slice(&[0x15, 0xC7]);
    location.extend_from_slice(MP4_GPS.as_bytes());
    let udta = mp4_box(b"udta", &mp4_box(b"\xA9xyz", &location));

    let mut data = vec![0, 0, 0, 1, 0, 0, 0, 0];
    data.extend_from_slice(MP4_TITLE.as_bytes());
    let ilst = mp4_box(b"ilst", &mp4_box(b"\xA9nam", &mp4_box(b"data", &data)));
    let mut meta_payload = vec![0u8; 4];
    meta_payload.extend_from_slice(&mp4_box(b"hdlr", &[0u8; 25]));
    meta_payload.extend_from_slice(&ilst);
    let meta = mp4_box(b"meta", &meta_payload);

    let trak = mp4_box(b"trak", &mp4_box(b"tkhd", &[0u8; 84]));
    let moov = mp4_box(b"moov", &[mp4_box(b"mvhd", &[0u8; 100]), udta, meta, trak].concat());

    [
        mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2"),
        moov,
        mp4_box(b"mdat", &MP4_SAMPLES),
    ]
    .concat()
}

pub fn aiff_chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut chunk = id.to_vec();
    chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
    chunk.extend_from_slice(data);
    if data.len() % 2 == 1 {
        chunk.push(0);
    }
    chunk
}

pub fn aiff_from_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut bytes = b"FORM".to_vec();
    bytes.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
    bytes.extend_from_slice(b"AIFF");
    bytes.extend_from_slice(&body);
    bytes
}

pub fn aiff_comm_chunk() -> Vec<u8> {
    aiff_chunk(b"COMM", &[0, 1, 0, 0, 0, 8, 0, 16, 0x40, 0x0B, 0xFA, 0, 0, 0, 0, 0, 0, 0])
}

pub fn aiff_ssnd_chunk() -> Vec<u8> {
    aiff_chunk(b"SSND", &[0u8; 24])
}

/// AIFF con `NAME` (tamaño impar, con relleno) y `AUTH`.
pub fn aiff_with_text() -> Vec<u8> {
    aiff_from_chunks(&[
        aiff_comm_chunk(),
        aiff_chunk(b"NAME", b"Grabacion"),
        aiff_chunk(b"AUTH", b"Espia"),
        aiff_ssnd_chunk(),
    ])
}
