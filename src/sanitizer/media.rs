//! Saneamiento de audio y video a nivel de contenedor.
//!
//! MP3, FLAC, WAV, AIFF y Ogg (Vorbis y Opus) se reescriben sin sus bloques de
//! etiquetas. En MP4/MOV las cajas de metadata se convierten en `free` del
//! mismo tamaño para no desplazar los offsets de las muestras. Cualquier otro
//! contenedor se copia íntegro y se reporta como limpieza a ciegas.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use super::{Manifest, SanitizeError, Sanitizer, write_atomically};

pub const BLIND_STRIP: &str = "Media Metadata (Blind Strip)";

const ID3V2_HEADER_LEN: usize = 10;
const ID3V1_LEN: usize = 128;
const APE_FOOTER_LEN: usize = 32;
const IFF_HEADER_LEN: usize = 12;
const OGG_PAGE_HEADER_LEN: usize = 27;
const OGG_CONTINUED: u8 = 0x01;
const OGG_END_OF_STREAM: u8 = 0x04;

/// Cajas que se recorren en busca de `udta` y `meta`.
const MP4_CONTAINERS: [&[u8; 4]; 4] = [b"moov", b"trak", b"mdia", b"minf"];
/// Primeras cajas válidas de un archivo MP4/QuickTime.
const MP4_LEADING_BOXES: [&[u8; 4]; 4] = [b"ftyp", b"moov", b"mdat", b"wide"];
const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MediaKind {
    Mp3,
    Flac,
    Wav,
    Aiff,
    Mp4,
    Ogg,
    Other,
}

pub struct MediaSanitizer;

impl Sanitizer for MediaSanitizer {
    fn name(&self) -> &'static str {
        "media"
    }

    fn process(&self, input: &Path, output: &Path) -> Result<Manifest, SanitizeError> {
        let bytes = fs::read(input)?;
        let mut manifest = Manifest::new();

        let (body, prefixed) = strip_id3v2_prefix(&bytes)?;
        if prefixed {
            manifest.push("ID3v2 Tags");
        }

        let kind = detect_media_kind(body, prefixed);
        let cleaned = match kind {
            MediaKind::Mp3 => strip_mp3_trailers(body, &mut manifest),
            MediaKind::Flac => strip_flac_blocks(body, &mut manifest)?,
            MediaKind::Wav => strip_iff_chunks(body, Endian::Little, wav_chunk_label, &mut manifest)?,
            MediaKind::Aiff => strip_iff_chunks(body, Endian::Big, aiff_chunk_label, &mut manifest)?,
            MediaKind::Mp4 => neutralize_mp4_metadata(body, &mut manifest)?,
            MediaKind::Ogg => match strip_ogg_comments(body, &mut manifest)? {
                Some(cleaned) => cleaned,
                None => blind_copy(input, body, &mut manifest),
            },
            MediaKind::Other => blind_copy(input, body, &mut manifest),
        };

        write_atomically(output, |file| {
            file.write_all(&cleaned)?;
            Ok(())
        })?;

        debug!(
            path = %input.display(),
            ?kind,
            removed_bytes = bytes.len().saturating_sub(cleaned.len()),
            "contenedor multimedia reescrito"
        );
        Ok(manifest)
    }
}

fn blind_copy(input: &Path, body: &[u8], manifest: &mut Manifest) -> Vec<u8> {
    warn!(path = %input.display(), "contenedor multimedia sin soporte de etiquetas, copia a ciegas");
    manifest.push(BLIND_STRIP);
    body.to_vec()
}

fn detect_media_kind(body: &[u8], after_id3: bool) -> MediaKind {
    if body.starts_with(b"fLaC") {
        return MediaKind::Flac;
    }
    if body.starts_with(b"OggS") {
        return MediaKind::Ogg;
    }
    if body.len() >= IFF_HEADER_LEN {
        let form = &body[8..12];
        if body.starts_with(b"RIFF") && form == b"WAVE" {
            return MediaKind::Wav;
        }
        if body.starts_with(b"FORM") && (form == b"AIFF" || form == b"AIFC") {
            return MediaKind::Aiff;
        }
    }
    if body.len() >= 8 && MP4_LEADING_BOXES.iter().any(|kind| &body[4..8] == *kind) {
        return MediaKind::Mp4;
    }
    if after_id3 || is_mpeg_frame_sync(body) {
        return MediaKind::Mp3;
    }
    MediaKind::Other
}

fn is_mpeg_frame_sync(body: &[u8]) -> bool {
    body.len() >= 2 && body[0] == 0xFF && body[1] & 0xE0 == 0xE0
}

fn syncsafe(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(0usize, |acc, byte| (acc << 7) | usize::from(byte & 0x7F))
}

/// Descarta todas las etiquetas ID3v2 consecutivas al inicio del archivo.
fn strip_id3v2_prefix(bytes: &[u8]) -> Result<(&[u8], bool), SanitizeError> {
    let mut offset = 0;
    while bytes.len() >= offset + ID3V2_HEADER_LEN && bytes[offset..].starts_with(b"ID3") {
        let header = &bytes[offset..offset + ID3V2_HEADER_LEN];
        let has_footer = header[5] & 0x10 != 0;
        let tag_len = ID3V2_HEADER_LEN
            + syncsafe(&header[6..10])
            + if has_footer { ID3V2_HEADER_LEN } else { 0 };

        if offset + tag_len > bytes.len() {
            return Err(SanitizeError::corrupt("etiqueta ID3v2 truncada"));
        }
        offset += tag_len;
    }
    Ok((&bytes[offset..], offset > 0))
}

fn strip_mp3_trailers(body: &[u8], manifest: &mut Manifest) -> Vec<u8> {
    let mut end = body.len();

    if end >= ID3V1_LEN && body[end - ID3V1_LEN..].starts_with(b"TAG") {
        end -= ID3V1_LEN;
        manifest.push("ID3v1 Tags");
    }

    if end >= APE_FOOTER_LEN && body[end - APE_FOOTER_LEN..end].starts_with(b"APETAGEX") {
        let footer = &body[end - APE_FOOTER_LEN..end];
        let size = u32::from_le_bytes([footer[12], footer[13], footer[14], footer[15]]) as usize;
        let flags = u32::from_le_bytes([footer[20], footer[21], footer[22], footer[23]]);
        let has_header = flags & 0x8000_0000 != 0;
        let total = size + if has_header { APE_FOOTER_LEN } else { 0 };

        if total <= end {
            end -= total;
            manifest.push("APE Tags");
        }
    }

    body[..end].to_vec()
}

fn flac_block_label(block_type: u8) -> Option<&'static str> {
    match block_type {
        2 => Some("Application Data"),
        4 => Some("Vorbis Comments"),
        6 => Some("Embedded Picture"),
        _ => None,
    }
}

/// Reconstruye la cadena de bloques de metadata FLAC sin comentarios,
/// imágenes ni bloques de aplicación.
fn strip_flac_blocks(body: &[u8], manifest: &mut Manifest) -> Result<Vec<u8>, SanitizeError> {
    let mut kept: Vec<(u8, &[u8])> = Vec::new();
    let mut offset = 4;

    loop {
        if offset + 4 > body.len() {
            return Err(SanitizeError::corrupt("cadena de bloques FLAC truncada"));
        }
        let header = body[offset];
        let is_last = header & 0x80 != 0;
        let block_type = header & 0x7F;
        let length = (usize::from(body[offset + 1]) << 16)
            | (usize::from(body[offset + 2]) << 8)
            | usize::from(body[offset + 3]);

        let data_start = offset + 4;
        let data_end = data_start + length;
        if data_end > body.len() {
            return Err(SanitizeError::corrupt("bloque de metadata FLAC truncado"));
        }

        match flac_block_label(block_type) {
            Some(label) => manifest.push(label),
            None => kept.push((block_type, &body[data_start..data_end])),
        }

        offset = data_end;
        if is_last {
            break;
        }
    }

    if !kept.iter().any(|(block_type, _)| *block_type == 0) {
        return Err(SanitizeError::corrupt("FLAC sin bloque STREAMINFO"));
    }

    let mut output = Vec::with_capacity(body.len());
    output.extend_from_slice(b"fLaC");
    let last_index = kept.len() - 1;
    for (index, (block_type, data)) in kept.iter().enumerate() {
        let mut header = *block_type;
        if index == last_index {
            header |= 0x80;
        }
        let length = data.len();
        output.push(header);
        output.extend_from_slice(&[(length >> 16) as u8, (length >> 8) as u8, length as u8]);
        output.extend_from_slice(data);
    }
    output.extend_from_slice(&body[offset..]);
    Ok(output)
}

#[derive(Clone, Copy, Debug)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }

    fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

fn wav_chunk_label(id: &[u8], data: &[u8]) -> Option<&'static str> {
    match id {
        b"LIST" if data.starts_with(b"INFO") => Some("RIFF INFO"),
        b"id3 " | b"ID3 " => Some("ID3v2 Tags"),
        b"bext" => Some("Broadcast Extension"),
        b"iXML" => Some("iXML Metadata"),
        b"_PMX" => Some("XMP Metadata"),
        _ => None,
    }
}

fn aiff_chunk_label(id: &[u8], _data: &[u8]) -> Option<&'static str> {
    match id {
        b"NAME" | b"AUTH" | b"(c) " | b"ANNO" => Some("AIFF Text Chunks"),
        b"COMT" => Some("AIFF Comments"),
        b"ID3 " | b"id3 " => Some("ID3v2 Tags"),
        b"APPL" => Some("Application Data"),
        _ => None,
    }
}

/// Reescribe los chunks de un contenedor IFF (RIFF o FORM) sin los de
/// metadata y recalcula el tamaño total.
fn strip_iff_chunks(
    body: &[u8],
    endian: Endian,
    label_for: fn(&[u8], &[u8]) -> Option<&'static str>,
    manifest: &mut Manifest,
) -> Result<Vec<u8>, SanitizeError> {
    let mut output = Vec::with_capacity(body.len());
    output.extend_from_slice(&body[..IFF_HEADER_LEN]);

    let mut offset = IFF_HEADER_LEN;
    while offset + 8 <= body.len() {
        let id = &body[offset..offset + 4];
        let size = endian.read_u32(&body[offset + 4..offset + 8]) as usize;

        let data_start = offset + 8;
        let data_end = data_start + size;
        if data_end > body.len() {
            return Err(SanitizeError::corrupt("chunk IFF truncado"));
        }
        let padded_end = (data_end + (size & 1)).min(body.len());

        match label_for(id, &body[data_start..data_end]) {
            Some(label) => manifest.push(label),
            None => output.extend_from_slice(&body[offset..padded_end]),
        }
        offset = padded_end;
    }
    output.extend_from_slice(&body[offset..]);

    let form_size = u32::try_from(output.len() - 8)
        .map_err(|_| SanitizeError::corrupt("contenedor IFF demasiado grande"))?;
    output[4..8].copy_from_slice(&endian.write_u32(form_size));
    Ok(output)
}

// === MP4/MOV ===

struct Mp4Box {
    kind: [u8; 4],
    start: usize,
    header_len: usize,
    end: usize,
}

impl Mp4Box {
    fn payload_start(&self) -> usize {
        self.start + self.header_len
    }
}

fn read_mp4_box(data: &[u8], offset: usize, limit: usize) -> Result<Mp4Box, SanitizeError> {
    if offset + 8 > limit {
        return Err(SanitizeError::corrupt("cabecera de caja MP4 truncada"));
    }
    let size = u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
    let mut kind = [0_u8; 4];
    kind.copy_from_slice(&data[offset + 4..offset + 8]);

    let (header_len, total) = match size {
        0 => (8, limit - offset),
        1 => {
            if offset + 16 > limit {
                return Err(SanitizeError::corrupt("tamaño extendido de caja MP4 truncado"));
            }
            let mut large = [0_u8; 8];
            large.copy_from_slice(&data[offset + 8..offset + 16]);
            let total = usize::try_from(u64::from_be_bytes(large))
                .map_err(|_| SanitizeError::corrupt("caja MP4 demasiado grande"))?;
            (16, total)
        }
        size => (8, size as usize),
    };

    if total < header_len || offset + total > limit {
        return Err(SanitizeError::corrupt(format!(
            "caja MP4 `{}` fuera de límites",
            String::from_utf8_lossy(&kind)
        )));
    }
    Ok(Mp4Box {
        kind,
        start: offset,
        header_len,
        end: offset + total,
    })
}

fn mp4_box_label(kind: &[u8; 4], payload: &[u8]) -> Option<&'static str> {
    match kind {
        b"udta" => Some("MP4 User Data"),
        b"meta" => Some("MP4 Metadata (ilst)"),
        b"uuid" if payload.starts_with(&XMP_UUID) => Some("XMP Metadata"),
        _ => None,
    }
}

/// Convierte las cajas de metadata en `free` con el contenido a cero.
fn neutralize_mp4_metadata(body: &[u8], manifest: &mut Manifest) -> Result<Vec<u8>, SanitizeError> {
    let mut output = body.to_vec();
    let end = output.len();
    neutralize_mp4_range(&mut output, 0, end, manifest)?;
    Ok(output)
}

fn neutralize_mp4_range(
    data: &mut [u8],
    start: usize,
    end: usize,
    manifest: &mut Manifest,
) -> Result<(), SanitizeError> {
    let mut offset = start;
    // Algunos productores rellenan el final con menos de una cabecera.
    while offset + 8 <= end {
        let entry = read_mp4_box(data, offset, end)?;
        let payload_start = entry.payload_start();
        let label = mp4_box_label(&entry.kind, &data[payload_start..entry.end]);

        match label {
            Some(label) => {
                if data[payload_start..entry.end].iter().any(|byte| *byte != 0) {
                    manifest.push(label);
                }
                data[entry.start + 4..entry.start + 8].copy_from_slice(b"free");
                data[payload_start..entry.end].fill(0);
            }
            None if MP4_CONTAINERS.contains(&&entry.kind) => {
                neutralize_mp4_range(data, payload_start, entry.end, manifest)?;
            }
            None => {}
        }
        offset = entry.end;
    }
    Ok(())
}

// === Ogg ===

struct OggPage<'a> {
    header_type: u8,
    granule: u64,
    serial: u32,
    lacing: &'a [u8],
    body: &'a [u8],
}

fn read_ogg_pages(data: &[u8]) -> Result<Vec<OggPage<'_>>, SanitizeError> {
    let mut pages = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if offset + OGG_PAGE_HEADER_LEN > data.len() || &data[offset..offset + 4] != b"OggS" {
            return Err(SanitizeError::corrupt("página Ogg truncada o desalineada"));
        }
        let header = &data[offset..offset + OGG_PAGE_HEADER_LEN];
        let mut granule = [0_u8; 8];
        granule.copy_from_slice(&header[6..14]);
        let serial = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);

        let lacing_start = offset + OGG_PAGE_HEADER_LEN;
        let lacing_end = lacing_start + usize::from(header[26]);
        if lacing_end > data.len() {
            return Err(SanitizeError::corrupt("tabla de segmentos Ogg truncada"));
        }
        let lacing = &data[lacing_start..lacing_end];
        let body_end = lacing_end + lacing.iter().map(|value| usize::from(*value)).sum::<usize>();
        if body_end > data.len() {
            return Err(SanitizeError::corrupt("página Ogg truncada"));
        }

        pages.push(OggPage {
            header_type: header[5],
            granule: u64::from_le_bytes(granule),
            serial,
            lacing,
            body: &data[lacing_end..body_end],
        });
        offset = body_end;
    }
    Ok(pages)
}

/// Codecs Ogg cuyas cabeceras se saben reescribir: prefijo del paquete de
/// comentarios, número de paquetes de cabecera y si el comentario lleva bit
/// de enmarcado.
struct OggCodec {
    comment_prefix: &'static [u8],
    header_packets: usize,
    framing_bit: bool,
}

const VORBIS: OggCodec = OggCodec {
    comment_prefix: b"\x03vorbis",
    header_packets: 3,
    framing_bit: true,
};

const OPUS: OggCodec = OggCodec {
    comment_prefix: b"OpusTags",
    header_packets: 2,
    framing_bit: false,
};

fn ogg_codec(identification: &[u8]) -> Option<&'static OggCodec> {
    if identification.starts_with(b"\x01vorbis") {
        Some(&VORBIS)
    } else if identification.starts_with(b"OpusHead") {
        Some(&OPUS)
    } else {
        None
    }
}

/// Reemplaza el paquete de comentarios de un flujo Vorbis u Opus por uno
/// vacío que conserva el vendor. Devuelve `None` si el codec no se reconoce.
fn strip_ogg_comments(body: &[u8], manifest: &mut Manifest) -> Result<Option<Vec<u8>>, SanitizeError> {
    let pages = read_ogg_pages(body)?;
    let Some(first) = pages.first() else {
        return Err(SanitizeError::corrupt("flujo Ogg vacío"));
    };
    if pages.iter().any(|page| page.serial != first.serial) {
        return Err(SanitizeError::UnsupportedFormat(
            "Ogg con varios flujos lógicos".into(),
        ));
    }
    let Some(codec) = ogg_codec(first.body) else {
        return Ok(None);
    };

    let (packets, header_pages) = collect_header_packets(&pages, codec.header_packets)?;
    let comment = &packets[1];
    if !comment.starts_with(codec.comment_prefix) {
        return Err(SanitizeError::corrupt("falta el paquete de comentarios Ogg"));
    }
    let (vendor, count) = parse_comment_header(&comment[codec.comment_prefix.len()..])?;
    if count == 0 {
        return Ok(Some(body.to_vec()));
    }
    manifest.push("Vorbis Comments");

    let mut empty_comment = codec.comment_prefix.to_vec();
    empty_comment.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    empty_comment.extend_from_slice(vendor);
    empty_comment.extend_from_slice(&0u32.to_le_bytes());
    if codec.framing_bit {
        empty_comment.push(0x01);
    }

    let serial = first.serial;
    let mut output = Vec::with_capacity(body.len());
    write_ogg_page(&mut output, first.header_type, first.granule, serial, 0, first.lacing, first.body);

    let mut rewritten: Vec<&[u8]> = vec![empty_comment.as_slice()];
    rewritten.extend(packets[2..].iter().map(Vec::as_slice));
    let end_of_stream = pages[header_pages - 1].header_type & OGG_END_OF_STREAM;
    let mut sequence = write_header_pages(&mut output, &rewritten, serial, end_of_stream);

    for page in &pages[header_pages..] {
        write_ogg_page(&mut output, page.header_type, page.granule, serial, sequence, page.lacing, page.body);
        sequence += 1;
    }
    Ok(Some(output))
}

/// Reensambla los primeros `count` paquetes. El primero debe ocupar sola la
/// primera página y el último debe cerrar su página.
fn collect_header_packets(
    pages: &[OggPage<'_>],
    count: usize,
) -> Result<(Vec<Vec<u8>>, usize), SanitizeError> {
    let mut packets = Vec::with_capacity(count);
    let mut current = Vec::new();

    for (index, page) in pages.iter().enumerate() {
        let mut cursor = 0;
        for (segment, value) in page.lacing.iter().enumerate() {
            let length = usize::from(*value);
            current.extend_from_slice(&page.body[cursor..cursor + length]);
            cursor += length;
            if length < 255 {
                packets.push(std::mem::take(&mut current));
                let closes_page = segment + 1 == page.lacing.len();
                if (index == 0 || packets.len() == count) && !closes_page {
                    return Err(SanitizeError::UnsupportedFormat(
                        "cabeceras Ogg compartiendo página con otros paquetes".into(),
                    ));
                }
                if packets.len() == count {
                    return Ok((packets, index + 1));
                }
            }
        }
    }
    Err(SanitizeError::corrupt("cabeceras Ogg incompletas"))
}

fn parse_comment_header(data: &[u8]) -> Result<(&[u8], u32), SanitizeError> {
    let truncated = || SanitizeError::corrupt("comentario Ogg truncado");
    if data.len() < 4 {
        return Err(truncated());
    }
    let vendor_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let vendor_end = 4 + vendor_len;
    if data.len() < vendor_end + 4 {
        return Err(truncated());
    }
    let count = u32::from_le_bytes([
        data[vendor_end],
        data[vendor_end + 1],
        data[vendor_end + 2],
        data[vendor_end + 3],
    ]);
    Ok((&data[4..vendor_end], count))
}

/// Escribe los paquetes de cabecera a partir de la secuencia 1 y devuelve la
/// siguiente secuencia libre.
fn write_header_pages(output: &mut Vec<u8>, packets: &[&[u8]], serial: u32, end_of_stream: u8) -> u32 {
    let mut segments: Vec<(&[u8], bool)> = Vec::new();
    for packet in packets {
        let mut chunks = packet.chunks(255).peekable();
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            segments.push((chunk, last && chunk.len() < 255));
        }
        if packet.len() % 255 == 0 {
            segments.push((&[] as &[u8], true));
        }
    }

    let mut sequence = 1;
    let mut continued = false;
    let page_count = segments.len().div_ceil(255);
    for (index, page_segments) in segments.chunks(255).enumerate() {
        let lacing: Vec<u8> = page_segments.iter().map(|(chunk, _)| chunk.len() as u8).collect();
        let body: Vec<u8> = page_segments.iter().flat_map(|(chunk, _)| chunk.iter().copied()).collect();
        let completes_packet = page_segments.iter().any(|(_, ends)| *ends);

        let mut header_type = if continued { OGG_CONTINUED } else { 0 };
        if index + 1 == page_count {
            header_type |= end_of_stream;
        }
        let granule = if completes_packet { 0 } else { u64::MAX };
        write_ogg_page(output, header_type, granule, serial, sequence, &lacing, &body);

        continued = page_segments.last().is_some_and(|(_, ends)| !ends);
        sequence += 1;
    }
    sequence
}

fn write_ogg_page(
    output: &mut Vec<u8>,
    header_type: u8,
    granule: u64,
    serial: u32,
    sequence: u32,
    lacing: &[u8],
    body: &[u8],
) {
    let start = output.len();
    output.extend_from_slice(b"OggS");
    output.push(0);
    output.push(header_type);
    output.extend_from_slice(&granule.to_le_bytes());
    output.extend_from_slice(&serial.to_le_bytes());
    output.extend_from_slice(&sequence.to_le_bytes());
    output.extend_from_slice(&[0; 4]);
    output.push(lacing.len() as u8);
    output.extend_from_slice(lacing);
    output.extend_from_slice(body);

    let crc = ogg_crc(&output[start..]);
    output[start + 22..start + 26].copy_from_slice(&crc.to_le_bytes());
}

/// CRC-32 de Ogg: polinomio 0x04C11DB7, sin reflexión ni XOR final.
fn ogg_crc(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0_u32, |crc, byte| {
        let mut crc = crc ^ (u32::from(*byte) << 24);
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
        crc
    })
}
