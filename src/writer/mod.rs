//! PE image writer.
//!
//! Edits are applied without relocating anything in the original image: a new section is
//! appended that holds every rewritten method body followed by the re-serialized metadata, and
//! the CLI header and `MethodDef` RVAs are pointed at it. The original bodies and metadata stay
//! in place, unreferenced.
//!
//! # Key Components
//!
//! - [`write_image`] - produce a complete image from a loaded file and edited metadata
//! - [`Output`] - atomic, memory-mapped output file
//!
//! # Header Growth
//!
//! The new section header goes directly after the existing section table. When the header
//! area has no slack left, the headers grow by one file alignment unit and every raw file
//! pointer past the headers is shifted: section data, debug directory entries and the COFF
//! symbol table. This is only possible while the grown headers still end below the first
//! section's RVA.

mod output;

pub use output::Output;

use std::collections::BTreeMap;

use crate::{
    file::{
        align_up,
        io::{read_le_at, write_le_at},
        File, PeLayout, DIRECTORY_CERTIFICATE, SECTION_HEADER_SIZE,
    },
    metadata::{
        cor20header::{
            COMIMAGE_FLAGS_STRONGNAMESIGNED, COR20_FLAGS_OFFSET, COR20_METADATA_RVA_OFFSET,
            COR20_METADATA_SIZE_OFFSET,
        },
        method::MethodBody,
        tables::{methoddef, TableId},
        Metadata,
    },
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Name of the appended section.
pub const SECTION_NAME: [u8; 8] = *b".mlg\0\0\0\0";

/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
pub const SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

const DEBUG_ENTRY_SIZE: usize = 28;
const DEBUG_POINTER_TO_RAW_DATA: usize = 24;

/// Produce a new image from `file` with `metadata` and the rewritten `bodies` applied.
///
/// `bodies` is keyed by `MethodDef` row. `metadata` is not modified; the RVAs of rewritten
/// methods are set on a copy.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] if the section table cannot be extended and
/// [`crate::Error::Malformed`] if the metadata cannot be encoded or the image is inconsistent.
pub fn write_image(
    file: &File,
    metadata: &Metadata,
    bodies: &BTreeMap<u32, MethodBody>,
) -> Result<Vec<u8>> {
    let layout = file.layout();
    let section_rva = layout.next_section_rva()?;

    let mut metadata = metadata.clone();
    let mut content = Vec::new();
    for (rid, body) in bodies {
        pad_to(&mut content, 4);
        let rva = add(section_rva, to_u32(content.len())?)?;
        metadata
            .tables
            .tables
            .set(TableId::MethodDef, *rid, methoddef::RVA, rva)?;
        content.extend_from_slice(&body.write()?);
        log::debug!("Placed body of method {rid} at {rva:#x}");
    }

    pad_to(&mut content, 4);
    let metadata_rva = add(section_rva, to_u32(content.len())?)?;
    let metadata_bytes = metadata.write()?;
    let metadata_size = to_u32(metadata_bytes.len())?;
    content.extend_from_slice(&metadata_bytes);

    let mut data = file.data().to_vec();
    let shift = make_room_for_section_header(&mut data, layout)?;

    let file_alignment = layout.file_alignment.max(1);
    let raw_offset = aligned(to_u32(data.len())?, file_alignment)?;
    let raw_size = aligned(to_u32(content.len())?, file_alignment)?;
    let virtual_size = to_u32(content.len())?;
    let image_end = add(raw_offset, raw_size)?;

    data.resize(raw_offset as usize, 0);
    data.extend_from_slice(&content);
    data.resize(image_end as usize, 0);

    let mut header = Vec::with_capacity(SECTION_HEADER_SIZE);
    header.extend_from_slice(&SECTION_NAME);
    header.extend_from_slice(&virtual_size.to_le_bytes());
    header.extend_from_slice(&section_rva.to_le_bytes());
    header.extend_from_slice(&raw_size.to_le_bytes());
    header.extend_from_slice(&raw_offset.to_le_bytes());
    header.extend_from_slice(&[0; 12]);
    header.extend_from_slice(&SECTION_CHARACTERISTICS.to_le_bytes());
    let header_offset = layout.section_table_end();
    let Some(slot) = data.get_mut(header_offset..header_offset + SECTION_HEADER_SIZE) else {
        return Err(OutOfBounds);
    };
    slot.copy_from_slice(&header);

    let Some(number_of_sections) = layout.number_of_sections.checked_add(1) else {
        return Err(NotSupported);
    };
    let coff = layout.coff_header_offset();
    put_u16(&mut data, coff + 2, number_of_sections)?;

    let optional = layout.optional_header_offset();
    let initialized = get_u32(&data, optional + 8)?;
    put_u32(&mut data, optional + 8, initialized.saturating_add(raw_size))?;
    put_u32(
        &mut data,
        optional + 56,
        aligned(
            add(section_rva, virtual_size)?,
            layout.section_alignment.max(1),
        )?,
    )?;
    put_u32(&mut data, optional + 60, add(layout.size_of_headers, shift)?)?;
    // Checksum and signature no longer match the image
    put_u32(&mut data, optional + 64, 0)?;
    let certificate = layout.data_directory_offset(DIRECTORY_CERTIFICATE);
    put_u32(&mut data, certificate, 0)?;
    put_u32(&mut data, certificate + 4, 0)?;

    let cor20 = shifted(layout, layout.rva_to_offset(layout.clr.0)?, shift);
    put_u32(&mut data, cor20 + COR20_METADATA_RVA_OFFSET, metadata_rva)?;
    put_u32(&mut data, cor20 + COR20_METADATA_SIZE_OFFSET, metadata_size)?;
    let flags = get_u32(&data, cor20 + COR20_FLAGS_OFFSET)?;
    put_u32(
        &mut data,
        cor20 + COR20_FLAGS_OFFSET,
        flags & !COMIMAGE_FLAGS_STRONGNAMESIGNED,
    )?;

    log::debug!(
        "Appended section at {section_rva:#x}: {} bodies, {metadata_size} bytes of metadata",
        bodies.len()
    );
    Ok(data)
}

/// Ensure there is room for one more section header, growing the headers if needed.
///
/// Returns the number of bytes inserted after the headers.
fn make_room_for_section_header(data: &mut Vec<u8>, layout: &PeLayout) -> Result<u32> {
    let first_raw = first_raw_offset(layout);
    let header_end = layout.section_table_end() + SECTION_HEADER_SIZE;
    if header_end <= first_raw {
        return Ok(0);
    }

    let shift = layout.file_alignment.max(1);
    let grown = add(layout.size_of_headers, shift)?;
    let first_rva = layout
        .sections
        .iter()
        .map(|section| section.virtual_address)
        .min()
        .unwrap_or(u32::MAX);
    if grown > first_rva || header_end > grown as usize {
        log::warn!("No room for another section header below RVA {first_rva:#x}");
        return Err(NotSupported);
    }

    log::debug!("Growing headers by {shift:#x} bytes");
    let insert_at = first_raw.min(data.len());
    data.splice(insert_at..insert_at, vec![0u8; shift as usize]);

    for index in 0..layout.sections.len() {
        let field = layout.section_table_offset() + index * SECTION_HEADER_SIZE + 20;
        let pointer = get_u32(data, field)?;
        if pointer as usize >= first_raw {
            put_u32(data, field, add(pointer, shift)?)?;
        }
    }

    if let Some((rva, size)) = layout.debug {
        let directory = shifted(layout, layout.rva_to_offset(rva)?, shift);
        for entry in 0..size as usize / DEBUG_ENTRY_SIZE {
            let field = directory + entry * DEBUG_ENTRY_SIZE + DEBUG_POINTER_TO_RAW_DATA;
            let pointer = get_u32(data, field)?;
            if pointer != 0 && pointer as usize >= first_raw {
                put_u32(data, field, add(pointer, shift)?)?;
            }
        }
    }

    let symbols = layout.coff_header_offset() + 8;
    let pointer = get_u32(data, symbols)?;
    if pointer != 0 && pointer as usize >= first_raw {
        put_u32(data, symbols, add(pointer, shift)?)?;
    }

    Ok(shift)
}

fn first_raw_offset(layout: &PeLayout) -> usize {
    layout
        .sections
        .iter()
        .filter(|section| section.size_of_raw_data != 0)
        .map(|section| section.pointer_to_raw_data as usize)
        .min()
        .unwrap_or(layout.size_of_headers as usize)
        .min(layout.size_of_headers as usize)
}

fn shifted(layout: &PeLayout, offset: usize, shift: u32) -> usize {
    if shift != 0 && offset >= first_raw_offset(layout) {
        offset + shift as usize
    } else {
        offset
    }
}

fn pad_to(data: &mut Vec<u8>, alignment: usize) {
    while data.len() % alignment != 0 {
        data.push(0);
    }
}

fn add(value: u32, offset: u32) -> Result<u32> {
    value
        .checked_add(offset)
        .ok_or_else(|| malformed_error!("Address overflow - {:#x} + {:#x}", value, offset))
}

fn aligned(value: u32, alignment: u32) -> Result<u32> {
    align_up(value, alignment)
        .ok_or_else(|| malformed_error!("Address overflow aligning {:#x}", value))
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Image too large - {} bytes", value))
}

fn get_u32(data: &[u8], offset: usize) -> Result<u32> {
    let mut offset = offset;
    read_le_at::<u32>(data, &mut offset)
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let mut offset = offset;
    write_le_at(data, &mut offset, value)
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) -> Result<()> {
    let mut offset = offset;
    write_le_at(data, &mut offset, value)
}
