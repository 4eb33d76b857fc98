use log::warn;
use scroll::Pread;

use crate::error;
use crate::pe::data_directories::DataDirectory;
use crate::pe::section_table::SectionTable;
use crate::pe::utils;

/// Cap on the export name and address table walks.
pub const MAX_EXPORTS: usize = 10_000;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread)]
pub struct ExportDirectoryTable {
    pub export_flags: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_rva: u32,
    pub ordinal_base: u32,
    pub address_table_entries: u32,
    pub number_of_name_pointers: u32,
    pub export_address_table_rva: u32,
    pub name_pointer_rva: u32,
    pub ordinal_table_rva: u32,
}

pub const SIZEOF_EXPORT_DIRECTORY_TABLE: usize = 40;

/// A named export and the RVA of the function it points at.
#[derive(Debug, Clone)]
pub struct Export<'a> {
    pub name: Option<&'a str>,
    pub ordinal: u16,
    /// RVA of the exported function
    pub rva: u32,
}

/// Parse the export directory into `(name, ordinal, rva)` tuples by
/// joining the name pointer, ordinal, and address tables.
pub fn parse<'a>(
    bytes: &'a [u8],
    dd: DataDirectory,
    sections: &[SectionTable],
) -> error::Result<Vec<Export<'a>>> {
    let table_offset = utils::find_offset_or(
        dd.virtual_address as usize,
        sections,
        "export directory table RVA does not point into a section",
    )?;
    let table: ExportDirectoryTable = bytes.pread_with(table_offset, scroll::LE)?;

    let nfunctions = table.address_table_entries as usize;
    let nnames = table.number_of_name_pointers as usize;
    if nfunctions > MAX_EXPORTS || nnames > MAX_EXPORTS {
        return Err(error::Error::Malformed(format!(
            "export table sizes ({} addresses, {} names) exceed the maximum ({})",
            nfunctions, nnames, MAX_EXPORTS
        )));
    }

    let mut address_offset = utils::find_offset_or(
        table.export_address_table_rva as usize,
        sections,
        "export address table RVA does not point into a section",
    )?;
    let mut addresses: Vec<u32> = Vec::with_capacity(nfunctions);
    for _ in 0..nfunctions {
        addresses.push(bytes.gread_with(&mut address_offset, scroll::LE)?);
    }

    let mut name_offset = utils::find_offset_or(
        table.name_pointer_rva as usize,
        sections,
        "export name pointer table RVA does not point into a section",
    )?;
    let mut name_pointers: Vec<u32> = Vec::with_capacity(nnames);
    for _ in 0..nnames {
        name_pointers.push(bytes.gread_with(&mut name_offset, scroll::LE)?);
    }

    let mut ordinal_offset = utils::find_offset_or(
        table.ordinal_table_rva as usize,
        sections,
        "export ordinal table RVA does not point into a section",
    )?;
    let mut ordinals: Vec<u16> = Vec::with_capacity(nnames);
    for _ in 0..nnames {
        ordinals.push(bytes.gread_with(&mut ordinal_offset, scroll::LE)?);
    }

    let mut exports = Vec::with_capacity(nnames);
    for (pointer, index) in name_pointers.iter().zip(ordinals.iter()) {
        let index = *index as usize;
        let rva = match addresses.get(index) {
            Some(rva) => *rva,
            None => {
                warn!("export ordinal index {} has no address table entry", index);
                continue;
            }
        };
        let name = utils::try_name(bytes, *pointer as usize, sections)?;
        exports.push(Export {
            name: Some(name),
            ordinal: (table.ordinal_base + index as u32) as u16,
            rva,
        });
    }
    Ok(exports)
}
