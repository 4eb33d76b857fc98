use std::borrow::Cow;

use log::debug;
use scroll::Pread;

use crate::error;
use crate::pe::data_directories::DataDirectory;
use crate::pe::section_table::SectionTable;
use crate::pe::utils;

/// Cap on the walk over the import directory table.
pub const MAX_IMPORT_DESCRIPTORS: usize = 1_000;
/// Cap on the total number of resolved imports.
pub const MAX_IMPORTS: usize = 10_000;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread)]
pub struct ImportDirectoryEntry {
    pub import_lookup_table_rva: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub import_address_table_rva: u32,
}

pub const SIZEOF_IMPORT_DIRECTORY_ENTRY: usize = 20;

impl ImportDirectoryEntry {
    /// The directory table is terminated by an all-zero entry.
    pub fn is_null(&self) -> bool {
        (self.import_lookup_table_rva == 0)
            && (self.time_date_stamp == 0)
            && (self.forwarder_chain == 0)
            && (self.name_rva == 0)
            && (self.import_address_table_rva == 0)
    }
}

/// One import lookup table entry: a `u32` in PE32, a `u64` in PE32+.
/// The high bit flags import-by-ordinal; the low bits are either the
/// ordinal or the RVA of a hint/name entry.
pub trait Bitfield: Into<u64> + Copy {
    const SIZE: usize;
    fn is_ordinal(self) -> bool;
    fn to_ordinal(self) -> u16;
    fn to_rva(self) -> u32;
}

impl Bitfield for u32 {
    const SIZE: usize = 4;
    fn is_ordinal(self) -> bool {
        self & 0x8000_0000 != 0
    }
    fn to_ordinal(self) -> u16 {
        (self & 0xffff) as u16
    }
    fn to_rva(self) -> u32 {
        self & 0x7fff_ffff
    }
}

impl Bitfield for u64 {
    const SIZE: usize = 8;
    fn is_ordinal(self) -> bool {
        self & 0x8000_0000_0000_0000 != 0
    }
    fn to_ordinal(self) -> u16 {
        (self & 0xffff) as u16
    }
    fn to_rva(self) -> u32 {
        (self & 0x7fff_ffff) as u32
    }
}

/// A synthesized symbol import bound to the RVA of its IAT slot.
#[derive(Debug, Clone)]
pub struct Import<'a> {
    /// Name of the imported symbol, or `ORDINAL <n>` for ordinal imports
    pub name: Cow<'a, str>,
    /// The dll the symbol is imported from
    pub dll: &'a str,
    /// The import's ordinal, or its hint for imports by name
    pub ordinal: u16,
    /// RVA of this import's slot in the import address table. The loader
    /// patches the slot; indirect calls through it identify the API.
    pub iat_rva: u32,
}

/// Walk the import directory table and synthesize one [`Import`] per
/// lookup table entry, matched position-by-position against the IAT.
pub fn parse<'a, T>(
    bytes: &'a [u8],
    dd: DataDirectory,
    sections: &[SectionTable],
) -> error::Result<Vec<Import<'a>>>
where
    T: Bitfield + scroll::ctx::TryFromCtx<'a, scroll::Endian, Error = scroll::Error>,
{
    let mut imports = Vec::new();
    let mut offset = utils::find_offset_or(
        dd.virtual_address as usize,
        sections,
        "import directory table RVA does not point into a section",
    )?;
    for i in 0.. {
        if i >= MAX_IMPORT_DESCRIPTORS {
            return Err(error::Error::Malformed(format!(
                "import directory walk exceeded {} descriptors",
                MAX_IMPORT_DESCRIPTORS
            )));
        }
        let descriptor: ImportDirectoryEntry = bytes.gread_with(&mut offset, scroll::LE)?;
        if descriptor.is_null() {
            break;
        }
        let dll = utils::try_name(bytes, descriptor.name_rva as usize, sections)?;
        debug!("import descriptor for {}", dll);
        // A bound image may zero the lookup table; the address table keeps
        // the same pre-bind contents in that case.
        let lookup_rva = if descriptor.import_lookup_table_rva != 0 {
            descriptor.import_lookup_table_rva
        } else {
            descriptor.import_address_table_rva
        };
        let mut lookup_offset = utils::find_offset_or(
            lookup_rva as usize,
            sections,
            "import lookup table RVA does not point into a section",
        )?;
        let mut slot: u32 = 0;
        loop {
            let entry: T = bytes.gread_with(&mut lookup_offset, scroll::LE)?;
            let bits: u64 = entry.into();
            if bits == 0 {
                break;
            }
            if imports.len() >= MAX_IMPORTS {
                return Err(error::Error::Malformed(format!(
                    "import count exceeded {}",
                    MAX_IMPORTS
                )));
            }
            let iat_rva = descriptor.import_address_table_rva + slot * T::SIZE as u32;
            let (name, ordinal) = if entry.is_ordinal() {
                let ordinal = entry.to_ordinal();
                (Cow::Owned(format!("ORDINAL {}", ordinal)), ordinal)
            } else {
                let entry_offset = utils::find_offset_or(
                    entry.to_rva() as usize,
                    sections,
                    "hint/name table RVA does not point into a section",
                )?;
                let hint: u16 = bytes.pread_with(entry_offset, scroll::LE)?;
                let name: &str = bytes.pread(entry_offset + 2)?;
                (Cow::Borrowed(name), hint)
            };
            imports.push(Import {
                name,
                dll,
                ordinal,
                iat_rva,
            });
            slot += 1;
        }
    }
    Ok(imports)
}
