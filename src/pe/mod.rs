//! A PE32 and PE32+ driver image parser.
//!
//! The parser is deliberately defensive: every read out of the caller's
//! buffer is bounds-checked, every RVA goes through the section table, and
//! every walk over an untrusted array has a sanity cap. Missing import or
//! export directories are not errors; a malformed header is.

pub mod data_directories;
pub mod export;
pub mod header;
pub mod import;
pub mod optional_header;
pub mod section_table;
pub mod utils;

use log::debug;

use crate::error;

pub use self::export::Export;
pub use self::import::Import;
pub use self::section_table::SectionTable;

/// Maximum number of sections accepted in one image.
pub const MAX_SECTIONS: usize = 256;

/// The first code-carrying executable section, with its raw bytes.
#[derive(Debug, Copy, Clone)]
pub struct TextSection<'a> {
    /// The section's raw data as stored in the file
    pub bytes: &'a [u8],
    /// RVA at which the loader would map the first raw byte
    pub rva: u32,
    /// Size of the raw data window
    pub raw_size: u32,
}

/// An analyzed PE32/PE32+ binary.
///
/// Borrows the caller's byte buffer; the buffer must outlive the image.
#[derive(Debug)]
pub struct PE<'a> {
    /// The DOS/COFF/optional header group
    pub header: header::Header,
    /// A list of the sections in this binary
    pub sections: Vec<section_table::SectionTable>,
    /// Whether the image is PE32+ (64-bit)
    pub is_64: bool,
    /// The preferred load address
    pub image_base: u64,
    /// The entry point, as an RVA
    pub entry: u32,
    /// The first section marked code + executable, if any
    pub text: Option<TextSection<'a>>,
    /// The symbols imported by this binary, each bound to its IAT slot RVA
    pub imports: Vec<import::Import<'a>>,
    /// The symbols exported by this binary
    pub exports: Vec<export::Export<'a>>,
}

impl<'a> PE<'a> {
    /// Reads a PE binary from the underlying `bytes`.
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        let header = header::Header::parse(bytes)?;
        debug!("{:#?}", header);
        let optional_header = header.optional_header;
        let mut offset = header.dos_header.pe_pointer as usize
            + header::SIZEOF_PE_MAGIC
            + header::SIZEOF_COFF_HEADER
            + header.coff_header.size_of_optional_header as usize;
        let nsections = header.coff_header.number_of_sections as usize;
        if nsections > MAX_SECTIONS {
            return Err(error::Error::Malformed(format!(
                "section count ({}) exceeds the maximum ({})",
                nsections, MAX_SECTIONS
            )));
        }
        let mut sections = Vec::with_capacity(nsections);
        for i in 0..nsections {
            let section = section_table::SectionTable::parse(bytes, &mut offset)?;
            debug!("({}) {:#?}", i, section);
            sections.push(section);
        }

        let is_64 = optional_header.is_64();
        let image_base = optional_header.windows_fields.image_base;
        let entry = optional_header.standard_fields.address_of_entry_point;
        debug!("entry {:#x} image_base {:#x} is_64: {}", entry, image_base, is_64);

        let text = match sections.iter().find(|section| section.is_code()) {
            Some(section) => {
                let start = section.pointer_to_raw_data as usize;
                let size = section.size_of_raw_data as usize;
                let end = start.checked_add(size).ok_or_else(|| {
                    error::Error::Malformed(format!(
                        "section {} raw data range overflows",
                        section.name()
                    ))
                })?;
                if end > bytes.len() {
                    return Err(error::Error::Malformed(format!(
                        "section {} raw data [{:#x}..{:#x}] lies outside the input buffer",
                        section.name(),
                        start,
                        end
                    )));
                }
                Some(TextSection {
                    bytes: &bytes[start..end],
                    rva: section.virtual_address,
                    raw_size: section.size_of_raw_data,
                })
            }
            None => None,
        };

        let mut imports = Vec::new();
        if let Some(import_table) = *optional_header.data_directories.get_import_table() {
            imports = if is_64 {
                import::parse::<u64>(bytes, import_table, &sections)?
            } else {
                import::parse::<u32>(bytes, import_table, &sections)?
            };
        }
        debug!("imports: {:#?}", imports);

        let mut exports = Vec::new();
        if let Some(export_table) = *optional_header.data_directories.get_export_table() {
            exports = export::parse(bytes, export_table, &sections)?;
        }
        debug!("exports: {:#?}", exports);

        Ok(PE {
            header,
            sections,
            is_64,
            image_base,
            entry,
            text,
            imports,
            exports,
        })
    }
}
