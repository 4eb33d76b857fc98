use scroll::Pread;

use crate::error;
use crate::pe::optional_header;

/// The leading fields of `IMAGE_DOS_HEADER`. Only two fields of the DOS
/// relic still matter: the `MZ` signature and the PE-header pointer that
/// lives at offset 0x3c.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct DosHeader {
    /// Magic number: `MZ` read in little endian
    pub signature: u16,
    /// `e_lfanew`: file offset of the PE header
    pub pe_pointer: u32,
}

pub const DOS_MAGIC: u16 = 0x5a4d;
pub const PE_POINTER_OFFSET: usize = 0x3c;

impl DosHeader {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        if bytes.len() < PE_POINTER_OFFSET + 4 {
            return Err(error::Error::BufferTooShort(
                PE_POINTER_OFFSET + 4,
                "bytes for a DOS header",
            ));
        }
        let signature = bytes.pread_with(0, scroll::LE)?;
        if signature != DOS_MAGIC {
            return Err(error::Error::BadMagic(u64::from(signature)));
        }
        let pe_pointer = bytes.pread_with(PE_POINTER_OFFSET, scroll::LE)?;
        Ok(DosHeader {
            signature,
            pe_pointer,
        })
    }
}

/// COFF Header
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread)]
pub struct CoffHeader {
    /// The machine type
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbol_table: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

pub const SIZEOF_COFF_HEADER: usize = 20;
/// PE\0\0, little endian
pub const PE_MAGIC: u32 = 0x0000_4550;
pub const SIZEOF_PE_MAGIC: usize = 4;
/// Intel 386 or later processors and compatible processors
pub const COFF_MACHINE_X86: u16 = 0x14c;
/// x64
pub const COFF_MACHINE_X86_64: u16 = 0x8664;

impl CoffHeader {
    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        let coff: CoffHeader = bytes.gread_with(offset, scroll::LE)?;
        match coff.machine {
            COFF_MACHINE_X86 | COFF_MACHINE_X86_64 => Ok(coff),
            machine => Err(error::Error::Malformed(format!(
                "unsupported machine type {:#x} (only x86 and x86-64 images are accepted)",
                machine
            ))),
        }
    }
}

/// Convert machine to str representation
pub fn machine_to_str(machine: u16) -> &'static str {
    match machine {
        COFF_MACHINE_X86 => "X86",
        COFF_MACHINE_X86_64 => "X86_64",
        _ => "COFF_UNKNOWN",
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Header {
    pub dos_header: DosHeader,
    /// PE Magic: PE\0\0, little endian
    pub signature: u32,
    pub coff_header: CoffHeader,
    pub optional_header: optional_header::OptionalHeader,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        let dos_header = DosHeader::parse(bytes)?;
        let mut offset = dos_header.pe_pointer as usize;
        let signature = bytes
            .gread_with::<u32>(&mut offset, scroll::LE)
            .map_err(|_| {
                error::Error::Malformed(format!(
                    "cannot read PE signature (offset {:#x})",
                    dos_header.pe_pointer
                ))
            })?;
        if signature != PE_MAGIC {
            return Err(error::Error::BadMagic(u64::from(signature)));
        }
        let coff_header = CoffHeader::parse(bytes, &mut offset)?;
        if coff_header.size_of_optional_header == 0 {
            return Err(error::Error::Malformed(
                "image has no optional header".to_string(),
            ));
        }
        let optional_header =
            bytes.pread_with::<optional_header::OptionalHeader>(offset, scroll::LE)?;
        Ok(Header {
            dos_header,
            signature,
            coff_header,
            optional_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{machine_to_str, DosHeader, Header, COFF_MACHINE_X86, DOS_MAGIC, PE_MAGIC};

    /// Hand-assembled PE32 header group: DOS header with e_lfanew = 0x40,
    /// PE signature, x86 COFF header announcing one section and a 224-byte
    /// optional header, then the optional header itself (entry point RVA
    /// 0x1000, image base 0x10000, 16 empty data directories).
    fn minimal_header() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x40 + 4 + 20 + 224];
        bytes[0] = 0x4d;
        bytes[1] = 0x5a;
        bytes[0x3c] = 0x40;
        // PE\0\0
        bytes[0x40] = 0x50;
        bytes[0x41] = 0x45;
        // machine = 0x14c
        bytes[0x44] = 0x4c;
        bytes[0x45] = 0x01;
        // number_of_sections = 1
        bytes[0x46] = 0x01;
        // size_of_optional_header = 224
        bytes[0x54] = 0xe0;
        let opt = 0x40 + 4 + 20;
        // magic = 0x10b
        bytes[opt] = 0x0b;
        bytes[opt + 1] = 0x01;
        // address_of_entry_point = 0x1000
        bytes[opt + 16] = 0x00;
        bytes[opt + 17] = 0x10;
        // image_base = 0x10000
        bytes[opt + 28 + 1] = 0x00;
        bytes[opt + 28 + 2] = 0x01;
        // number_of_rva_and_sizes = 16
        bytes[opt + 92] = 0x10;
        bytes
    }

    #[test]
    fn parses_minimal_header() {
        let bytes = minimal_header();
        let header = Header::parse(&bytes).unwrap();
        assert_eq!(header.dos_header.signature, DOS_MAGIC);
        assert_eq!(header.signature, PE_MAGIC);
        assert_eq!(header.coff_header.machine, COFF_MACHINE_X86);
        assert_eq!(machine_to_str(header.coff_header.machine), "X86");
        assert_eq!(
            header.optional_header.standard_fields.address_of_entry_point,
            0x1000
        );
        assert_eq!(header.optional_header.windows_fields.image_base, 0x10000);
    }

    #[test]
    fn rejects_too_small() {
        assert!(DosHeader::parse(&[0x4d, 0x5a]).is_err());
    }

    #[test]
    fn rejects_bad_dos_magic() {
        let mut bytes = minimal_header();
        bytes[0] = 0x00;
        assert!(Header::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_pe_signature() {
        let mut bytes = minimal_header();
        bytes[0x40] = 0x00;
        assert!(Header::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_unsupported_machine() {
        let mut bytes = minimal_header();
        // ARM64
        bytes[0x44] = 0x64;
        bytes[0x45] = 0xaa;
        assert!(Header::parse(&bytes).is_err());
    }
}
