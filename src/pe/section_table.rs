use scroll::Pread;

use crate::error;

#[repr(C)]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct SectionTable {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

pub const SIZEOF_SECTION_TABLE: usize = 8 * 5;

/// The section contains executable code
pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
/// The section can be executed as code
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;

impl SectionTable {
    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        let mut table = SectionTable::default();
        table.name.copy_from_slice(bytes.gread_with(offset, 8)?);
        table.virtual_size = bytes.gread_with(offset, scroll::LE)?;
        table.virtual_address = bytes.gread_with(offset, scroll::LE)?;
        table.size_of_raw_data = bytes.gread_with(offset, scroll::LE)?;
        table.pointer_to_raw_data = bytes.gread_with(offset, scroll::LE)?;
        table.pointer_to_relocations = bytes.gread_with(offset, scroll::LE)?;
        table.pointer_to_linenumbers = bytes.gread_with(offset, scroll::LE)?;
        table.number_of_relocations = bytes.gread_with(offset, scroll::LE)?;
        table.number_of_linenumbers = bytes.gread_with(offset, scroll::LE)?;
        table.characteristics = bytes.gread_with(offset, scroll::LE)?;
        Ok(table)
    }

    /// The section name, trimmed at the first NUL.
    pub fn name(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Whether the section both contains code and is executable.
    pub fn is_code(&self) -> bool {
        const CODE: u32 = IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE;
        self.characteristics & CODE == CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_section_entry() {
        let mut bytes = [0u8; SIZEOF_SECTION_TABLE];
        bytes[..5].copy_from_slice(b".text");
        // virtual_size
        bytes[8] = 0x05;
        // virtual_address = 0x1000
        bytes[13] = 0x10;
        // size_of_raw_data = 0x200
        bytes[17] = 0x02;
        // pointer_to_raw_data = 0x200
        bytes[21] = 0x02;
        // characteristics = CODE | EXECUTE | READ
        bytes[36..40].copy_from_slice(&0x6000_0020u32.to_le_bytes());
        let section = SectionTable::parse(&bytes, &mut 0).unwrap();
        assert_eq!(section.name(), ".text");
        assert_eq!(section.virtual_address, 0x1000);
        assert_eq!(section.pointer_to_raw_data, 0x200);
        assert!(section.is_code());
    }

    #[test]
    fn data_section_is_not_code() {
        let mut section = SectionTable::default();
        section.characteristics = 0x4000_0040;
        assert!(!section.is_code());
    }
}
