use log::debug;
use scroll::Pread;

use crate::error;
use crate::pe::section_table::SectionTable;

fn section_read_size(section: &SectionTable) -> usize {
    // An object with no virtual size occupies its raw size in memory.
    if section.virtual_size == 0 {
        section.size_of_raw_data as usize
    } else {
        section.virtual_size as usize
    }
}

fn is_in_section(rva: usize, section: &SectionTable) -> bool {
    let start = section.virtual_address as usize;
    start <= rva && rva < start + section_read_size(section)
}

fn rva2offset(rva: usize, section: &SectionTable) -> usize {
    (rva - section.virtual_address as usize) + section.pointer_to_raw_data as usize
}

/// Resolve an RVA to a file offset through the section table.
///
/// Every consumer of an RVA goes through here; no component dereferences a
/// raw RVA. Reads at the returned offset are still bounds-checked against
/// the input buffer by scroll.
pub fn find_offset(rva: usize, sections: &[SectionTable]) -> Option<usize> {
    for (i, section) in sections.iter().enumerate() {
        if is_in_section(rva, section) {
            let offset = rva2offset(rva, section);
            debug!(
                "rva {:#x} is in section {}({}), file offset {:#x}",
                rva,
                section.name(),
                i,
                offset
            );
            return Some(offset);
        }
    }
    None
}

pub fn find_offset_or(
    rva: usize,
    sections: &[SectionTable],
    msg: &str,
) -> error::Result<usize> {
    find_offset(rva, sections).ok_or_else(|| error::Error::Malformed(msg.to_string()))
}

/// Read the NUL-terminated name at `rva`.
pub fn try_name<'a>(
    bytes: &'a [u8],
    rva: usize,
    sections: &[SectionTable],
) -> error::Result<&'a str> {
    match find_offset(rva, sections) {
        Some(offset) => Ok(bytes.pread::<&str>(offset)?),
        None => Err(error::Error::Malformed(format!(
            "cannot find name from rva {:#x} in any section",
            rva
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_section() -> SectionTable {
        let mut section = SectionTable::default();
        section.name[..5].copy_from_slice(b".text");
        section.virtual_size = 0x400;
        section.virtual_address = 0x1000;
        section.size_of_raw_data = 0x200;
        section.pointer_to_raw_data = 0x200;
        section
    }

    #[test]
    fn resolves_rva_inside_section() {
        let sections = [text_section()];
        assert_eq!(find_offset(0x1000, &sections), Some(0x200));
        assert_eq!(find_offset(0x1040, &sections), Some(0x240));
    }

    #[test]
    fn rejects_rva_outside_every_section() {
        let sections = [text_section()];
        assert_eq!(find_offset(0x800, &sections), None);
        assert_eq!(find_offset(0x1400, &sections), None);
    }

    #[test]
    fn reads_name_at_rva() {
        let mut bytes = vec![0u8; 0x400];
        bytes[0x240..0x24d].copy_from_slice(b"ntoskrnl.exe\0");
        let sections = [text_section()];
        assert_eq!(try_name(&bytes, 0x1040, &sections).unwrap(), "ntoskrnl.exe");
    }
}
