use scroll::Pread;

use crate::error;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

pub const SIZEOF_DATA_DIRECTORY: usize = 8;
pub const NUM_DATA_DIRECTORIES: usize = 16;

impl DataDirectory {
    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        let dd = bytes.gread_with(offset, scroll::LE)?;
        Ok(dd)
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct DataDirectories {
    pub data_directories: [Option<DataDirectory>; NUM_DATA_DIRECTORIES],
}

impl DataDirectories {
    pub fn parse(bytes: &[u8], count: usize, offset: &mut usize) -> error::Result<Self> {
        let mut data_directories = [None; NUM_DATA_DIRECTORIES];
        if count > NUM_DATA_DIRECTORIES {
            return Err(error::Error::Malformed(format!(
                "data directory count ({}) is greater than the maximum number of data directories ({})",
                count, NUM_DATA_DIRECTORIES
            )));
        }
        for dir in data_directories.iter_mut().take(count) {
            let dd = DataDirectory::parse(bytes, offset)?;
            *dir = if dd.virtual_address == 0 && dd.size == 0 {
                None
            } else {
                Some(dd)
            };
        }
        Ok(DataDirectories { data_directories })
    }

    pub fn get_export_table(&self) -> &Option<DataDirectory> {
        &self.data_directories[0]
    }

    pub fn get_import_table(&self) -> &Option<DataDirectory> {
        &self.data_directories[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directories_are_none() {
        let bytes = [0u8; NUM_DATA_DIRECTORIES * SIZEOF_DATA_DIRECTORY];
        let offset = &mut 0;
        let dds = DataDirectories::parse(&bytes, NUM_DATA_DIRECTORIES, offset).unwrap();
        assert!(dds.get_export_table().is_none());
        assert!(dds.get_import_table().is_none());
        assert_eq!(*offset, bytes.len());
    }

    #[test]
    fn rejects_oversized_count() {
        let bytes = [0u8; 17 * SIZEOF_DATA_DIRECTORY];
        assert!(DataDirectories::parse(&bytes, 17, &mut 0).is_err());
    }
}
