//! The `.p4z` program package: a zip archive with one MIF per memory space.

use std::{
    fs::File,
    io::{Read, Seek, Write},
    path::Path,
};

use thiserror::Error;
use zip::{result::ZipError, write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use super::{
    mif::{self, MifError, Radix},
    Image,
};

/// Archive entry holding the program memory.
pub const PROGRAM_ENTRY: &str = "prog.mif";
/// Archive entry holding the data memory.
pub const DATA_ENTRY: &str = "data.mif";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("{entry}: {source}")]
    Mif {
        entry: &'static str,
        #[source]
        source: MifError,
    },
}

/// Writes both memory images into a package.
///
/// # Errors
///
/// This function will return an error if the archive cannot be written.
pub fn write<W: Write + Seek>(writer: W, image: &Image) -> Result<(), PackageError> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(PROGRAM_ENTRY, options)?;
    zip.write_all(mif::generate(&image.program, Radix::Hex, Radix::Hex).as_bytes())?;

    zip.start_file(DATA_ENTRY, options)?;
    zip.write_all(mif::generate(&image.data, Radix::Hex, Radix::Hex).as_bytes())?;

    zip.finish()?;
    Ok(())
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry: &'static str,
) -> Result<Vec<crate::plat::Word>, PackageError> {
    let mut text = String::new();
    archive.by_name(entry)?.read_to_string(&mut text)?;
    mif::parse(&text).map_err(|source| PackageError::Mif { entry, source })
}

/// Reads both memory images from a package.
///
/// # Errors
///
/// This function will return an error if the archive is unreadable, an entry is missing,
/// or an entry is not a valid MIF.
pub fn read<R: Read + Seek>(reader: R) -> Result<Image, PackageError> {
    let mut archive = ZipArchive::new(reader)?;
    let program = read_entry(&mut archive, PROGRAM_ENTRY)?;
    let data = read_entry(&mut archive, DATA_ENTRY)?;
    Ok(Image { program, data })
}

pub fn save(path: impl AsRef<Path>, image: &Image) -> Result<(), PackageError> {
    let file = File::create(path)?;
    write(file, image)
}

pub fn load(path: impl AsRef<Path>) -> Result<Image, PackageError> {
    let file = File::open(path)?;
    read(file)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::plat::MEMORY_WORDS;

    #[test]
    fn test_package_round_trip() {
        let mut image = Image::default();
        image.program[0] = 0xC805;
        image.program[1] = 0x8809;
        image.data[10] = b'A' as u16;
        let mut buf = Cursor::new(Vec::new());
        write(&mut buf, &image).unwrap();
        buf.set_position(0);
        let back = read(buf).unwrap();
        assert_eq!(back.program.len(), MEMORY_WORDS);
        assert_eq!(back, image);
    }

    #[test]
    fn test_missing_entry() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            zip.start_file(PROGRAM_ENTRY, FileOptions::default()).unwrap();
            zip.write_all(mif::generate(&[0; 4], Radix::Hex, Radix::Hex).as_bytes())
                .unwrap();
            zip.finish().unwrap();
        }
        buf.set_position(0);
        assert!(matches!(
            read(buf),
            Err(PackageError::Zip(ZipError::FileNotFound))
        ));
    }
}
