use crc32fast::Hasher as Crc32Hasher;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Fixed-size header at the start of every file the runtime persists.
///
/// All integers are little-endian. `header_crc32` covers every preceding
/// header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub magic: [u8; 8],
    pub version: u16,
    pub flags: u16,
    pub reserved: u32,
    pub header_crc32: u32,
}

fn invalid_data(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl BinaryHeader {
    pub const LEN_WITHOUT_CRC: usize = 8 + 2 + 2 + 4;
    pub const TOTAL_LEN: usize = Self::LEN_WITHOUT_CRC + 4;

    pub fn new(magic: [u8; 8], version: u16, flags: u16) -> Self {
        let mut header = Self {
            magic,
            version,
            flags,
            reserved: 0,
            header_crc32: 0,
        };
        header.header_crc32 = crc_of(&header.body());
        header
    }

    fn body(&self) -> [u8; Self::LEN_WITHOUT_CRC] {
        let mut body = [0u8; Self::LEN_WITHOUT_CRC];
        body[..8].copy_from_slice(&self.magic);
        body[8..10].copy_from_slice(&self.version.to_le_bytes());
        body[10..12].copy_from_slice(&self.flags.to_le_bytes());
        body[12..16].copy_from_slice(&self.reserved.to_le_bytes());
        body
    }

    pub fn to_bytes(&self) -> [u8; Self::TOTAL_LEN] {
        let mut out = [0u8; Self::TOTAL_LEN];
        out[..Self::LEN_WITHOUT_CRC].copy_from_slice(&self.body());
        out[Self::LEN_WITHOUT_CRC..].copy_from_slice(&self.header_crc32.to_le_bytes());
        out
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read>(mut r: R) -> io::Result<Self> {
        let mut raw = [0u8; Self::TOTAL_LEN];
        r.read_exact(&mut raw)?;

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&raw[..8]);
        let header = Self {
            magic,
            version: u16::from_le_bytes([raw[8], raw[9]]),
            flags: u16::from_le_bytes([raw[10], raw[11]]),
            reserved: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
            header_crc32: u32::from_le_bytes([raw[16], raw[17], raw[18], raw[19]]),
        };

        if crc_of(&raw[..Self::LEN_WITHOUT_CRC]) != header.header_crc32 {
            return Err(invalid_data("header CRC mismatch"));
        }
        Ok(header)
    }
}

fn crc_of(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// A file format identified by its magic and version.
pub trait MagicFile {
    const MAGIC: [u8; 8];
    const VERSION: u16 = 1;

    fn write_header<W: Write>(writer: &mut W, flags: u16) -> io::Result<()> {
        BinaryHeader::new(Self::MAGIC, Self::VERSION, flags).write_to(writer)
    }

    fn read_and_validate_header<R: Read>(reader: &mut R) -> io::Result<BinaryHeader> {
        let header = BinaryHeader::read_from(reader)?;
        if header.magic != Self::MAGIC {
            return Err(invalid_data("invalid magic"));
        }
        if header.version != Self::VERSION {
            return Err(invalid_data("unsupported version"));
        }
        Ok(header)
    }

    /// Creates `path`, failing if it exists, and writes the header.
    fn create_with_header(path: &Path, flags: u16) -> io::Result<File> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Self::write_header(&mut file, flags)?;
        Ok(file)
    }

    /// Opens `path` for reading, positioned just past a validated header.
    fn open_with_header(path: &Path) -> io::Result<(File, BinaryHeader)> {
        let mut file = File::open(path)?;
        if file.metadata()?.len() < BinaryHeader::TOTAL_LEN as u64 {
            return Err(invalid_data("file too small for header"));
        }
        let header = Self::read_and_validate_header(&mut file)?;
        Ok((file, header))
    }
}

pub enum FileKind {
    SpillRun,
}

impl FileKind {
    pub const fn magic(&self) -> [u8; 8] {
        match self {
            FileKind::SpillRun => *b"FFLWRUN\0",
        }
    }
}
