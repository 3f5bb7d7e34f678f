//! Read-back of finished files: header, footer and raw array payloads.
//!
//! This is a verification aid for the writer, not a general reader. It
//! understands exactly what [`Writer`](crate::writer::Writer) produces.

use crate::footer::{FooterIndex, FooterRecord};
use crate::format::{FileHeader, HEADER_BYTES};
use crate::vlsv_error::VlsvError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Header and footer of a closed file.
#[derive(Clone, Debug)]
pub struct FileLayout {
    pub header: FileHeader,
    pub footer: FooterIndex,
}

impl FileLayout {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, VlsvError> {
        let mut file = File::open(path)?;
        let mut raw = [0u8; HEADER_BYTES as usize];
        file.read_exact(&mut raw)?;
        let header = FileHeader::decode(&raw)?;
        if header.footer_offset < HEADER_BYTES {
            return Err(VlsvError::Header(format!(
                "footer offset {} points into the header",
                header.footer_offset
            )));
        }
        file.seek(SeekFrom::Start(header.footer_offset))?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        // A pre-sized file may carry zero padding after the footer.
        let footer = FooterIndex::parse(text.trim_end_matches('\0'))?;
        Ok(Self { header, footer })
    }

    /// Payload bytes of `record`, in rank order.
    pub fn read_array(path: impl AsRef<Path>, record: &FooterRecord) -> Result<Vec<u8>, VlsvError> {
        let len = record.byte_len()?;
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(record.offset))?;
        let mut out = vec![0u8; len as usize];
        file.read_exact(&mut out)?;
        Ok(out)
    }
}
