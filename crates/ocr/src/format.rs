//! File format detection by magic number

use crate::errors::{OcrError, Result};

/// Formats recognised from their first four bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Zip,
    Ole2,
    Tiff,
}

/// Signature table. Order does not matter, entries never share a prefix.
const SIGNATURES: &[([u8; 4], FileFormat)] = &[
    ([0x25, 0x50, 0x44, 0x46], FileFormat::Pdf),
    ([0x89, 0x50, 0x4E, 0x47], FileFormat::Png),
    ([0xFF, 0xD8, 0xFF, 0xE0], FileFormat::Jpeg),
    ([0xFF, 0xD8, 0xFF, 0xE1], FileFormat::Jpeg),
    ([0x47, 0x49, 0x46, 0x38], FileFormat::Gif),
    ([0x50, 0x4B, 0x03, 0x04], FileFormat::Zip),
    ([0xD0, 0xCF, 0x11, 0xE0], FileFormat::Ole2),
    ([0x49, 0x49, 0x2A, 0x00], FileFormat::Tiff),
    ([0x4D, 0x4D, 0x00, 0x2A], FileFormat::Tiff),
];

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Png => "png",
            FileFormat::Jpeg => "jpeg",
            FileFormat::Gif => "gif",
            FileFormat::Zip => "zip",
            FileFormat::Ole2 => "doc",
            FileFormat::Tiff => "tiff",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Png => "image/png",
            FileFormat::Jpeg => "image/jpeg",
            FileFormat::Gif => "image/gif",
            FileFormat::Zip => "application/zip",
            FileFormat::Ole2 => "application/msword",
            FileFormat::Tiff => "image/tiff",
        }
    }

    /// Whether text can be extracted from this format
    pub fn is_extractable(&self) -> bool {
        matches!(self, FileFormat::Pdf | FileFormat::Png | FileFormat::Jpeg)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FileFormat::Png | FileFormat::Jpeg)
    }
}

/// Look up the signature of `bytes` without judging extractability
pub fn identify(bytes: &[u8]) -> Option<FileFormat> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    SIGNATURES
        .iter()
        .find(|(signature, _)| *signature == head)
        .map(|(_, format)| *format)
}

/// Detect an extractable format.
///
/// Fails with `UnknownFormat` when no signature matches (including inputs
/// shorter than four bytes) and `UnsupportedFormat` for recognised formats
/// text cannot be extracted from.
pub fn detect_format(bytes: &[u8]) -> Result<FileFormat> {
    match identify(bytes) {
        Some(format) if format.is_extractable() => Ok(format),
        Some(format) => Err(OcrError::UnsupportedFormat {
            format: format.as_str(),
        }),
        None => Err(OcrError::UnknownFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: [u8; 4]) -> Vec<u8> {
        let mut bytes = head.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        bytes
    }

    #[test]
    fn test_detects_supported_signatures() {
        let cases = [
            ([0x25, 0x50, 0x44, 0x46], FileFormat::Pdf),
            ([0x89, 0x50, 0x4E, 0x47], FileFormat::Png),
            ([0xFF, 0xD8, 0xFF, 0xE0], FileFormat::Jpeg),
            ([0xFF, 0xD8, 0xFF, 0xE1], FileFormat::Jpeg),
        ];

        for (head, expected) in cases {
            assert_eq!(detect_format(&padded(head)).unwrap(), expected);
            // Exactly four bytes is enough
            assert_eq!(detect_format(&head).unwrap(), expected);
        }
    }

    #[test]
    fn test_recognised_but_unsupported() {
        let cases: [[u8; 4]; 5] = [
            [0x47, 0x49, 0x46, 0x38],
            [0x50, 0x4B, 0x03, 0x04],
            [0xD0, 0xCF, 0x11, 0xE0],
            [0x49, 0x49, 0x2A, 0x00],
            [0x4D, 0x4D, 0x00, 0x2A],
        ];

        for head in cases {
            assert!(matches!(
                detect_format(&padded(head)),
                Err(OcrError::UnsupportedFormat { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_signatures() {
        let cases: [&[u8]; 6] = [
            b"",
            &[0x25, 0x50],
            &[0x25, 0x50, 0x44],
            b"BM\x36\x00\x00\x00",
            &[0xFF, 0xD8, 0xFF, 0xDB],
            b"hello world",
        ];

        for bytes in cases {
            assert!(matches!(detect_format(bytes), Err(OcrError::UnknownFormat)));
        }
    }

    #[test]
    fn test_signature_table_has_no_duplicates() {
        for (i, (a, _)) in SIGNATURES.iter().enumerate() {
            for (b, _) in &SIGNATURES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
