//! Binary glTF (GLB) container framing.
//!
//! Layout: 12-byte little-endian header (magic, version, total length),
//! then a length-prefixed JSON chunk, then an optional length-prefixed BIN chunk.
//! Each chunk header is `length(4) + type(4)`.

use crate::error::ContainerError;

/// `glTF` in little-endian
pub const GLB_MAGIC: u32 = 0x4654_6C67;
pub const GLB_VERSION: u32 = 2;
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
pub const CHUNK_BIN: u32 = 0x004E_4942;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Borrowed view of the chunks inside a GLB buffer.
#[derive(Debug, Clone, Copy)]
pub struct GlbChunks<'a> {
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ContainerError> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(ContainerError::Truncated {
            needed: offset + 4,
            available: data.len(),
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8], ContainerError> {
    data.get(start..start + len).ok_or(ContainerError::Truncated {
        needed: start + len,
        available: data.len(),
    })
}

impl<'a> GlbChunks<'a> {
    /// Split a GLB buffer into its JSON and BIN chunks.
    pub fn parse(data: &'a [u8]) -> Result<Self, ContainerError> {
        let magic = read_u32(data, 0)?;
        if magic != GLB_MAGIC {
            return Err(ContainerError::InvalidMagic(magic));
        }

        let version = read_u32(data, 4)?;
        if version != GLB_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }

        let total = read_u32(data, 8)? as usize;
        if total > data.len() {
            return Err(ContainerError::Truncated {
                needed: total,
                available: data.len(),
            });
        }
        // Trailing bytes past the declared length are not part of the container
        let data = &data[..total];

        if data.len() < HEADER_LEN + CHUNK_HEADER_LEN {
            return Err(ContainerError::MissingJson);
        }

        let json_len = read_u32(data, HEADER_LEN)? as usize;
        let json_type = read_u32(data, HEADER_LEN + 4)?;
        if json_type != CHUNK_JSON {
            return Err(ContainerError::UnexpectedChunk {
                expected: CHUNK_JSON,
                found: json_type,
            });
        }
        let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
        let json = slice(data, json_start, json_len)?;

        let bin_header = json_start + json_len;
        let bin = if bin_header + CHUNK_HEADER_LEN <= data.len() {
            let bin_len = read_u32(data, bin_header)? as usize;
            let bin_type = read_u32(data, bin_header + 4)?;
            if bin_type != CHUNK_BIN {
                return Err(ContainerError::UnexpectedChunk {
                    expected: CHUNK_BIN,
                    found: bin_type,
                });
            }
            Some(slice(data, bin_header + CHUNK_HEADER_LEN, bin_len)?)
        } else {
            None
        };

        Ok(Self { json, bin })
    }

    /// Parse the JSON chunk as an untyped value.
    pub fn json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(self.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_glb;

    #[test]
    fn test_parse_json_and_bin() {
        let json = br#"{"asset":{"version":"2.0"}}"#;
        let bin = [1u8, 2, 3, 4];
        let data = build_glb(json, Some(&bin));

        let chunks = GlbChunks::parse(&data).unwrap();
        assert!(chunks.json.starts_with(json));
        assert_eq!(chunks.bin, Some(&bin[..]));
        assert!(chunks.json_value().is_ok());
    }

    #[test]
    fn test_parse_without_bin() {
        let data = build_glb(br#"{"asset":{"version":"2.0"}}"#, None);
        let chunks = GlbChunks::parse(&data).unwrap();
        assert!(chunks.bin.is_none());
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build_glb(b"{}", None);
        data[0] = b'X';
        assert!(matches!(
            GlbChunks::parse(&data),
            Err(ContainerError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut data = build_glb(b"{}", None);
        data[4] = 1;
        assert_eq!(
            GlbChunks::parse(&data).unwrap_err(),
            ContainerError::UnsupportedVersion(1)
        );
    }

    #[test]
    fn test_truncated() {
        let data = build_glb(br#"{"asset":{"version":"2.0"}}"#, Some(&[0u8; 16]));
        let cut = &data[..data.len() - 8];
        assert!(matches!(
            GlbChunks::parse(cut),
            Err(ContainerError::Truncated { .. })
        ));
        assert!(matches!(
            GlbChunks::parse(&data[..6]),
            Err(ContainerError::Truncated { .. })
        ));
    }
}
