// src/codecs/ico.rs
//
// ICO container: fixed-layout serializer and directory reader.
//
// Layout (all integers little-endian):
//   header     6 bytes   reserved u16 = 0, type u16 = 1, count u16
//   directory  16 bytes per entry, in payload order
//   payloads   concatenated, in directory order
//
// Every payload is a complete PNG stream. Width/height bytes hold the edge
// length, or 0 when the edge is 256 or larger.

use crate::error::ToolboxError;

type IcoResult<T> = std::result::Result<T, ToolboxError>;

pub const ICO_HEADER_LEN: usize = 6;
pub const ICO_DIR_ENTRY_LEN: usize = 16;
pub const ICO_TYPE_ICON: u16 = 1;
pub const ICO_MIME_TYPE: &str = "image/x-icon";

const PLANES: u16 = 1;
const BITS_PER_PIXEL: u16 = 32;

/// One rendered icon image: PNG bytes plus the square edge length they were rendered at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconPayload {
    pub size: u32,
    pub data: Vec<u8>,
}

impl IconPayload {
    pub fn new(size: u32, data: Vec<u8>) -> Self {
        Self { size, data }
    }
}

/// Byte stored in the width/height fields for an edge length.
#[inline]
pub fn edge_byte(size: u32) -> u8 {
    if size >= 256 {
        0
    } else {
        size as u8
    }
}

/// A parsed 16-byte directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IconDirEntry {
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub reserved: u8,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub size: u32,
    pub offset: u32,
}

impl IconDirEntry {
    /// Width in pixels (a stored 0 means 256).
    pub fn pixel_width(&self) -> u32 {
        if self.width == 0 {
            256
        } else {
            self.width as u32
        }
    }

    /// Height in pixels (a stored 0 means 256).
    pub fn pixel_height(&self) -> u32 {
        if self.height == 0 {
            256
        } else {
            self.height as u32
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.width);
        out.push(self.height);
        out.push(self.color_count);
        out.push(self.reserved);
        out.extend_from_slice(&self.planes.to_le_bytes());
        out.extend_from_slice(&self.bits_per_pixel.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
    }

    fn read_from(raw: &[u8]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Self {
            width: raw[0],
            height: raw[1],
            color_count: raw[2],
            reserved: raw[3],
            planes: u16_at(4),
            bits_per_pixel: u16_at(6),
            size: u32_at(8),
            offset: u32_at(12),
        }
    }
}

/// Ordered, non-empty list of icon payloads ready to serialize.
#[derive(Clone, Debug)]
pub struct IcoContainer {
    payloads: Vec<IconPayload>,
}

impl IcoContainer {
    pub fn new(payloads: Vec<IconPayload>) -> IcoResult<Self> {
        if payloads.is_empty() {
            return Err(ToolboxError::no_icon_sizes());
        }
        if payloads.len() > u16::MAX as usize {
            return Err(ToolboxError::invalid_argument(
                "sizes",
                payloads.len().to_string(),
                format!("an ICO directory holds at most {} entries", u16::MAX),
            ));
        }
        if let Some(empty) = payloads.iter().find(|p| p.data.is_empty()) {
            return Err(ToolboxError::encode_failed(
                "png",
                format!("icon payload for size {} is empty", empty.size),
            ));
        }
        Ok(Self { payloads })
    }

    pub fn payloads(&self) -> &[IconPayload] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Offset of the first payload byte.
    pub fn data_offset(&self) -> usize {
        ICO_HEADER_LEN + ICO_DIR_ENTRY_LEN * self.payloads.len()
    }

    /// Total serialized length: 6 + 16*N + sum of payload lengths.
    pub fn encoded_len(&self) -> usize {
        self.data_offset() + self.payloads.iter().map(|p| p.data.len()).sum::<usize>()
    }

    /// Directory entries in payload order, with offsets laid out contiguously.
    pub fn entries(&self) -> IcoResult<Vec<IconDirEntry>> {
        let mut offset = self.data_offset() as u64;
        let mut entries = Vec::with_capacity(self.payloads.len());
        for payload in &self.payloads {
            let size = u32::try_from(payload.data.len()).map_err(|_| {
                ToolboxError::encode_failed("ico", "payload larger than 4 GiB")
            })?;
            let offset_u32 = u32::try_from(offset)
                .map_err(|_| ToolboxError::encode_failed("ico", "container larger than 4 GiB"))?;
            entries.push(IconDirEntry {
                width: edge_byte(payload.size),
                height: edge_byte(payload.size),
                color_count: 0,
                reserved: 0,
                planes: PLANES,
                bits_per_pixel: BITS_PER_PIXEL,
                size,
                offset: offset_u32,
            });
            offset += size as u64;
        }
        if offset > u32::MAX as u64 {
            return Err(ToolboxError::encode_failed(
                "ico",
                "container larger than 4 GiB",
            ));
        }
        Ok(entries)
    }

    pub fn to_bytes(&self) -> IcoResult<Vec<u8>> {
        let entries = self.entries()?;
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&ICO_TYPE_ICON.to_le_bytes());
        out.extend_from_slice(&(self.payloads.len() as u16).to_le_bytes());
        for entry in &entries {
            entry.write_to(&mut out);
        }
        for payload in &self.payloads {
            out.extend_from_slice(&payload.data);
        }
        debug_assert_eq!(out.len(), self.encoded_len());
        Ok(out)
    }
}

/// A finished ICO buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconFile {
    pub data: Vec<u8>,
}

impl IconFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn mime_type(&self) -> &'static str {
        ICO_MIME_TYPE
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for IconFile {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Parse and validate an ICO header and directory. Payloads are not decoded.
pub fn read_directory(bytes: &[u8]) -> IcoResult<Vec<IconDirEntry>> {
    if bytes.len() < ICO_HEADER_LEN {
        return Err(ToolboxError::malformed_ico(format!(
            "header needs {ICO_HEADER_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let reserved = u16::from_le_bytes([bytes[0], bytes[1]]);
    if reserved != 0 {
        return Err(ToolboxError::malformed_ico(format!(
            "reserved field is {reserved}, must be 0"
        )));
    }
    let kind = u16::from_le_bytes([bytes[2], bytes[3]]);
    if kind != ICO_TYPE_ICON {
        return Err(ToolboxError::malformed_ico(format!(
            "resource type is {kind}, expected {ICO_TYPE_ICON}"
        )));
    }
    let count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let dir_end = ICO_HEADER_LEN + ICO_DIR_ENTRY_LEN * count;
    if bytes.len() < dir_end {
        return Err(ToolboxError::malformed_ico(format!(
            "directory of {count} entries needs {dir_end} bytes, got {}",
            bytes.len()
        )));
    }

    bytes[ICO_HEADER_LEN..dir_end]
        .chunks_exact(ICO_DIR_ENTRY_LEN)
        .enumerate()
        .map(|(index, raw)| {
            let entry = IconDirEntry::read_from(raw);
            let end = entry.offset as u64 + entry.size as u64;
            if (entry.offset as usize) < dir_end || end > bytes.len() as u64 {
                return Err(ToolboxError::malformed_ico(format!(
                    "entry {index} addresses bytes {}..{end} outside the data region {dir_end}..{}",
                    entry.offset,
                    bytes.len()
                )));
            }
            Ok(entry)
        })
        .collect()
}

/// The payload slice an entry addresses.
pub fn payload<'a>(bytes: &'a [u8], entry: &IconDirEntry) -> IcoResult<&'a [u8]> {
    let start = entry.offset as usize;
    let end = start
        .checked_add(entry.size as usize)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            ToolboxError::malformed_ico(format!(
                "payload {}+{} exceeds buffer of {} bytes",
                entry.offset,
                entry.size,
                bytes.len()
            ))
        })?;
    Ok(&bytes[start..end])
}
