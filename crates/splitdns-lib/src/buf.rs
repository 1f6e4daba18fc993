use core::str;
use std::collections::HashMap;

use anyhow::Context;

/// Maximum number of compression pointers followed while reading a single name.
const MAX_NAME_JUMPS: usize = 32;
/// RFC 1035: a full domain name is limited to 255 octets.
const MAX_NAME_LENGTH: usize = 255;

pub trait Decode: Sized {
    fn decode(reader: &mut Reader<'_>) -> anyhow::Result<Self>;
}

pub trait Encode {
    fn encode(&self, writer: &mut Writer) -> anyhow::Result<()>;
}

/// Cursor over a received datagram. Names may point anywhere into the
/// underlying message, so the reader always keeps the full buffer around.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        let byte = *self.buf.get(self.pos).context("unexpected end of message")?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.read_slice(2)
            .map(|bytes| u16::from_be_bytes(bytes.try_into().expect("length checked")))
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        self.read_slice(4)
            .map(|bytes| u32::from_be_bytes(bytes.try_into().expect("length checked")))
    }

    pub fn read_slice(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .with_context(|| format!("unexpected end of message: wanted {} bytes at byte {}", n, self.pos))?;
        self.pos += n;
        Ok(slice)
    }

    /// Reads a possibly-compressed domain name. The returned name is
    /// dot-separated without a trailing dot; the root name is `""`.
    pub fn read_name(&mut self) -> anyhow::Result<String> {
        let mut labels: Vec<&str> = Vec::new();
        let mut name_length = 0;
        let mut pos = self.pos;
        let mut jumps = 0;

        loop {
            let length = *self.buf.get(pos).context("malformed name: missing label length")? as usize;
            if length & 0xC0 == 0xC0 {
                let second = *self.buf.get(pos + 1).context("malformed name: missing second pointer byte")? as usize;
                if jumps == 0 {
                    // Parsing continues right after the two pointer bytes
                    self.pos = pos + 2;
                }
                jumps += 1;
                if jumps > MAX_NAME_JUMPS {
                    anyhow::bail!("malformed name: too many compression pointers");
                }
                pos = ((length & 0x3F) << 8) | second;
            } else if length & 0xC0 != 0 {
                // 0x40/0x80 label types are reserved; accepting them would
                // also admit labels longer than the 63 octets a writer can emit
                anyhow::bail!("malformed name: reserved label type {:#04x} at byte {}", length, pos);
            } else if length == 0 {
                if jumps == 0 {
                    self.pos = pos + 1;
                }
                break;
            } else {
                let label = self
                    .buf
                    .get(pos + 1..pos + 1 + length)
                    .with_context(|| format!("malformed name: label of length {} at byte {}", length, pos))?;
                let label = str::from_utf8(label)
                    .with_context(|| format!("malformed name: label at byte {} is not UTF-8", pos))?;
                labels.push(label);
                name_length += 1 + length;
                if name_length > MAX_NAME_LENGTH {
                    anyhow::bail!("malformed name: exceeds {} octets", MAX_NAME_LENGTH);
                }
                pos += 1 + length;
                if jumps == 0 {
                    self.pos = pos;
                }
            }
        }

        Ok(labels.join("."))
    }
}

/// Growable output buffer with a name-offset map for label compression.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
    name_offsets: HashMap<String, u16>,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            buf: Vec::with_capacity(512),
            name_offsets: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, data: u8) {
        self.buf.push(data);
    }

    pub fn write_u16(&mut self, data: u16) {
        self.buf.extend_from_slice(&data.to_be_bytes());
    }

    pub fn write_u32(&mut self, data: u32) {
        self.buf.extend_from_slice(&data.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Overwrites two bytes written earlier, e.g. a stubbed-out RDLENGTH.
    pub fn patch_u16(&mut self, pos: usize, data: u16) -> anyhow::Result<()> {
        let slot = self
            .buf
            .get_mut(pos..pos + 2)
            .with_context(|| format!("patch position {} is out of bounds", pos))?;
        slot.copy_from_slice(&data.to_be_bytes());
        Ok(())
    }

    /// Writes a domain name, emitting a compression pointer for the longest
    /// already-written suffix. A trailing dot is accepted and ignored.
    pub fn write_name(&mut self, name: &str) -> anyhow::Result<()> {
        let name = name.strip_suffix('.').unwrap_or(name);
        let mut rest = name;

        while !rest.is_empty() {
            if let Some(&offset) = self.name_offsets.get(rest) {
                self.write_u16(0xC000 | offset);
                return Ok(());
            }

            let offset = self.buf.len();
            if offset <= 0x3FFF {
                self.name_offsets.insert(rest.to_string(), offset as u16);
            }

            let (label, tail) = rest.split_once('.').unwrap_or((rest, ""));
            if label.is_empty() {
                anyhow::bail!("empty label in name '{}'", name);
            }
            if label.len() > 0x3F {
                anyhow::bail!("label is too long ({}): {}", label.len(), label);
            }
            self.write_u8(label.len() as u8);
            self.write_bytes(label.as_bytes());
            rest = tail;
        }

        self.write_u8(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_root_name() {
        let mut reader = Reader::new(&[0x0]);
        assert_eq!(reader.read_name().expect("shouldn't have failed"), "");
        assert_eq!(reader.pos(), 1);
    }

    #[test]
    fn read_uncompressed_name() {
        let raw = &[0x6, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0];
        let mut reader = Reader::new(raw);
        assert_eq!(reader.read_name().expect("shouldn't have failed"), "google.com");
        assert_eq!(reader.pos(), raw.len());
    }

    #[test]
    fn read_compressed_name() {
        // "google.com" at offset 0, then "api" + pointer to offset 0
        let raw = &[
            0x6, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0, 0x3, 0x61, 0x70, 0x69, 0xC0, 0x0,
        ];
        let mut reader = Reader::new(raw);
        assert_eq!(reader.read_name().expect("shouldn't have failed"), "google.com");
        assert_eq!(reader.read_name().expect("shouldn't have failed"), "api.google.com");
        assert_eq!(reader.pos(), raw.len());
    }

    #[test]
    fn read_name_with_pointer_loop() {
        // Two pointers referencing each other
        let raw = &[0xC0, 0x2, 0xC0, 0x0];
        let mut reader = Reader::new(raw);
        let err = reader.read_name().unwrap_err();
        assert!(err.to_string().contains("too many compression pointers"));
    }

    #[test]
    fn read_name_with_truncated_label() {
        let mut reader = Reader::new(&[0x5, 0x67, 0x6f]);
        assert!(reader.read_name().is_err());
    }

    #[test]
    fn read_name_rejects_reserved_label_types() {
        // A 0x40 length byte would otherwise read as a 64-octet label,
        // which no writer can produce back
        for first in [0x40u8, 0x80] {
            let mut raw = vec![first];
            raw.extend(std::iter::repeat(0x61).take(0x80));
            raw.push(0x0);
            let mut reader = Reader::new(&raw);
            let err = reader.read_name().unwrap_err();
            assert!(err.to_string().contains("reserved label type"));
        }
    }

    #[test]
    fn write_root_name() {
        let mut writer = Writer::new();
        writer.write_name("").expect("shouldn't have failed");
        assert_eq!(writer.as_bytes(), &[0x0]);
    }

    #[test]
    fn write_name_ignores_trailing_dot() {
        let mut with_dot = Writer::new();
        with_dot.write_name("google.com.").expect("shouldn't have failed");
        let mut without_dot = Writer::new();
        without_dot.write_name("google.com").expect("shouldn't have failed");
        assert_eq!(with_dot.as_bytes(), without_dot.as_bytes());
    }

    #[test]
    fn write_name_compresses_repeated_suffix() {
        let mut writer = Writer::new();
        writer.write_name("google.com").expect("shouldn't have failed");
        writer.write_name("api.google.com").expect("shouldn't have failed");
        assert_eq!(
            writer.as_bytes(),
            &[0x6, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0, 0x3, 0x61, 0x70, 0x69, 0xC0, 0x0]
        );
    }

    #[test]
    fn write_name_rejects_long_label() {
        let label = "a".repeat(64);
        let mut writer = Writer::new();
        assert!(writer.write_name(&format!("{}.com", label)).is_err());
    }

    #[test]
    fn name_roundtrip() {
        let mut writer = Writer::new();
        writer.write_name("sub.example.net").expect("shouldn't have failed");
        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_name().expect("shouldn't have failed"), "sub.example.net");
    }

    #[test]
    fn patch_u16_updates_earlier_bytes() {
        let mut writer = Writer::new();
        writer.write_u16(0);
        writer.write_u8(0xFF);
        writer.patch_u16(0, 0xABCD).expect("shouldn't have failed");
        assert_eq!(writer.as_bytes(), &[0xAB, 0xCD, 0xFF]);
    }
}
