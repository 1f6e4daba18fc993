use anyhow::Context;

use crate::{Decode, Encode, Reader, Writer};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Opcode {
    /// Standard query
    #[default]
    Query,
    /// Inverse query
    InverseQuery,
    /// Server status request
    Status,
    /// Opcodes 3-15
    Other(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::InverseQuery,
            2 => Opcode::Status,
            other => Opcode::Other(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::InverseQuery => 1,
            Opcode::Status => 2,
            Opcode::Other(other) => other,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Rcode {
    #[default]
    NoError,
    /// Server was unable to interpret the query
    FormatError,
    /// Server failed to process the query
    ServFail,
    /// Queried name doesn't exist
    NxDomain,
    /// Query kind is not supported
    NotImplemented,
    /// Server refuses to answer
    Refused,
    /// Codes 6-15
    Other(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Other(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Other(other) => other,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DnsHeader {
    /// Transaction ID. A reply **must carry the same ID** as its query
    pub id: u16,
    /// Query/response bit
    pub is_response: bool,
    pub opcode: Opcode,
    /// Set by the server when it's authoritative for the queried zone
    pub authoritative: bool,
    /// Set when the message didn't fit and was cut short
    pub truncated: bool,
    /// Set by the client to request recursive resolution
    pub recursion_desired: bool,
    /// Set by the server when recursion is available
    pub recursion_available: bool,
    /// Three reserved bits, carried through verbatim
    pub z: u8,
    pub rcode: Rcode,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.is_response as u16) << 15
            | (u8::from(self.opcode) as u16 & 0xF) << 11
            | (self.authoritative as u16) << 10
            | (self.truncated as u16) << 9
            | (self.recursion_desired as u16) << 8
            | (self.recursion_available as u16) << 7
            | (self.z as u16 & 0x7) << 4
            | u8::from(self.rcode) as u16 & 0xF
    }
}

impl Decode for DnsHeader {
    fn decode(reader: &mut Reader<'_>) -> anyhow::Result<Self> {
        let id = reader.read_u16().context("ID is missing")?;
        let flags = reader.read_u16().context("flags are missing")?;
        let question_count = reader.read_u16().context("question count is missing")?;
        let answer_count = reader.read_u16().context("answer count is missing")?;
        let authority_count = reader.read_u16().context("authority count is missing")?;
        let additional_count = reader.read_u16().context("additional count is missing")?;

        Ok(DnsHeader {
            id,
            is_response: flags & 0x8000 != 0,
            opcode: (((flags >> 11) & 0xF) as u8).into(),
            authoritative: flags & 0x400 != 0,
            truncated: flags & 0x200 != 0,
            recursion_desired: flags & 0x100 != 0,
            recursion_available: flags & 0x80 != 0,
            z: ((flags >> 4) & 0x7) as u8,
            rcode: ((flags & 0xF) as u8).into(),
            question_count,
            answer_count,
            authority_count,
            additional_count,
        })
    }
}

impl Encode for DnsHeader {
    fn encode(&self, writer: &mut Writer) -> anyhow::Result<()> {
        writer.write_u16(self.id);
        writer.write_u16(self.flags());
        writer.write_u16(self.question_count);
        writer.write_u16(self.answer_count);
        writer.write_u16(self.authority_count);
        writer.write_u16(self.additional_count);
        Ok(())
    }
}
