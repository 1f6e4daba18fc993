use anyhow::Context;

use crate::{Decode, Encode, Reader, Writer, IN_CLASS};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Any,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            255 => RecordType::Any,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Any => 255,
            RecordType::Other(other) => other,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Question {
    pub qname: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl Question {
    pub fn new(qname: impl Into<String>, qtype: RecordType) -> Self {
        Question {
            qname: qname.into(),
            qtype,
            qclass: IN_CLASS,
        }
    }
}

impl Decode for Question {
    fn decode(reader: &mut Reader<'_>) -> anyhow::Result<Self> {
        let qname = reader.read_name().context("QNAME is missing")?;
        let qtype = reader.read_u16().context("QTYPE is missing")?.into();
        let qclass = reader.read_u16().context("QCLASS is missing")?;

        Ok(Question { qname, qtype, qclass })
    }
}

impl Encode for Question {
    fn encode(&self, writer: &mut Writer) -> anyhow::Result<()> {
        writer.write_name(&self.qname).context("writing QNAME")?;
        writer.write_u16(self.qtype.into());
        writer.write_u16(self.qclass);
        Ok(())
    }
}
