use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::Context;

use crate::{Decode, Encode, Reader, RecordType, Writer};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Record {
    pub name: String,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl Record {
    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }
}

/// Decoded RDATA.
///
/// Every record type whose RDATA may contain a domain name is decoded into
/// a structured variant: compressed names point into the originating
/// message, so forwarding them as opaque bytes would re-emit pointers that
/// mean nothing in the re-encoded reply. Types without names stay raw.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RecordData {
    A(Ipv4Addr),
    Ns(String),
    Cname(String),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Ptr(String),
    Mx {
        preference: u16,
        exchange: String,
    },
    Txt(Vec<Vec<u8>>),
    Aaaa(Ipv6Addr),
    Other {
        rtype: u16,
        data: Vec<u8>,
    },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Soa { .. } => RecordType::Soa,
            RecordData::Ptr(_) => RecordType::Ptr,
            RecordData::Mx { .. } => RecordType::Mx,
            RecordData::Txt(_) => RecordType::Txt,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Other { rtype, .. } => RecordType::Other(*rtype),
        }
    }

    /// An address record is one carrying an IPv4 or IPv6 address.
    pub fn is_address(&self) -> bool {
        matches!(self, RecordData::A(_) | RecordData::Aaaa(_))
    }

    fn decode_with_type(reader: &mut Reader<'_>, rtype: RecordType) -> anyhow::Result<Self> {
        let rd_length = reader.read_u16().context("RDLENGTH is missing")? as usize;
        Ok(match rtype {
            RecordType::A => {
                if rd_length != 4 {
                    anyhow::bail!("A record: unexpected RDLENGTH {}", rd_length);
                }
                let octets = reader.read_slice(4).context("A record: ADDRESS is missing")?;
                RecordData::A(Ipv4Addr::from(
                    TryInto::<[u8; 4]>::try_into(octets).expect("length checked"),
                ))
            }
            RecordType::Ns => RecordData::Ns(reader.read_name().context("NS record: NSDNAME is missing")?),
            RecordType::Cname => RecordData::Cname(reader.read_name().context("CNAME record: CNAME is missing")?),
            RecordType::Soa => RecordData::Soa {
                mname: reader.read_name().context("SOA record: MNAME is missing")?,
                rname: reader.read_name().context("SOA record: RNAME is missing")?,
                serial: reader.read_u32().context("SOA record: SERIAL is missing")?,
                refresh: reader.read_u32().context("SOA record: REFRESH is missing")?,
                retry: reader.read_u32().context("SOA record: RETRY is missing")?,
                expire: reader.read_u32().context("SOA record: EXPIRE is missing")?,
                minimum: reader.read_u32().context("SOA record: MINIMUM is missing")?,
            },
            RecordType::Ptr => RecordData::Ptr(reader.read_name().context("PTR record: PTRDNAME is missing")?),
            RecordType::Mx => RecordData::Mx {
                preference: reader.read_u16().context("MX record: PREFERENCE is missing")?,
                exchange: reader.read_name().context("MX record: EXCHANGE is missing")?,
            },
            RecordType::Txt => {
                let end = reader.pos() + rd_length;
                let mut strings = Vec::new();
                while reader.pos() < end {
                    let length = reader.read_u8().context("TXT record: string length is missing")? as usize;
                    strings.push(reader.read_slice(length).context("TXT record: string is missing")?.to_vec());
                }
                RecordData::Txt(strings)
            }
            RecordType::Aaaa => {
                if rd_length != 16 {
                    anyhow::bail!("AAAA record: unexpected RDLENGTH {}", rd_length);
                }
                let octets = reader.read_slice(16).context("AAAA record: ADDRESS is missing")?;
                RecordData::Aaaa(Ipv6Addr::from(
                    TryInto::<[u8; 16]>::try_into(octets).expect("length checked"),
                ))
            }
            RecordType::Any => anyhow::bail!("ANY record doesn't exist"),
            RecordType::Other(rtype) => RecordData::Other {
                rtype,
                data: reader
                    .read_slice(rd_length)
                    .with_context(|| format!("record type {}: RDATA is missing", rtype))?
                    .to_vec(),
            },
        })
    }
}

impl Decode for Record {
    fn decode(reader: &mut Reader<'_>) -> anyhow::Result<Self> {
        let name = reader.read_name().context("NAME is missing")?;
        let rtype: RecordType = reader.read_u16().context("TYPE is missing")?.into();
        let class = reader.read_u16().context("CLASS is missing")?;
        let ttl = reader.read_u32().context("TTL is missing")?;
        let data = RecordData::decode_with_type(reader, rtype).context("can't decode RDATA")?;

        Ok(Record { name, class, ttl, data })
    }
}

impl Encode for Record {
    fn encode(&self, writer: &mut Writer) -> anyhow::Result<()> {
        writer.write_name(&self.name).context("writing NAME")?;
        writer.write_u16(self.rtype().into());
        writer.write_u16(self.class);
        writer.write_u32(self.ttl);

        // RDLENGTH isn't known upfront when RDATA contains compressible
        // names, so stub it out and patch it afterwards
        let rd_length_pos = writer.len();
        writer.write_u16(0);
        let rdata_start = writer.len();

        match &self.data {
            RecordData::A(address) => writer.write_bytes(&address.octets()),
            RecordData::Ns(name) => writer.write_name(name).context("NS record: writing NSDNAME")?,
            RecordData::Cname(name) => writer.write_name(name).context("CNAME record: writing CNAME")?,
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_name(mname).context("SOA record: writing MNAME")?;
                writer.write_name(rname).context("SOA record: writing RNAME")?;
                writer.write_u32(*serial);
                writer.write_u32(*refresh);
                writer.write_u32(*retry);
                writer.write_u32(*expire);
                writer.write_u32(*minimum);
            }
            RecordData::Ptr(name) => writer.write_name(name).context("PTR record: writing PTRDNAME")?,
            RecordData::Mx { preference, exchange } => {
                writer.write_u16(*preference);
                writer.write_name(exchange).context("MX record: writing EXCHANGE")?;
            }
            RecordData::Txt(strings) => {
                for string in strings {
                    if string.len() > 255 {
                        anyhow::bail!("TXT record: string exceeds 255 octets");
                    }
                    writer.write_u8(string.len() as u8);
                    writer.write_bytes(string);
                }
            }
            RecordData::Aaaa(address) => writer.write_bytes(&address.octets()),
            RecordData::Other { data, .. } => writer.write_bytes(data),
        }

        let rd_length = writer.len() - rdata_start;
        writer
            .patch_u16(rd_length_pos, rd_length as u16)
            .context("writing RDLENGTH")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_record;
    use proptest::prelude::*;

    #[test]
    fn a_record_with_wrong_rdlength_is_rejected() {
        // name ".", type A, class IN, TTL 60, RDLENGTH 3
        let raw = &[0x0, 0x0, 0x1, 0x0, 0x1, 0x0, 0x0, 0x0, 0x3C, 0x0, 0x3, 0x1, 0x2, 0x3];
        let mut reader = Reader::new(raw);
        assert!(Record::decode(&mut reader).is_err());
    }

    #[test]
    fn soa_rdata_names_are_decoded() {
        let record = Record {
            name: "example.com".to_string(),
            class: 1,
            ttl: 300,
            data: RecordData::Soa {
                mname: "ns1.example.com".to_string(),
                rname: "hostmaster.example.com".to_string(),
                serial: 2024010101,
                refresh: 7200,
                retry: 3600,
                expire: 1209600,
                minimum: 300,
            },
        };

        let mut writer = Writer::new();
        record.encode(&mut writer).expect("shouldn't have failed");
        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(Record::decode(&mut reader).expect("shouldn't have failed"), record);
    }

    proptest! {
        #[test]
        fn record_roundtrip(record in arb_record()) {
            let mut writer = Writer::new();
            record.encode(&mut writer).expect("shouldn't have failed");
            let mut reader = Reader::new(writer.as_bytes());
            let decoded = Record::decode(&mut reader).expect("shouldn't have failed");
            prop_assert_eq!(record, decoded);
        }
    }
}
