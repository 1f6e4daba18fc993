#[cfg(test)]
pub(crate) mod test_utils;

mod buf;
mod header;
mod question;
mod record;

pub use buf::{Decode, Encode, Reader, Writer};
pub use header::{DnsHeader, Opcode, Rcode};
pub use question::{Question, RecordType};
pub use record::{Record, RecordData};

use anyhow::Context;

/// The Internet class
pub const IN_CLASS: u16 = 1;

#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Message {
    pub header: DnsHeader,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Message {
    /// A fresh recursion-desired query carrying a single question.
    pub fn query(id: u16, question: Question) -> Self {
        let mut message = Message::default();
        message.header.id = id;
        message.header.recursion_desired = true;
        message.questions.push(question);
        message
    }

    /// An empty reply skeleton for the given request header.
    pub fn reply_to(request: &DnsHeader) -> Self {
        let mut message = Message::default();
        message.stamp_reply(request);
        message
    }

    /// Rewrites this message's header so it answers the given request:
    /// transaction ID and RD are copied from the request, the response,
    /// authoritative and recursion-available bits are set. Used both for
    /// cached responses and for upstream answers before they go back out.
    pub fn stamp_reply(&mut self, request: &DnsHeader) {
        self.header.id = request.id;
        self.header.is_response = true;
        self.header.authoritative = true;
        self.header.recursion_desired = request.recursion_desired;
        self.header.recursion_available = true;
    }

    /// Whether the answer section holds at least one A or AAAA record.
    pub fn has_address_answer(&self) -> bool {
        self.answers.iter().any(|record| record.data.is_address())
    }

    /// A copy with all records dropped and the TC bit set, for replies
    /// that don't fit into a UDP datagram.
    pub fn to_truncated(&self) -> Message {
        let mut message = Message {
            header: self.header.clone(),
            questions: self.questions.clone(),
            ..Default::default()
        };
        message.header.truncated = true;
        message
    }

    pub fn encode_to_vec(&self) -> anyhow::Result<Vec<u8>> {
        let mut writer = Writer::new();
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

impl Decode for Message {
    fn decode(reader: &mut Reader<'_>) -> anyhow::Result<Self> {
        let header = DnsHeader::decode(reader).context("header parsing error")?;

        let mut questions = Vec::with_capacity(header.question_count as usize);
        for idx in 0..header.question_count {
            let question =
                Question::decode(reader).with_context(|| format!("question parsing error at idx {}", idx))?;
            questions.push(question);
        }

        let mut answers = Vec::with_capacity(header.answer_count as usize);
        for idx in 0..header.answer_count {
            let record = Record::decode(reader).with_context(|| format!("answer RR parsing error at idx {}", idx))?;
            answers.push(record);
        }

        let mut authorities = Vec::with_capacity(header.authority_count as usize);
        for idx in 0..header.authority_count {
            let record =
                Record::decode(reader).with_context(|| format!("authority RR parsing error at idx {}", idx))?;
            authorities.push(record);
        }

        let mut additionals = Vec::with_capacity(header.additional_count as usize);
        for idx in 0..header.additional_count {
            let record =
                Record::decode(reader).with_context(|| format!("additional RR parsing error at idx {}", idx))?;
            additionals.push(record);
        }

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

impl Encode for Message {
    fn encode(&self, writer: &mut Writer) -> anyhow::Result<()> {
        // Section counts always reflect the actual sections
        let mut header = self.header.clone();
        header.question_count = self.questions.len() as u16;
        header.answer_count = self.answers.len() as u16;
        header.authority_count = self.authorities.len() as u16;
        header.additional_count = self.additionals.len() as u16;
        header.encode(writer).context("writing header")?;

        for (idx, question) in self.questions.iter().enumerate() {
            question
                .encode(writer)
                .with_context(|| format!("writing question at idx {}", idx))?;
        }
        for (idx, record) in self.answers.iter().enumerate() {
            record
                .encode(writer)
                .with_context(|| format!("writing answer RR at idx {}", idx))?;
        }
        for (idx, record) in self.authorities.iter().enumerate() {
            record
                .encode(writer)
                .with_context(|| format!("writing authority RR at idx {}", idx))?;
        }
        for (idx, record) in self.additionals.iter().enumerate() {
            record
                .encode(writer)
                .with_context(|| format!("writing additional RR at idx {}", idx))?;
        }

        Ok(())
    }
}
