use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::collection::vec;
use proptest::prelude::*;

use crate::{DnsHeader, Message, Opcode, Question, Rcode, Record, RecordData, RecordType};

pub fn arb_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex(r"(([a-zA-Z0-9][a-zA-Z0-9-]{1,62}\.)+[a-zA-Z0-9]{2,63})|")
        .expect("regex should be valid")
}

fn arb_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Query),
        Just(Opcode::InverseQuery),
        Just(Opcode::Status),
        (3u8..16).prop_map(Opcode::Other),
    ]
}

fn arb_rcode() -> impl Strategy<Value = Rcode> {
    prop_oneof![
        Just(Rcode::NoError),
        Just(Rcode::FormatError),
        Just(Rcode::ServFail),
        Just(Rcode::NxDomain),
        Just(Rcode::NotImplemented),
        Just(Rcode::Refused),
        (6u8..16).prop_map(Rcode::Other),
    ]
}

fn arb_record_type() -> impl Strategy<Value = RecordType> {
    prop_oneof![
        Just(RecordType::A),
        Just(RecordType::Ns),
        Just(RecordType::Cname),
        Just(RecordType::Aaaa),
        Just(RecordType::Any),
        // Stay clear of the codes that map to dedicated variants
        (256u16..=65535).prop_map(RecordType::Other),
    ]
}

prop_compose! {
    pub fn arb_header()(
        id: u16,
        is_response: bool,
        opcode in arb_opcode(),
        authoritative: bool,
        truncated: bool,
        recursion_desired: bool,
        recursion_available: bool,
        z in 0u8..8,
        rcode in arb_rcode(),
        question_count: u16,
        answer_count: u16,
        authority_count: u16,
        additional_count: u16,
    ) -> DnsHeader {
        DnsHeader {
            id,
            is_response,
            opcode,
            authoritative,
            truncated,
            recursion_desired,
            recursion_available,
            z,
            rcode,
            question_count,
            answer_count,
            authority_count,
            additional_count,
        }
    }
}

prop_compose! {
    pub fn arb_question()(qname in arb_name(), qtype in arb_record_type(), qclass: u16) -> Question {
        Question { qname, qtype, qclass }
    }
}

pub fn arb_record_data() -> impl Strategy<Value = RecordData> {
    prop_oneof![
        any::<Ipv4Addr>().prop_map(RecordData::A),
        arb_name().prop_map(RecordData::Ns),
        arb_name().prop_map(RecordData::Cname),
        (arb_name(), arb_name(), any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(mname, rname, serial, refresh, retry, expire, minimum)| RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            }
        ),
        arb_name().prop_map(RecordData::Ptr),
        (any::<u16>(), arb_name()).prop_map(|(preference, exchange)| RecordData::Mx { preference, exchange }),
        vec(vec(any::<u8>(), 0..100), 0..4).prop_map(RecordData::Txt),
        any::<Ipv6Addr>().prop_map(RecordData::Aaaa),
        // Use reserved record types to avoid collisions with the ones we decode
        (65280u16..=65534, vec(any::<u8>(), 0..100)).prop_map(|(rtype, data)| RecordData::Other { rtype, data }),
    ]
}

prop_compose! {
    pub fn arb_record()(name in arb_name(), class: u16, ttl: u32, data in arb_record_data()) -> Record {
        Record { name, class, ttl, data }
    }
}

prop_compose! {
    pub fn arb_message()(
        header in arb_header(),
        questions in vec(arb_question(), 0..3),
        answers in vec(arb_record(), 0..3),
        authorities in vec(arb_record(), 0..3),
        additionals in vec(arb_record(), 0..3),
    ) -> Message {
        Message { header, questions, answers, authorities, additionals }
    }
}
