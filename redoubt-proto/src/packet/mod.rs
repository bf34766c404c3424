pub mod header;
pub mod question;
pub mod record;

use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};
use record::{Opt, Record};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum QueryType {
    Unknown(u16),
    /// a host address
    A, // 1
    /// an authoritative name server
    NS, // 2
    /// the canonical name for an alias
    CNAME, // 5
    /// start of a zone of authority
    SOA, // 6
    /// a domain name pointer
    PTR, // 12
    /// mail exchange
    MX, // 15
    /// text strings
    TXT, // 16
    AAAA, // 28
    /// delegation signer
    DS, // 43
    /// the pseudo-RR carrying EDNS(0) options
    OPT, // 41
    /// DNSSEC signature
    RRSIG, // 46
    /// DNSSEC public key
    DNSKEY, // 48
}

impl QueryType {
    pub fn into_num(self) -> u16 {
        match self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::SOA => 6,
            QueryType::PTR => 12,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
            QueryType::DS => 43,
            QueryType::OPT => 41,
            QueryType::RRSIG => 46,
            QueryType::DNSKEY => 48,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            6 => QueryType::SOA,
            12 => QueryType::PTR,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            41 => QueryType::OPT,
            43 => QueryType::DS,
            46 => QueryType::RRSIG,
            48 => QueryType::DNSKEY,
            other => QueryType::Unknown(other),
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Unknown(n) => write!(f, "TYPE{n}"),
            QueryType::A => write!(f, "A"),
            QueryType::NS => write!(f, "NS"),
            QueryType::CNAME => write!(f, "CNAME"),
            QueryType::SOA => write!(f, "SOA"),
            QueryType::PTR => write!(f, "PTR"),
            QueryType::MX => write!(f, "MX"),
            QueryType::TXT => write!(f, "TXT"),
            QueryType::AAAA => write!(f, "AAAA"),
            QueryType::DS => write!(f, "DS"),
            QueryType::OPT => write!(f, "OPT"),
            QueryType::RRSIG => write!(f, "RRSIG"),
            QueryType::DNSKEY => write!(f, "DNSKEY"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: header::Header,
    pub questions: Vec<question::Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub resources: Vec<Record>,
}

impl DnsPacket {
    /// Builds a reply skeleton for `request`: same question(s), a
    /// response header, and the request's OPT record carried forward (so
    /// a synthesized reply can still echo COOKIE/DO back to the client).
    pub fn response_from(request: &Self) -> Self {
        Self {
            header: header::Header::response_from(&request.header),
            questions: request.questions.clone(),
            resources: request
                .edns_opt()
                .cloned()
                .map(|opt| vec![Record::Opt(opt)])
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn new(header: header::Header) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    pub fn with_question(mut self, question: question::Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_answer(mut self, record: Record) -> Self {
        self.answers.push(record);
        self
    }

    pub fn with_answers(mut self, records: Vec<Record>) -> Self {
        self.answers.extend(records);
        self
    }

    pub fn with_authority(mut self, record: Record) -> Self {
        self.authorities.push(record);
        self
    }

    pub fn with_resource(mut self, record: Record) -> Self {
        self.resources.push(record);
        self
    }

    /// Returns the EDNS(0) OPT pseudo-record carried in the additional
    /// section, if the sender attached one.
    pub fn edns_opt(&self) -> Option<&Opt> {
        self.resources.iter().find_map(|r| match r {
            Record::Opt(opt) => Some(opt),
            _ => None,
        })
    }

    /// Replaces (or appends) the OPT pseudo-record in the additional
    /// section.
    pub fn set_edns_opt(&mut self, opt: Opt) {
        self.resources.retain(|r| !matches!(r, Record::Opt(_)));
        self.resources.push(Record::Opt(opt));
    }

    pub fn max_udp_payload_size(&self) -> u16 {
        self.edns_opt().map(|o| o.udp_payload_size).unwrap_or(512)
    }

    pub fn dnssec_ok(&self) -> bool {
        self.edns_opt().map(|o| o.dnssec_ok).unwrap_or(false)
    }
}

impl TryFrom<BytePacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(mut buffer: BytePacketBuffer) -> Result<Self, Self::Error> {
        let header = header::Header::read(&mut buffer)?;

        let question_count = buffer.read_u16()? as usize;
        let answer_count = buffer.read_u16()? as usize;
        let authority_count = buffer.read_u16()? as usize;
        let resource_count = buffer.read_u16()? as usize;

        let mut questions = Vec::with_capacity(question_count);
        for _ in 0..question_count {
            questions.push(question::Question::read(&mut buffer)?);
        }

        let mut answers = Vec::with_capacity(answer_count);
        for _ in 0..answer_count {
            answers.push(Record::read(&mut buffer)?);
        }

        let mut authorities = Vec::with_capacity(authority_count);
        for _ in 0..authority_count {
            authorities.push(Record::read(&mut buffer)?);
        }

        let mut resources = Vec::with_capacity(resource_count);
        for _ in 0..resource_count {
            resources.push(Record::read(&mut buffer)?);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            resources,
        })
    }
}

impl DnsPacket {
    pub fn create_buffer(&self) -> Result<BytePacketBuffer, WriterError> {
        let mut buffer = BytePacketBuffer::default();
        self.header.write(&mut buffer)?;

        buffer.write_u16(self.questions.len() as u16)?;
        buffer.write_u16(self.answers.len() as u16)?;
        buffer.write_u16(self.authorities.len() as u16)?;
        buffer.write_u16(self.resources.len() as u16)?;

        for question in &self.questions {
            question.write(&mut buffer)?;
        }
        for rec in &self.answers {
            rec.write(&mut buffer)?;
        }
        for rec in &self.authorities {
            rec.write(&mut buffer)?;
        }
        for rec in &self.resources {
            rec.write(&mut buffer)?;
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use header::Header;
    use question::Question;
    use std::net::Ipv4Addr;

    #[test]
    fn should_roundtrip_full_packet() {
        let packet = DnsPacket::new(Header::question(1234))
            .with_question(Question::new("perdu.com".into(), QueryType::A))
            .with_answer(Record::A {
                domain: "perdu.com".into(),
                addr: Ipv4Addr::new(1, 2, 3, 4),
                ttl: 60,
            });

        let buffer = packet.create_buffer().unwrap();
        let read = DnsPacket::try_from(buffer).unwrap();
        assert_eq!(read.questions, packet.questions);
        assert_eq!(read.answers, packet.answers);
    }

    #[test]
    fn should_find_edns_opt() {
        let mut packet = DnsPacket::new(Header::question(1));
        packet.set_edns_opt(Opt::new(4096, true));
        assert_eq!(packet.max_udp_payload_size(), 4096);
        assert!(packet.dnssec_ok());
    }

    #[test]
    fn should_default_udp_payload_size_without_opt() {
        let packet = DnsPacket::new(Header::question(1));
        assert_eq!(packet.max_udp_payload_size(), 512);
        assert!(!packet.dnssec_ok());
    }
}
