use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};
use crate::packet::QueryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsClass {
    Internet,
    Chaos,
    Unknown(u16),
}

impl DnsClass {
    pub fn into_num(self) -> u16 {
        match self {
            Self::Internet => 1,
            Self::Chaos => 3,
            Self::Unknown(n) => n,
        }
    }

    pub fn from_num(num: u16) -> Self {
        match num {
            1 => Self::Internet,
            3 => Self::Chaos,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: DnsClass,
}

impl Question {
    pub fn new(name: String, qtype: QueryType) -> Self {
        Self {
            name,
            qtype,
            qclass: DnsClass::Internet,
        }
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let mut name = String::new();
        buffer.read_qname(&mut name)?;
        let qtype = QueryType::from_num(buffer.read_u16()?);
        let qclass = DnsClass::from_num(buffer.read_u16()?);

        Ok(Self { name, qtype, qclass })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.qtype.into_num())?;
        buffer.write_u16(self.qclass.into_num())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_question() {
        let question = Question::new("perdu.com".into(), QueryType::A);
        let mut buffer = BytePacketBuffer::default();
        question.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let read = Question::read(&mut buffer).unwrap();
        assert_eq!(read, question);
    }

    #[test]
    fn should_default_to_internet_class() {
        let question = Question::new("perdu.com".into(), QueryType::AAAA);
        assert_eq!(question.qclass, DnsClass::Internet);
    }
}
