use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};
use crate::packet::QueryType;
use std::net::{Ipv4Addr, Ipv6Addr};

/// EDNS(0) OPTION codes this resolver understands on the wire (RFC 6891,
/// RFC 7873 for COOKIE, RFC 8914 for EDE). Anything else round-trips as
/// `Unknown`.
const OPT_CODE_COOKIE: u16 = 10;
const OPT_CODE_EDE: u16 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdnsOption {
    /// 8 byte client cookie, plus an optional 8 byte server cookie once the
    /// server has handed one out (RFC 7873).
    Cookie {
        client: [u8; 8],
        server: Option<[u8; 8]>,
    },
    /// Extended DNS Error (RFC 8914): an info-code plus free-text extra.
    Ede { info_code: u16, extra_text: String },
    Unknown { code: u16, data: Vec<u8> },
}

impl EdnsOption {
    fn code(&self) -> u16 {
        match self {
            Self::Cookie { .. } => OPT_CODE_COOKIE,
            Self::Ede { .. } => OPT_CODE_EDE,
            Self::Unknown { code, .. } => *code,
        }
    }

    fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let code = buffer.read_u16()?;
        let len = buffer.read_u16()? as usize;
        let data = buffer.read_bytes(len)?;

        match code {
            OPT_CODE_COOKIE if data.len() >= 8 => {
                let mut client = [0u8; 8];
                client.copy_from_slice(&data[0..8]);
                let server = if data.len() >= 16 {
                    let mut server = [0u8; 8];
                    server.copy_from_slice(&data[8..16]);
                    Some(server)
                } else {
                    None
                };
                Ok(Self::Cookie { client, server })
            }
            OPT_CODE_EDE if data.len() >= 2 => {
                let info_code = ((data[0] as u16) << 8) | data[1] as u16;
                let extra_text = String::from_utf8_lossy(&data[2..]).into_owned();
                Ok(Self::Ede {
                    info_code,
                    extra_text,
                })
            }
            _ => Ok(Self::Unknown { code, data }),
        }
    }

    fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.code())?;
        match self {
            Self::Cookie { client, server } => {
                let len = if server.is_some() { 16 } else { 8 };
                buffer.write_u16(len)?;
                buffer.write_bytes(client)?;
                if let Some(server) = server {
                    buffer.write_bytes(server)?;
                }
            }
            Self::Ede {
                info_code,
                extra_text,
            } => {
                buffer.write_u16((2 + extra_text.len()) as u16)?;
                buffer.write_u16(*info_code)?;
                buffer.write_bytes(extra_text.as_bytes())?;
            }
            Self::Unknown { data, .. } => {
                buffer.write_u16(data.len() as u16)?;
                buffer.write_bytes(data)?;
            }
        }
        Ok(())
    }
}

/// The EDNS(0) pseudo-record (OPT RR, RFC 6891). Carries the UDP payload
/// size the sender advertises, the DO bit, and any options (COOKIE, EDE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opt {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub dnssec_ok: bool,
    pub options: Vec<EdnsOption>,
}

impl Opt {
    pub fn new(udp_payload_size: u16, dnssec_ok: bool) -> Self {
        Self {
            udp_payload_size,
            extended_rcode: 0,
            version: 0,
            dnssec_ok,
            options: Vec::new(),
        }
    }

    pub fn cookie(&self) -> Option<(&[u8; 8], Option<&[u8; 8]>)> {
        self.options.iter().find_map(|opt| match opt {
            EdnsOption::Cookie { client, server } => Some((client, server.as_ref())),
            _ => None,
        })
    }

    pub fn set_cookie(&mut self, client: [u8; 8], server: Option<[u8; 8]>) {
        self.options.retain(|o| !matches!(o, EdnsOption::Cookie { .. }));
        self.options.push(EdnsOption::Cookie { client, server });
    }

    pub fn ede(&self) -> Option<(u16, &str)> {
        self.options.iter().find_map(|opt| match opt {
            EdnsOption::Ede {
                info_code,
                extra_text,
            } => Some((*info_code, extra_text.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Unknown {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: u32,
    },
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    },
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    },
    NS {
        domain: String,
        host: String,
        ttl: u32,
    },
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    },
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    },
    PTR {
        domain: String,
        host: String,
        ttl: u32,
    },
    TXT {
        domain: String,
        text: Vec<String>,
        ttl: u32,
    },
    SOA {
        domain: String,
        primary_ns: String,
        mailbox: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum_ttl: u32,
        ttl: u32,
    },
    /// The EDNS(0) pseudo-record. Its "domain" is always the root (`.`),
    /// its "class" carries the advertised UDP payload size, and its TTL
    /// field is repurposed for the extended rcode / version / DO bit.
    Opt(Opt),
}

impl Record {
    pub fn ttl(&self) -> u32 {
        match self {
            Self::Unknown { ttl, .. }
            | Self::A { ttl, .. }
            | Self::AAAA { ttl, .. }
            | Self::NS { ttl, .. }
            | Self::CNAME { ttl, .. }
            | Self::MX { ttl, .. }
            | Self::PTR { ttl, .. }
            | Self::TXT { ttl, .. }
            | Self::SOA { ttl, .. } => *ttl,
            Self::Opt(_) => 0,
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Self::Unknown { domain, .. }
            | Self::A { domain, .. }
            | Self::AAAA { domain, .. }
            | Self::NS { domain, .. }
            | Self::CNAME { domain, .. }
            | Self::MX { domain, .. }
            | Self::PTR { domain, .. }
            | Self::TXT { domain, .. }
            | Self::SOA { domain, .. } => domain,
            Self::Opt(_) => ".",
        }
    }

    /// Returns a copy of this record with its TTL reduced by `elapsed`
    /// seconds (saturating at zero), used when serving a cached record.
    pub fn delayed_ttl(&self, elapsed: u32) -> Self {
        let mut clone = self.clone();
        let new_ttl = |ttl: u32| ttl.saturating_sub(elapsed);
        match &mut clone {
            Self::Unknown { ttl, .. }
            | Self::A { ttl, .. }
            | Self::AAAA { ttl, .. }
            | Self::NS { ttl, .. }
            | Self::CNAME { ttl, .. }
            | Self::MX { ttl, .. }
            | Self::PTR { ttl, .. }
            | Self::TXT { ttl, .. }
            | Self::SOA { ttl, .. } => *ttl = new_ttl(*ttl),
            Self::Opt(_) => {}
        }
        clone
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Record, ReaderError> {
        // NAME a domain name to which this resource record pertains.
        let mut domain = String::new();
        buffer.read_qname(&mut domain)?;

        // TYPE two octets containing one of the RR type codes.
        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);

        // CLASS two octets. For OPT this is instead the requestor's UDP
        // payload size.
        let class_or_udp_size = buffer.read_u16()?;

        // TTL. For OPT this is instead extended-rcode/version/DO/Z.
        let ttl_or_ext = buffer.read_u32()?;

        // RDLENGTH.
        let data_len = buffer.read_u16()?;

        match qtype {
            QueryType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::from(raw_addr);
                Ok(Record::A {
                    domain,
                    addr,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::AAAA => {
                let raw_addr1 = buffer.read_u32()?;
                let raw_addr2 = buffer.read_u32()?;
                let raw_addr3 = buffer.read_u32()?;
                let raw_addr4 = buffer.read_u32()?;
                let addr = Ipv6Addr::new(
                    ((raw_addr1 >> 16) & 0xFFFF) as u16,
                    (raw_addr1 & 0xFFFF) as u16,
                    ((raw_addr2 >> 16) & 0xFFFF) as u16,
                    (raw_addr2 & 0xFFFF) as u16,
                    ((raw_addr3 >> 16) & 0xFFFF) as u16,
                    (raw_addr3 & 0xFFFF) as u16,
                    ((raw_addr4 >> 16) & 0xFFFF) as u16,
                    (raw_addr4 & 0xFFFF) as u16,
                );
                Ok(Record::AAAA {
                    domain,
                    addr,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::NS => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::NS {
                    domain,
                    host,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::CNAME => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::CNAME {
                    domain,
                    host,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::PTR => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::PTR {
                    domain,
                    host,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::MX => {
                let priority = buffer.read_u16()?;
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::MX {
                    domain,
                    priority,
                    host,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::TXT => {
                let end = buffer.pos() + data_len as usize;
                let mut text = Vec::new();
                while buffer.pos() < end {
                    let len = buffer.read()? as usize;
                    let bytes = buffer.read_bytes(len)?;
                    text.push(String::from_utf8_lossy(&bytes).into_owned());
                }
                Ok(Record::TXT {
                    domain,
                    text,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::SOA => {
                let mut primary_ns = String::new();
                buffer.read_qname(&mut primary_ns)?;
                let mut mailbox = String::new();
                buffer.read_qname(&mut mailbox)?;
                let serial = buffer.read_u32()?;
                let refresh = buffer.read_u32()?;
                let retry = buffer.read_u32()?;
                let expire = buffer.read_u32()?;
                let minimum_ttl = buffer.read_u32()?;
                Ok(Record::SOA {
                    domain,
                    primary_ns,
                    mailbox,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum_ttl,
                    ttl: ttl_or_ext,
                })
            }
            QueryType::OPT => {
                let end = buffer.pos() + data_len as usize;
                let mut options = Vec::new();
                while buffer.pos() < end {
                    options.push(EdnsOption::read(buffer)?);
                }
                Ok(Record::Opt(Opt {
                    udp_payload_size: class_or_udp_size,
                    extended_rcode: ((ttl_or_ext >> 24) & 0xFF) as u8,
                    version: ((ttl_or_ext >> 16) & 0xFF) as u8,
                    dnssec_ok: (ttl_or_ext & 0x8000) != 0,
                    options,
                }))
            }
            QueryType::Unknown(_) | QueryType::DS | QueryType::RRSIG | QueryType::DNSKEY => {
                buffer.step(data_len as usize)?;
                Ok(Record::Unknown {
                    domain,
                    qtype: qtype_num,
                    data_len,
                    ttl: ttl_or_ext,
                })
            }
        }
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<usize, WriterError> {
        let start_pos = buffer.pos();

        match self {
            Record::A { domain, addr, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::A.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                buffer.write_u16(4)?;
                buffer.write_bytes(&addr.octets())?;
            }
            Record::AAAA { domain, addr, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::AAAA.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                buffer.write_u16(16)?;
                for octet in &addr.segments() {
                    buffer.write_u16(*octet)?;
                }
            }
            Record::NS { domain, host, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::NS.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| b.write_qname(host))?;
            }
            Record::CNAME { domain, host, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::CNAME.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| b.write_qname(host))?;
            }
            Record::PTR { domain, host, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::PTR.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| b.write_qname(host))?;
            }
            Record::MX {
                domain,
                priority,
                host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::MX.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| {
                    b.write_u16(*priority)?;
                    b.write_qname(host)
                })?;
            }
            Record::TXT { domain, text, ttl } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::TXT.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| {
                    for chunk in text {
                        b.write_u8(chunk.len().min(255) as u8)?;
                        b.write_bytes(&chunk.as_bytes()[..chunk.len().min(255)])?;
                    }
                    Ok(())
                })?;
            }
            Record::SOA {
                domain,
                primary_ns,
                mailbox,
                serial,
                refresh,
                retry,
                expire,
                minimum_ttl,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::SOA.into_num())?;
                buffer.write_u16(DnsClass::INTERNET)?;
                buffer.write_u32(*ttl)?;
                write_rdlength_prefixed(buffer, |b| {
                    b.write_qname(primary_ns)?;
                    b.write_qname(mailbox)?;
                    b.write_u32(*serial)?;
                    b.write_u32(*refresh)?;
                    b.write_u32(*retry)?;
                    b.write_u32(*expire)?;
                    b.write_u32(*minimum_ttl)
                })?;
            }
            Record::Opt(opt) => {
                buffer.write_qname(".")?;
                buffer.write_u16(QueryType::OPT.into_num())?;
                buffer.write_u16(opt.udp_payload_size)?;
                let ext = ((opt.extended_rcode as u32) << 24)
                    | ((opt.version as u32) << 16)
                    | if opt.dnssec_ok { 0x8000 } else { 0 };
                buffer.write_u32(ext)?;
                write_rdlength_prefixed(buffer, |b| {
                    for option in &opt.options {
                        option.write(b)?;
                    }
                    Ok(())
                })?;
            }
            Record::Unknown { .. } => {
                // Never synthesized; only produced by `read` for opaque
                // passthrough of unsupported types.
            }
        }

        Ok(buffer.pos() - start_pos)
    }
}

struct DnsClass;
impl DnsClass {
    const INTERNET: u16 = 1;
}

fn write_rdlength_prefixed<F>(buffer: &mut BytePacketBuffer, f: F) -> Result<(), WriterError>
where
    F: FnOnce(&mut BytePacketBuffer) -> Result<(), WriterError>,
{
    let len_pos = buffer.pos();
    buffer.write_u16(0)?;
    let data_start = buffer.pos();
    f(buffer)?;
    let len = buffer.pos() - data_start;
    buffer.set_u16(len_pos, len as u16)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_a_record() {
        let record = Record::A {
            domain: "perdu.com".into(),
            addr: Ipv4Addr::new(1, 2, 3, 4),
            ttl: 60,
        };
        let mut buffer = BytePacketBuffer::default();
        record.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let read = Record::read(&mut buffer).unwrap();
        assert_eq!(read, record);
    }

    #[test]
    fn should_roundtrip_soa_record() {
        let record = Record::SOA {
            domain: "10.in-addr.arpa.".into(),
            primary_ns: "10.in-addr.arpa.".into(),
            mailbox: ".".into(),
            serial: 0,
            refresh: 28800,
            retry: 7200,
            expire: 604800,
            minimum_ttl: 86400,
            ttl: 86400,
        };
        let mut buffer = BytePacketBuffer::default();
        record.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let read = Record::read(&mut buffer).unwrap();
        assert_eq!(read, record);
    }

    #[test]
    fn should_roundtrip_opt_with_cookie() {
        let mut opt = Opt::new(4096, true);
        opt.set_cookie([1, 2, 3, 4, 5, 6, 7, 8], None);
        let record = Record::Opt(opt);
        let mut buffer = BytePacketBuffer::default();
        record.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let read = Record::read(&mut buffer).unwrap();
        assert_eq!(read, record);
        if let Record::Opt(opt) = read {
            assert!(opt.dnssec_ok);
            let (client, server) = opt.cookie().unwrap();
            assert_eq!(client, &[1, 2, 3, 4, 5, 6, 7, 8]);
            assert!(server.is_none());
        } else {
            panic!("expected opt record");
        }
    }

    #[test]
    fn should_delay_ttl() {
        let record = Record::A {
            domain: "perdu.com".into(),
            addr: Ipv4Addr::new(1, 2, 3, 4),
            ttl: 60,
        };
        let delayed = record.delayed_ttl(10);
        assert_eq!(delayed.ttl(), 50);
    }
}
