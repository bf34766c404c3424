use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError = 0,
    /// Format error - The name server was unable to interpret the query.
    FormatError = 1,
    /// Server failure - The name server was unable to process this query due to a problem with the name server.
    ServerFailure = 2,
    /// Name Error - Meaningful only for responses from an authoritative name server,
    /// this code signifies that the domain name referenced in the query does not exist.
    /// Previously name NXDOMAIN
    NameError = 3,
    /// Not Implemented - The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// Refused - The name server refuses to perform the specified operation for policy reasons.
    Refused = 5,
    /// BADCOOKIE (RFC 7873) - the DNS cookie option did not validate.
    BadCookie = 23,
}

impl ResponseCode {
    pub fn as_num(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoError => "NOERROR",
            Self::FormatError => "FORMERR",
            Self::ServerFailure => "SERVFAIL",
            Self::NameError => "NXDOMAIN",
            Self::NotImplemented => "NOTIMP",
            Self::Refused => "REFUSED",
            Self::BadCookie => "BADCOOKIE",
        };
        f.write_str(name)
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::NoError),
            1 => Ok(ResponseCode::FormatError),
            2 => Ok(ResponseCode::ServerFailure),
            3 => Ok(ResponseCode::NameError),
            4 => Ok(ResponseCode::NotImplemented),
            5 => Ok(ResponseCode::Refused),
            23 => Ok(ResponseCode::BadCookie),
            other => Err(ReaderError::InvalidResponseCode(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that
    /// generates any kind of query.  This identifier is copied
    /// the corresponding reply and can be used by the requester
    /// to match up replies to outstanding queries.
    pub id: u16, // 16 bits

    /// RD Recursion Desired - this bit may be set in a query and is copied into the response.
    pub recursion_desired: bool, // 1 bit
    /// TC TrunCation - specifies that this message was truncated due to length greater
    /// than that permitted on the transmission channel.
    pub truncated_message: bool, // 1 bit
    /// AA Authoritative Answer.
    pub authoritative_answer: bool, // 1 bit
    /// OPCODE: 0 standard query, 1 inverse query, 2 status.
    pub opcode: u8, // 4 bits
    /// QR: whether this message is a query (0) or a response (1).
    pub response: bool, // 1 bit

    /// Response code - this 4 bit field is set as part of responses.
    pub response_code: ResponseCode, // 4 bits
    /// CD Checking Disabled - caller asked to skip DNSSEC validation.
    pub checking_disabled: bool, // 1 bit
    /// AD Authenticated Data.
    pub authed_data: bool, // 1 bit
    /// Z Reserved for future use.  Must be zero in all queries and responses.
    pub z: bool, // 1 bit
    /// RA Recursion Available.
    pub recursion_available: bool, // 1 bit
}

impl Header {
    pub fn question(id: u16) -> Self {
        Self {
            id,
            recursion_desired: true,
            ..Default::default()
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            ..Default::default()
        }
    }

    pub fn response_from(request: &Self) -> Self {
        Self {
            id: request.id,
            recursion_desired: request.recursion_desired,
            truncated_message: false,
            authoritative_answer: false,
            opcode: request.opcode,
            response: true,
            response_code: ResponseCode::NoError,
            checking_disabled: request.checking_disabled,
            authed_data: false,
            z: false,
            recursion_available: false,
        }
    }

    pub fn with_response_code(mut self, value: ResponseCode) -> Self {
        self.response_code = value;
        self
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,
        }
    }
}

impl Header {
    /// Reads the first 4 bytes
    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let id = buffer.read_u16()?;

        let head = buffer.read()?;
        let tail = buffer.read()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated_message: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::try_from(tail & 0x0F)?,
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        let rcode = (self.response_code.as_num() & 0x0F) as u8;
        buffer.write_u8(
            rcode
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        Ok(())
    }
}
