//! The error taxonomy shared by the parsers and the header builders.

use std::fmt;

/// An error in parsing or building a PROXY protocol header.
///
/// Every failure of the codec maps to exactly one of these kinds; all of them
/// are terminal for the buffer at hand. A buffer that simply does not start
/// with either protocol prefix is not an error — [`parse_header`] reports it
/// as zero bytes consumed and leaves the decision to the caller.
///
/// [`parse_header`]: crate::parse_header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Requested header version must be 1 or 2.
    UnsupportedVersion(u8),
    /// Expected the version nibble of a binary header to be equal to 2.
    V2Version(u8),
    /// Invalid command. Command must be one of: Local, Proxy.
    V2Command(u8),
    /// Invalid address family. Address family must be one of: Unspecified, IPv4, IPv6, Unix.
    V2AddressFamily(u8),
    /// Invalid transport protocol. Protocol must be one of: Unspecified, Stream, Datagram.
    V2TransportProtocol(u8),
    /// Available bytes cannot store the required address block and TLVs.
    V2Length(usize, usize),
    /// A TLV does not fit the remaining header bytes, or its value overflows the u16 length field.
    V2TlvLength(u8, usize),
    /// CRC32C TLV is not exactly 4 bytes or its checksum does not match the header.
    V2Crc32c,
    /// SSL TLV with malformed sub-TLVs, an unknown sub-TLV kind, or a missing version sub-TLV.
    V2Ssl,
    /// Unique id TLV longer than 128 bytes.
    V2UniqueIdLength(usize),
    /// AWS TLV without a subtype byte.
    V2AwsLength(usize),
    /// Azure TLV too short for a subtype byte and a 32-bit link identifier.
    V2AzureLength(usize),
    /// Text header does not contain the '\r\n' terminator.
    V1MissingCrLf,
    /// Text header must start with 'PROXY'.
    V1InvalidPrefix,
    /// Expected a single space between text header tokens.
    V1MissingSpace,
    /// Text header transport must be one of: TCP4, TCP6, UNKNOWN.
    V1TransportFamily,
    /// Text header contains an invalid source IP address.
    V1SourceAddress,
    /// Text header contains an invalid destination IP address.
    V1DestinationAddress,
    /// Text header contains an invalid source port.
    V1SourcePort,
    /// Text header contains an invalid destination port.
    V1DestinationPort,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(version) => {
                write!(f, "Requested header version {} must be 1 or 2.", version)
            }
            Self::V2Version(version) => write!(
                f,
                "Expected version {:X} of a binary header to be equal to 2.",
                version
            ),
            Self::V2Command(command) => write!(
                f,
                "Invalid command {:X}. Command must be one of: Local, Proxy.",
                command
            ),
            Self::V2AddressFamily(family) => write!(
                f,
                "Invalid address family {:X}. Address family must be one of: Unspecified, IPv4, IPv6, Unix.",
                family
            ),
            Self::V2TransportProtocol(protocol) => write!(
                f,
                "Invalid transport protocol {:X}. Protocol must be one of: Unspecified, Stream, Datagram.",
                protocol
            ),
            Self::V2Length(available, required) => write!(
                f,
                "Header length of {} bytes cannot store the {} bytes required.",
                available, required
            ),
            Self::V2TlvLength(kind, size) => write!(
                f,
                "Header cannot store TLV {:#04X} of {} bytes.",
                kind, size
            ),
            Self::V2Crc32c => write!(
                f,
                "CRC32C TLV is not exactly 4 bytes or its checksum does not match the header."
            ),
            Self::V2Ssl => write!(
                f,
                "SSL TLV with malformed sub-TLVs, an unknown sub-TLV kind, or a missing version sub-TLV."
            ),
            Self::V2UniqueIdLength(length) => write!(
                f,
                "Unique id of {} bytes is longer than the 128 byte maximum.",
                length
            ),
            Self::V2AwsLength(length) => {
                write!(f, "AWS TLV of {} bytes has no room for a subtype.", length)
            }
            Self::V2AzureLength(length) => write!(
                f,
                "Azure TLV of {} bytes has no room for a subtype and a 32-bit link id.",
                length
            ),
            Self::V1MissingCrLf => {
                write!(f, "Header does not contain the string '\\r\\n'.")
            }
            Self::V1InvalidPrefix => write!(f, "Header must start with 'PROXY'."),
            Self::V1MissingSpace => {
                write!(f, "Expected a single space between header tokens.")
            }
            Self::V1TransportFamily => write!(
                f,
                "Header transport must be one of: TCP4, TCP6, UNKNOWN."
            ),
            Self::V1SourceAddress => {
                write!(f, "Header contains an invalid IP address for the source.")
            }
            Self::V1DestinationAddress => write!(
                f,
                "Header contains an invalid IP address for the destination."
            ),
            Self::V1SourcePort => {
                write!(f, "Header contains an invalid TCP port for the source.")
            }
            Self::V1DestinationPort => write!(
                f,
                "Header contains an invalid TCP port for the destination."
            ),
        }
    }
}

impl std::error::Error for Error {}
