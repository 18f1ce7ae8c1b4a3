//! A PROXY protocol header parser and builder.
//!
//! <https://www.haproxy.org/download/1.8/doc/proxy-protocol.txt>
//!
//! Both forms of the protocol are supported: the text form (version 1,
//! terminated by `\r\n`) and the binary form (version 2), including TLV
//! metadata, the composite SSL TLV, CRC-32C integrity, and NoOp alignment
//! padding.
//!
//! The codec is pure: parsing reads from the front of a caller-supplied byte
//! buffer and building returns a freshly allocated one. Reading from sockets
//! and accumulating partial reads stay with the caller, as does the decision
//! whether to trust the header — the codec only vouches for well-formedness.
//!
//! ## Examples
//!
//! ```rust
//! use haproxy_protocol::{IPv4, PpInfo, TransportProtocol, Version, create_header, parse_header};
//!
//! let mut info = PpInfo::new();
//! info.transport_protocol = TransportProtocol::Stream;
//! info.addresses = IPv4::new([127, 0, 0, 1], [192, 168, 1, 1], 80, 443).into();
//! info.add_alpn(b"h2".to_vec()).unwrap();
//!
//! let header = create_header(Version::Two, &info).unwrap();
//!
//! let mut parsed = PpInfo::new();
//! let consumed = parse_header(&header, &mut parsed).unwrap();
//!
//! assert_eq!(consumed, header.len());
//! assert_eq!(parsed.addresses, info.addresses);
//! assert_eq!(parsed.alpn(), Some(b"h2".as_slice()));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

mod crc32c;
mod error;
mod model;

pub mod tlv;
pub mod v1;
pub mod v2;

pub use error::Error;
pub use model::{
    AddressFamily, Addresses, Command, IPv4, IPv6, PpInfo, SslInfo, TransportProtocol,
    UNIX_PATH_LENGTH, Unix, Version,
};

/// Parses a PROXY protocol header of either version from the front of `buffer`.
///
/// `info` is cleared and, on success, populated with everything the header
/// conveys. Returns the number of bytes consumed; zero means the buffer does
/// not start with a PROXY protocol header at all and the caller is free to
/// treat the bytes as payload. A buffer still too short to identify either
/// version also yields zero, so a streaming caller can retry with more bytes.
pub fn parse_header(buffer: &[u8], info: &mut PpInfo) -> Result<usize, Error> {
    info.clear();

    if buffer.len() >= v2::MINIMUM_LENGTH && buffer.starts_with(v2::PROTOCOL_PREFIX) {
        tracing::trace!("binary signature detected: parsing as version 2");
        v2::parse(buffer, info)
    } else if buffer.len() >= v1::MINIMUM_LENGTH
        && buffer.starts_with(v1::PROTOCOL_PREFIX.as_bytes())
    {
        tracing::trace!("text prefix detected: parsing as version 1");
        v1::parse(buffer, info)
    } else {
        Ok(0)
    }
}

/// Serializes `info` as a header of the requested version.
/// Ownership of the returned buffer transfers to the caller.
pub fn create_header(version: Version, info: &PpInfo) -> Result<Vec<u8>, Error> {
    match version {
        Version::One => v1::encode(info),
        Version::Two => v2::encode(info),
    }
}

/// Builds the 16-byte binary header a sender uses for connections made on its
/// own behalf, e.g. health checks: the Local command with unspecified family
/// and protocol, and no payload.
#[must_use]
pub fn create_healthcheck_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(v2::MINIMUM_LENGTH);

    header.extend_from_slice(v2::PROTOCOL_PREFIX);
    header.push(Version::Two | Command::Local);
    header.push(AddressFamily::Unspecified | TransportProtocol::Unspecified);
    header.extend_from_slice(&0u16.to_be_bytes());

    header
}
