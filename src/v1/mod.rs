//! Version 1 of the PROXY protocol (the text form).
//!
//! See <https://haproxy.org/download/1.8/doc/proxy-protocol.txt>

use crate::error::Error;
use crate::model::{Addresses, IPv4, IPv6, PpInfo, TransportProtocol};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::{FromStr, from_utf8};

/// The prefix of the text header.
pub const PROTOCOL_PREFIX: &str = "PROXY";

/// The terminator of the text header.
pub const PROTOCOL_SUFFIX: &str = "\r\n";

/// Shortest buffer the dispatcher considers for the text protocol.
pub(crate) const MINIMUM_LENGTH: usize = 8;

/// The maximum length of the line in bytes, terminator excluded.
const MAX_LENGTH: usize = 107;

const TCP4: &str = "TCP4";
const TCP6: &str = "TCP6";
const UNKNOWN: &str = "UNKNOWN";
const SEPARATOR: u8 = b' ';

/// Parses a text header from the front of the buffer into `info`.
/// Returns the number of bytes through and including the terminator.
pub(crate) fn parse(buffer: &[u8], info: &mut PpInfo) -> Result<usize, Error> {
    let window = &buffer[..buffer.len().min(MAX_LENGTH + PROTOCOL_SUFFIX.len())];
    let end = window
        .windows(PROTOCOL_SUFFIX.len())
        .position(|bytes| bytes == PROTOCOL_SUFFIX.as_bytes())
        .ok_or(Error::V1MissingCrLf)?;
    let line = &window[..end];
    let consumed = end + PROTOCOL_SUFFIX.len();

    let rest = line
        .strip_prefix(PROTOCOL_PREFIX.as_bytes())
        .ok_or(Error::V1InvalidPrefix)?;
    let rest = strip_separator(rest).ok_or(Error::V1MissingSpace)?;

    if rest.starts_with(UNKNOWN.as_bytes()) {
        // The rest of the line is ignored, whatever it holds.
        info.transport_protocol = TransportProtocol::Unspecified;
        info.addresses = Addresses::Unspecified;

        return Ok(consumed);
    }

    let (transport, rest) = split_token(rest);
    let addresses = if transport == TCP4.as_bytes() {
        let (addresses, ports) = parse_addresses::<Ipv4Addr>(rest)?;

        IPv4::new(addresses.0, addresses.1, ports.0, ports.1).into()
    } else if transport == TCP6.as_bytes() {
        let (addresses, ports) = parse_addresses::<Ipv6Addr>(rest)?;

        IPv6::new(addresses.0, addresses.1, ports.0, ports.1).into()
    } else {
        return Err(Error::V1TransportFamily);
    };

    info.transport_protocol = TransportProtocol::Stream;
    info.addresses = addresses;

    Ok(consumed)
}

/// Parses the four address and port tokens following a TCP4 or TCP6 transport.
fn parse_addresses<T: FromStr>(rest: &[u8]) -> Result<((T, T), (u16, u16)), Error> {
    let rest = strip_separator(rest).ok_or(Error::V1MissingSpace)?;
    let (source, rest) = split_token(rest);
    let source_address = parse_address(source).ok_or(Error::V1SourceAddress)?;

    let rest = strip_separator(rest).ok_or(Error::V1MissingSpace)?;
    let (destination, rest) = split_token(rest);
    let destination_address = parse_address(destination).ok_or(Error::V1DestinationAddress)?;

    let rest = strip_separator(rest).ok_or(Error::V1MissingSpace)?;
    let (source_port, rest) = split_token(rest);
    let source_port = parse_port(source_port).ok_or(Error::V1SourcePort)?;

    let rest = strip_separator(rest).ok_or(Error::V1MissingSpace)?;
    // The destination port token runs to the end of the line.
    let destination_port = parse_port(rest).ok_or(Error::V1DestinationPort)?;

    Ok((
        (source_address, destination_address),
        (source_port, destination_port),
    ))
}

fn strip_separator(bytes: &[u8]) -> Option<&[u8]> {
    match bytes.first() {
        Some(&SEPARATOR) => Some(&bytes[1..]),
        _ => None,
    }
}

/// Splits off the next token; the remainder starts at the separator, if any.
fn split_token(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|&byte| byte == SEPARATOR) {
        Some(at) => (&bytes[..at], &bytes[at..]),
        None => (bytes, &[]),
    }
}

fn parse_address<T: FromStr>(token: &[u8]) -> Option<T> {
    from_utf8(token).ok()?.parse().ok()
}

/// Decimal port in 1..=65535; leading zeros are rejected, as is port zero.
fn parse_port(token: &[u8]) -> Option<u16> {
    let token = from_utf8(token).ok()?;

    if token.is_empty() || token.starts_with('0') || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    token.parse::<u16>().ok()
}

/// Serializes `info` as a text header.
pub(crate) fn encode(info: &PpInfo) -> Result<Vec<u8>, Error> {
    if !matches!(
        info.transport_protocol,
        TransportProtocol::Unspecified | TransportProtocol::Stream
    ) {
        return Err(Error::V1TransportFamily);
    }

    let header = match &info.addresses {
        Addresses::Unspecified => format!("{PROTOCOL_PREFIX} {UNKNOWN}{PROTOCOL_SUFFIX}"),
        Addresses::IPv4(addresses) => format!(
            "{PROTOCOL_PREFIX} {TCP4} {} {} {} {}{PROTOCOL_SUFFIX}",
            addresses.source_address,
            addresses.destination_address,
            addresses.source_port,
            addresses.destination_port,
        ),
        Addresses::IPv6(addresses) => format!(
            "{PROTOCOL_PREFIX} {TCP6} {} {} {} {}{PROTOCOL_SUFFIX}",
            addresses.source_address,
            addresses.destination_address,
            addresses.source_port,
            addresses.destination_port,
        ),
        Addresses::Unix(..) => return Err(Error::V1TransportFamily),
    };

    Ok(header.into_bytes())
}
