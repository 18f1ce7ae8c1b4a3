//! Version 2 of the PROXY protocol (the binary form).
//!
//! See <https://haproxy.org/download/1.8/doc/proxy-protocol.txt>

mod builder;

pub(crate) use builder::encode;

use crate::crc32c;
use crate::error::Error;
use crate::model::{
    AddressFamily, Addresses, IPv4, IPv6, PpInfo, SslInfo, TransportProtocol, UNIX_PATH_LENGTH,
    Unix,
};
use crate::tlv::{
    AWS_SUBTYPE_VPCE_ID, AZURE_SUBTYPE_PRIVATE_ENDPOINT_LINK_ID, MAXIMUM_UNIQUE_ID_LENGTH,
    MINIMUM_TLV_LENGTH, Tlv, Type,
};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The 12-byte signature of a binary header.
pub const PROTOCOL_PREFIX: &[u8] = b"\r\n\r\n\0\r\nQUIT\n";

/// Size of the fixed part of a binary header: the signature, the version and
/// command byte, the family and protocol byte, and the big-endian length.
pub const MINIMUM_LENGTH: usize = 16;

/// Offset of the big-endian u16 payload length within the fixed part.
const LENGTH: usize = 14;

/// Parses a binary header from the front of the buffer into `info`.
/// The dispatcher has already matched the signature and the fixed part.
/// Returns the number of bytes consumed.
pub(crate) fn parse(buffer: &[u8], info: &mut PpInfo) -> Result<usize, Error> {
    let version = buffer[12] >> 4;
    if version != 2 {
        return Err(Error::V2Version(version));
    }

    info.local = match buffer[12] & 0x0F {
        0x0 => true,
        0x1 => false,
        command => return Err(Error::V2Command(command)),
    };

    let family = match buffer[13] >> 4 {
        0x0 => AddressFamily::Unspecified,
        0x1 => AddressFamily::IPv4,
        0x2 => AddressFamily::IPv6,
        0x3 => AddressFamily::Unix,
        family => return Err(Error::V2AddressFamily(family)),
    };

    info.transport_protocol = match buffer[13] & 0x0F {
        0x0 => TransportProtocol::Unspecified,
        0x1 => TransportProtocol::Stream,
        0x2 => TransportProtocol::Datagram,
        protocol => return Err(Error::V2TransportProtocol(protocol)),
    };

    let length = u16::from_be_bytes([buffer[LENGTH], buffer[LENGTH + 1]]) as usize;
    if buffer.len() < MINIMUM_LENGTH + length {
        return Err(Error::V2Length(buffer.len() - MINIMUM_LENGTH, length));
    }

    let header = &buffer[..MINIMUM_LENGTH + length];

    let address_block = family.address_block_length();
    if length < address_block {
        return Err(Error::V2Length(length, address_block));
    }

    let addresses = &header[MINIMUM_LENGTH..MINIMUM_LENGTH + address_block];
    info.addresses = match family {
        AddressFamily::Unspecified => Addresses::Unspecified,
        AddressFamily::IPv4 => Addresses::IPv4(IPv4 {
            source_address: Ipv4Addr::from(read_array::<4>(addresses, 0)),
            destination_address: Ipv4Addr::from(read_array::<4>(addresses, 4)),
            source_port: read_u16(addresses, 8),
            destination_port: read_u16(addresses, 10),
        }),
        AddressFamily::IPv6 => Addresses::IPv6(IPv6 {
            source_address: Ipv6Addr::from(read_array::<16>(addresses, 0)),
            destination_address: Ipv6Addr::from(read_array::<16>(addresses, 16)),
            source_port: read_u16(addresses, 32),
            destination_port: read_u16(addresses, 34),
        }),
        AddressFamily::Unix => Addresses::Unix(Unix::new(
            read_array::<UNIX_PATH_LENGTH>(addresses, 0),
            read_array::<UNIX_PATH_LENGTH>(addresses, UNIX_PATH_LENGTH),
        )),
    };

    parse_tlvs(header, MINIMUM_LENGTH + address_block, info)?;

    Ok(header.len())
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(&bytes[at..at + N]);
    array
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Walks the Type-Length-Values following the address block.
fn parse_tlvs(header: &[u8], mut offset: usize, info: &mut PpInfo) -> Result<(), Error> {
    while offset < header.len() {
        let remaining = header.len() - offset;
        if remaining < MINIMUM_TLV_LENGTH {
            return Err(Error::V2TlvLength(header[offset], MINIMUM_TLV_LENGTH));
        }

        let kind = header[offset];
        let length = read_u16(header, offset + 1) as usize;
        let size = MINIMUM_TLV_LENGTH + length;
        if size > remaining {
            return Err(Error::V2TlvLength(kind, size));
        }

        let value = &header[offset + MINIMUM_TLV_LENGTH..offset + size];

        match Type::from_byte(kind) {
            Some(Type::ALPN | Type::Authority | Type::NetworkNamespace) => {
                info.push_tlv(Tlv::new(kind, value));
            }
            Some(Type::UniqueId) => {
                if length > MAXIMUM_UNIQUE_ID_LENGTH {
                    return Err(Error::V2UniqueIdLength(length));
                }

                info.push_tlv(Tlv::new(kind, value));
            }
            Some(Type::CRC32C) => {
                verify_checksum(header, offset + MINIMUM_TLV_LENGTH, value)?;

                info.push_tlv(Tlv::new(kind, value));
                info.crc32c = true;
            }
            Some(Type::NoOp) => (),
            Some(Type::SSL) => parse_ssl(value, info)?,
            Some(Type::AWS) => {
                if value.is_empty() {
                    return Err(Error::V2AwsLength(length));
                }

                if value[0] == AWS_SUBTYPE_VPCE_ID {
                    info.push_tlv(Tlv::new(kind, value));
                }
            }
            Some(Type::Azure) => {
                if value.len() < 5 {
                    return Err(Error::V2AzureLength(length));
                }

                if value[0] == AZURE_SUBTYPE_PRIVATE_ENDPOINT_LINK_ID {
                    info.push_tlv(Tlv::new(kind, value));
                }
            }
            // SSL sub-TLV kinds are only meaningful inside an SSL envelope;
            // at the top level they are skipped like any unknown kind.
            Some(
                Type::SSLVersion
                | Type::SSLCommonName
                | Type::SSLCipher
                | Type::SSLSignatureAlgorithm
                | Type::SSLKeyAlgorithm,
            )
            | None => (),
        }

        offset += size;
    }

    Ok(())
}

/// The checksum covers the whole header with the four checksum bytes
/// themselves read as zero; the caller's buffer is never written to.
fn verify_checksum(header: &[u8], at: usize, value: &[u8]) -> Result<(), Error> {
    if value.len() != 4 {
        return Err(Error::V2Crc32c);
    }

    let received = u32::from_be_bytes(read_array::<4>(value, 0));

    let mut digest = crc32c::Digest::new();
    digest.update(&header[..at]);
    digest.update(&[0u8; 4]);
    digest.update(&header[at + 4..]);

    if digest.finalize() != received {
        return Err(Error::V2Crc32c);
    }

    Ok(())
}

/// Unpacks the composite SSL TLV: a client bitfield, an opaque verify word
/// compared against zero, and a run of sub-TLVs. The envelope is stored
/// first, every sub-TLV follows it as a sibling in the sequence.
fn parse_ssl(value: &[u8], info: &mut PpInfo) -> Result<(), Error> {
    if value.len() < 5 {
        return Err(Error::V2Ssl);
    }

    let client = value[0];
    let verified = value[1..5] == [0u8; 4];

    info.push_tlv(Tlv::new(Type::SSL, value));

    let mut version_seen = false;
    let mut offset = 5;

    while offset < value.len() {
        let remaining = value.len() - offset;
        if remaining < MINIMUM_TLV_LENGTH {
            return Err(Error::V2Ssl);
        }

        let kind = value[offset];
        let length = read_u16(value, offset + 1) as usize;
        let size = MINIMUM_TLV_LENGTH + length;
        if size > remaining {
            return Err(Error::V2Ssl);
        }

        let sub_value = &value[offset + MINIMUM_TLV_LENGTH..offset + size];

        match Type::from_byte(kind) {
            Some(Type::SSLVersion) => {
                version_seen = true;
                info.push_tlv(Tlv::new(kind, sub_value));
            }
            Some(
                Type::SSLCommonName
                | Type::SSLCipher
                | Type::SSLSignatureAlgorithm
                | Type::SSLKeyAlgorithm,
            ) => info.push_tlv(Tlv::new(kind, sub_value)),
            _ => return Err(Error::V2Ssl),
        }

        offset += size;
    }

    let ssl_info = SslInfo::from_client(client, verified);
    if ssl_info.ssl && !version_seen {
        return Err(Error::V2Ssl);
    }

    info.ssl_info = ssl_info;

    Ok(())
}
