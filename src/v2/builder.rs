//! Serializes a [`PpInfo`] into a binary header.

use super::{MINIMUM_LENGTH, PROTOCOL_PREFIX};
use crate::crc32c;
use crate::error::Error;
use crate::model::{Addresses, Command, PpInfo, Version};
use crate::tlv::{MINIMUM_TLV_LENGTH, Type};

/// Upper bound the u16 length field places on the variable part.
const MAXIMUM_PAYLOAD: usize = u16::MAX as usize;

/// Wire size of the checksum TLV: the frame plus a 4-byte value.
const CHECKSUM_SIZE: usize = MINIMUM_TLV_LENGTH + 4;

/// Encodes `info` as a binary header: the fixed part, the address block, the
/// stored TLVs in order, optional NoOp padding up to the requested alignment,
/// and an optional trailing CRC-32C checksum TLV over the whole buffer.
///
/// Stored TLVs of the checksum kind are not re-emitted verbatim; a parsed
/// checksum belongs to the buffer it was read from and would not survive a
/// change of byte layout, so the checksum is recomputed from the `crc32c`
/// flag instead.
pub(crate) fn encode(info: &PpInfo) -> Result<Vec<u8>, Error> {
    let command = match info.addresses {
        Addresses::Unspecified if info.local => Command::Local,
        Addresses::Unspecified => return Err(Error::V2Command(Command::Proxy as u8)),
        _ => Command::Proxy,
    };

    let crc32c_kind = u8::from(Type::CRC32C);
    let tlvs = || info.tlvs().iter().filter(|tlv| tlv.kind() != crc32c_kind);

    let mut payload = info.addresses.len() + tlvs().map(|tlv| tlv.wire_size()).sum::<usize>();
    if info.crc32c {
        payload += CHECKSUM_SIZE;
    }

    let padding = padding(payload, info.alignment_power)?;
    payload += padding;

    if payload > MAXIMUM_PAYLOAD {
        return Err(Error::V2Length(MAXIMUM_PAYLOAD, payload));
    }

    let mut header = Vec::with_capacity(MINIMUM_LENGTH + payload);
    header.extend_from_slice(PROTOCOL_PREFIX);
    header.push(Version::Two | command);
    header.push(info.addresses.address_family() | info.transport_protocol);
    header.extend_from_slice(&(payload as u16).to_be_bytes());

    match &info.addresses {
        Addresses::Unspecified => (),
        Addresses::IPv4(addresses) => {
            header.extend_from_slice(&addresses.source_address.octets());
            header.extend_from_slice(&addresses.destination_address.octets());
            header.extend_from_slice(&addresses.source_port.to_be_bytes());
            header.extend_from_slice(&addresses.destination_port.to_be_bytes());
        }
        Addresses::IPv6(addresses) => {
            header.extend_from_slice(&addresses.source_address.octets());
            header.extend_from_slice(&addresses.destination_address.octets());
            header.extend_from_slice(&addresses.source_port.to_be_bytes());
            header.extend_from_slice(&addresses.destination_port.to_be_bytes());
        }
        Addresses::Unix(addresses) => {
            header.extend_from_slice(&addresses.source);
            header.extend_from_slice(&addresses.destination);
        }
    }

    for tlv in tlvs() {
        header.push(tlv.kind());
        header.extend_from_slice(&(tlv.value().len() as u16).to_be_bytes());
        header.extend_from_slice(tlv.value());
    }

    if padding > 0 {
        header.push(Type::NoOp.into());
        header.extend_from_slice(&((padding - MINIMUM_TLV_LENGTH) as u16).to_be_bytes());
        header.resize(header.len() + padding - MINIMUM_TLV_LENGTH, 0);
    }

    if info.crc32c {
        header.push(crc32c_kind);
        header.extend_from_slice(&4u16.to_be_bytes());
        header.extend_from_slice(&[0u8; 4]);

        let checksum = crc32c::checksum(&header);
        let at = header.len() - 4;
        header[at..].copy_from_slice(&checksum.to_be_bytes());
    }

    Ok(header)
}

/// Bytes of NoOp padding needed to grow the header to the next multiple of
/// the alignment; zero when no alignment is requested or the header already
/// lands on a multiple. A gap smaller than a NoOp frame pushes the header to
/// the next multiple up.
fn padding(payload: usize, alignment_power: u8) -> Result<usize, Error> {
    if alignment_power <= 1 {
        return Ok(0);
    }

    // The whole header can never exceed 16 + 65535 bytes, so alignments
    // beyond 1 << 16 are unsatisfiable.
    if alignment_power > 16 {
        return Err(Error::V2Length(MAXIMUM_PAYLOAD, payload));
    }

    let alignment = 1usize << alignment_power;
    let total = MINIMUM_LENGTH + payload;
    let aligned = total.next_multiple_of(alignment);

    if aligned == total {
        return Ok(0);
    }

    let mut padding = aligned - total;
    if padding < MINIMUM_TLV_LENGTH {
        padding += alignment;
    }

    Ok(padding)
}
