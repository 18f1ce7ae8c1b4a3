//! End-to-end properties of the codec: serialize then re-parse.

use haproxy_protocol::{
    Addresses, Error, IPv4, IPv6, PpInfo, SslInfo, TransportProtocol, UNIX_PATH_LENGTH, Unix,
    Version, create_header, create_healthcheck_header, parse_header,
};
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone)]
struct ArbitraryInfo(PpInfo);

impl Arbitrary for ArbitraryInfo {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut info = PpInfo::new();

        info.transport_protocol = *g
            .choose(&[
                TransportProtocol::Unspecified,
                TransportProtocol::Stream,
                TransportProtocol::Datagram,
            ])
            .unwrap();

        info.addresses = match u8::arbitrary(g) % 4 {
            0 => {
                info.local = true;
                Addresses::Unspecified
            }
            1 => IPv4::new(
                Ipv4Addr::from(u32::arbitrary(g)),
                Ipv4Addr::from(u32::arbitrary(g)),
                u16::arbitrary(g),
                u16::arbitrary(g),
            )
            .into(),
            2 => IPv6::new(
                Ipv6Addr::from(u128::arbitrary(g)),
                Ipv6Addr::from(u128::arbitrary(g)),
                u16::arbitrary(g),
                u16::arbitrary(g),
            )
            .into(),
            _ => {
                let mut source = [0u8; UNIX_PATH_LENGTH];
                let mut destination = [0u8; UNIX_PATH_LENGTH];
                for byte in source.iter_mut().chain(destination.iter_mut()) {
                    *byte = u8::arbitrary(g);
                }
                Unix::new(source, destination).into()
            }
        };

        if bool::arbitrary(g) {
            info.add_alpn(vec![b'h'; usize::arbitrary(g) % 24]).unwrap();
        }
        if bool::arbitrary(g) {
            info.add_authority(b"example.com".to_vec()).unwrap();
        }
        if bool::arbitrary(g) {
            info.add_unique_id(vec![0xAB; usize::arbitrary(g) % 129])
                .unwrap();
        }
        if bool::arbitrary(g) {
            info.add_netns("cluster-1").unwrap();
        }
        if bool::arbitrary(g) {
            info.add_aws_vpce_id("vpce-08d2bf15fac5001c9").unwrap();
        }
        if bool::arbitrary(g) {
            info.add_azure_linkid(u32::arbitrary(g)).unwrap();
        }
        if bool::arbitrary(g) {
            info.ssl_info = SslInfo {
                ssl: bool::arbitrary(g),
                cert_in_connection: bool::arbitrary(g),
                cert_in_session: bool::arbitrary(g),
                cert_verified: bool::arbitrary(g),
            };
            info.add_ssl(
                "TLSv1.3",
                "TLS_AES_256_GCM_SHA384",
                "RSA-SHA256",
                "RSA4096",
                "client.example",
            )
            .unwrap();
        }

        info.crc32c = bool::arbitrary(g);
        info.alignment_power = *g.choose(&[0u8, 0, 0, 2, 3, 4, 5, 8, 12]).unwrap();

        Self(info)
    }
}

/// The TLVs that describe the connection itself: checksum records belong to
/// one specific buffer, and the loose sub-TLVs flattened out of an SSL
/// envelope are recoverable from the envelope, so both stay out of the
/// comparison.
fn primary_tlvs(info: &PpInfo) -> Vec<(u8, Vec<u8>)> {
    info.tlvs()
        .iter()
        .filter(|tlv| tlv.kind() != 0x03 && !(0x21..=0x25).contains(&tlv.kind()))
        .map(|tlv| (tlv.kind(), tlv.value().to_vec()))
        .collect()
}

fn equivalent(a: &PpInfo, b: &PpInfo) -> bool {
    a.transport_protocol == b.transport_protocol
        && a.local == b.local
        && a.addresses == b.addresses
        && a.ssl_info == b.ssl_info
        && a.crc32c == b.crc32c
        && primary_tlvs(a) == primary_tlvs(b)
}

#[quickcheck]
fn binary_round_trip(info: ArbitraryInfo) -> bool {
    let header = create_header(Version::Two, &info.0).unwrap();

    let mut parsed = PpInfo::new();
    let consumed = parse_header(&header, &mut parsed).unwrap();

    consumed == header.len() && equivalent(&parsed, &info.0)
}

#[quickcheck]
fn binary_alignment(info: ArbitraryInfo) -> bool {
    let header = create_header(Version::Two, &info.0).unwrap();

    info.0.alignment_power <= 1 || header.len() % (1usize << info.0.alignment_power) == 0
}

#[quickcheck]
fn re_parse_is_idempotent(info: ArbitraryInfo) -> bool {
    let first = create_header(Version::Two, &info.0).unwrap();

    let mut parsed = PpInfo::new();
    parse_header(&first, &mut parsed).unwrap();

    let second = create_header(Version::Two, &parsed).unwrap();

    let mut re_parsed = PpInfo::new();
    parse_header(&second, &mut re_parsed).unwrap();

    equivalent(&parsed, &re_parsed) && parsed.tlvs().len() == re_parsed.tlvs().len()
}

#[quickcheck]
fn corrupting_a_checksummed_address_block_is_detected(
    info: ArbitraryInfo,
    at: usize,
    bit: u8,
) -> bool {
    let mut info = info.0;
    info.crc32c = true;

    let block = info.addresses.len();
    if block == 0 {
        return true;
    }

    let mut header = create_header(Version::Two, &info).unwrap();

    // A flipped bit in the address block leaves the framing intact, so the
    // corruption must surface as a checksum mismatch and nothing else.
    let at = 16 + at % block;
    header[at] ^= 1 << (bit % 8);

    let mut parsed = PpInfo::new();
    parse_header(&header, &mut parsed) == Err(Error::V2Crc32c)
}

#[quickcheck]
fn dispatch_ignores_unrelated_buffers(bytes: Vec<u8>) -> bool {
    let v2 = bytes.len() >= 16 && bytes.starts_with(b"\r\n\r\n\0\r\nQUIT\n");
    let v1 = bytes.len() >= 8 && bytes.starts_with(b"PROXY");

    if v1 || v2 {
        return true;
    }

    let mut info = PpInfo::new();
    parse_header(&bytes, &mut info) == Ok(0)
}

#[test]
fn v1_ipv4_with_ports() {
    let text = b"PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\n";

    let mut info = PpInfo::new();
    let consumed = parse_header(text, &mut info).unwrap();

    assert_eq!(consumed, text.len());
    assert_eq!(info.transport_protocol, TransportProtocol::Stream);
    assert_eq!(
        info.addresses,
        IPv4::new([192, 168, 0, 1], [192, 168, 0, 11], 56324, 443).into()
    );
}

#[test]
fn v1_unknown_short_form() {
    let mut info = PpInfo::new();
    let consumed = parse_header(b"PROXY UNKNOWN\r\n", &mut info).unwrap();

    assert_eq!(consumed, 15);
    assert_eq!(info.transport_protocol, TransportProtocol::Unspecified);
    assert_eq!(info.addresses, Addresses::Unspecified);
}

#[test]
fn v2_healthcheck() {
    let header = create_healthcheck_header();

    assert_eq!(header.len(), 16);
    assert_eq!(&header[..12], b"\r\n\r\n\0\r\nQUIT\n");
    assert_eq!(&header[12..], &[0x20, 0x00, 0x00, 0x00]);

    let mut info = PpInfo::new();
    assert_eq!(parse_header(&header, &mut info), Ok(16));
    assert!(info.local);
}

#[test]
fn v2_ipv6_with_alpn_and_crc() {
    let mut info = PpInfo::new();
    info.transport_protocol = TransportProtocol::Stream;
    info.addresses = IPv6::new(
        "::1".parse::<Ipv6Addr>().unwrap(),
        "::2".parse::<Ipv6Addr>().unwrap(),
        1,
        2,
    )
    .into();
    info.add_alpn(b"h2".to_vec()).unwrap();
    info.crc32c = true;

    let mut header = create_header(Version::Two, &info).unwrap();

    let mut parsed = PpInfo::new();
    assert_eq!(parse_header(&header, &mut parsed), Ok(header.len()));
    assert!(parsed.crc32c);
    assert_eq!(parsed.alpn(), Some(b"h2".as_slice()));

    // One flipped byte in the address block breaks the checksum.
    header[16] ^= 0xFF;
    assert_eq!(parse_header(&header, &mut parsed), Err(Error::V2Crc32c));
}

#[test]
fn v2_ssl_composite() {
    let mut info = PpInfo::new();
    info.transport_protocol = TransportProtocol::Stream;
    info.addresses = IPv4::new([10, 0, 0, 1], [10, 0, 0, 2], 34567, 443).into();
    info.ssl_info = SslInfo {
        ssl: true,
        cert_in_connection: true,
        cert_in_session: false,
        cert_verified: true,
    };
    info.add_ssl("TLSv1.3", "TLS_AES_128_GCM_SHA256", "", "", "")
        .unwrap();

    let header = create_header(Version::Two, &info).unwrap();

    let mut parsed = PpInfo::new();
    parse_header(&header, &mut parsed).unwrap();

    assert_eq!(parsed.ssl_info, info.ssl_info);
    assert_eq!(parsed.ssl_version(), Some(b"TLSv1.3".as_slice()));
    assert_eq!(
        parsed.ssl_cipher(),
        Some(b"TLS_AES_128_GCM_SHA256".as_slice())
    );
}

#[test]
fn v2_alignment_padding() {
    let mut info = PpInfo::new();
    info.local = true;
    info.add_alpn(Vec::new()).unwrap();
    info.alignment_power = 5;

    let header = create_header(Version::Two, &info).unwrap();

    // 19 bytes of natural size, padded to 32 with a NoOp TLV of 10 bytes.
    assert_eq!(header.len(), 32);
    assert_eq!(header[19], 0x04);
    assert_eq!(&header[20..22], &[0, 10]);

    let mut parsed = PpInfo::new();
    assert_eq!(parse_header(&header, &mut parsed), Ok(32));
}

#[test]
fn v2_unique_id_boundaries() {
    let mut info = PpInfo::new();
    info.local = true;
    info.add_unique_id(vec![0x42; 128]).unwrap();

    let header = create_header(Version::Two, &info).unwrap();

    let mut parsed = PpInfo::new();
    parse_header(&header, &mut parsed).unwrap();
    assert_eq!(parsed.unique_id().map(<[u8]>::len), Some(128));

    assert_eq!(
        info.add_unique_id(vec![0x42; 129]),
        Err(Error::V2UniqueIdLength(129))
    );
}

#[test]
fn v1_round_trip_through_the_text_codec() {
    let mut info = PpInfo::new();
    info.transport_protocol = TransportProtocol::Stream;
    info.addresses = IPv4::new([203, 0, 113, 7], [198, 51, 100, 1], 49152, 8080).into();

    let header = create_header(Version::One, &info).unwrap();

    let mut parsed = PpInfo::new();
    let consumed = parse_header(&header, &mut parsed).unwrap();

    assert_eq!(consumed, header.len());
    assert_eq!(parsed.addresses, info.addresses);
    assert_eq!(parsed.transport_protocol, TransportProtocol::Stream);
}
