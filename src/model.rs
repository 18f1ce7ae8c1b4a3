//! The neutral in-memory representation shared by the text and binary codecs.

use crate::error::Error;
use crate::tlv::{
    AWS_SUBTYPE_VPCE_ID, AZURE_SUBTYPE_PRIVATE_ENDPOINT_LINK_ID, MAXIMUM_UNIQUE_ID_LENGTH,
    MAXIMUM_VALUE_LENGTH, MINIMUM_TLV_LENGTH, Tlv, Type,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::BitOr;

/// The length of a UNIX domain socket path field in a binary header.
pub const UNIX_PATH_LENGTH: usize = 108;

/// Supported versions of the PROXY protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// The text form, terminated by '\r\n'.
    One,
    /// The binary form, prefixed by a 12-byte signature.
    Two,
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            _ => Err(Error::UnsupportedVersion(version)),
        }
    }
}

/// The command of a binary header: whether the addresses describe a proxied
/// client or the proxy itself (e.g. a health check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// The connection was established by the proxy on its own behalf.
    Local = 0x00,
    /// The addresses are those of the original client.
    Proxy = 0x01,
}

impl BitOr<Command> for Version {
    type Output = u8;

    /// Combines a version and a command into the ver_cmd byte of a binary header.
    fn bitor(self, command: Command) -> Self::Output {
        let version = match self {
            Self::One => 0x10,
            Self::Two => 0x20,
        };

        version | command as u8
    }
}

/// The address family of the endpoints, stored in the upper nibble of the
/// family byte of a binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressFamily {
    /// Forwarded for an unknown or unsupported protocol, or a health check.
    #[default]
    Unspecified = 0x00,
    /// IPv4 endpoints.
    IPv4 = 0x10,
    /// IPv6 endpoints.
    IPv6 = 0x20,
    /// UNIX domain socket endpoints.
    Unix = 0x30,
}

impl AddressFamily {
    /// Number of bytes the address block occupies for this family.
    #[must_use]
    pub const fn address_block_length(&self) -> usize {
        match self {
            Self::Unspecified => 0,
            Self::IPv4 => 12,
            Self::IPv6 => 36,
            Self::Unix => 2 * UNIX_PATH_LENGTH,
        }
    }
}

/// The transport protocol of the proxied connection, stored in the lower
/// nibble of the family byte of a binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportProtocol {
    /// Unknown or unsupported transport.
    #[default]
    Unspecified = 0x00,
    /// A stream protocol: TCP.
    Stream = 0x01,
    /// A datagram protocol: UDP.
    Datagram = 0x02,
}

impl BitOr<TransportProtocol> for AddressFamily {
    type Output = u8;

    /// Combines an address family and a transport protocol into the family
    /// byte of a binary header.
    fn bitor(self, protocol: TransportProtocol) -> Self::Output {
        self as u8 | protocol as u8
    }
}

/// The source and destination of a header over IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IPv4 {
    /// The source address of the client.
    pub source_address: Ipv4Addr,
    /// The source port of the client.
    pub source_port: u16,
    /// The destination address the client connected to.
    pub destination_address: Ipv4Addr,
    /// The destination port the client connected to.
    pub destination_port: u16,
}

impl IPv4 {
    /// Creates a new IPv4 endpoint pair.
    pub fn new(
        source_address: impl Into<Ipv4Addr>,
        destination_address: impl Into<Ipv4Addr>,
        source_port: u16,
        destination_port: u16,
    ) -> Self {
        Self {
            source_address: source_address.into(),
            source_port,
            destination_address: destination_address.into(),
            destination_port,
        }
    }
}

/// The source and destination of a header over IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IPv6 {
    /// The source address of the client.
    pub source_address: Ipv6Addr,
    /// The source port of the client.
    pub source_port: u16,
    /// The destination address the client connected to.
    pub destination_address: Ipv6Addr,
    /// The destination port the client connected to.
    pub destination_port: u16,
}

impl IPv6 {
    /// Creates a new IPv6 endpoint pair.
    pub fn new(
        source_address: impl Into<Ipv6Addr>,
        destination_address: impl Into<Ipv6Addr>,
        source_port: u16,
        destination_port: u16,
    ) -> Self {
        Self {
            source_address: source_address.into(),
            source_port,
            destination_address: destination_address.into(),
            destination_port,
        }
    }
}

/// The source and destination socket paths of a header over a UNIX domain
/// socket, carried verbatim and padded with trailing zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unix {
    /// The path of the source socket.
    pub source: [u8; UNIX_PATH_LENGTH],
    /// The path of the destination socket.
    pub destination: [u8; UNIX_PATH_LENGTH],
}

impl Unix {
    /// Creates a new UNIX endpoint pair.
    #[must_use]
    pub const fn new(source: [u8; UNIX_PATH_LENGTH], destination: [u8; UNIX_PATH_LENGTH]) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// The endpoints of the proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Addresses {
    /// No address information is carried.
    #[default]
    Unspecified,
    /// Endpoints over IPv4.
    IPv4(IPv4),
    /// Endpoints over IPv6.
    IPv6(IPv6),
    /// Endpoints over a UNIX domain socket.
    Unix(Unix),
}

impl Addresses {
    /// The address family these endpoints belong to.
    #[must_use]
    pub const fn address_family(&self) -> AddressFamily {
        match self {
            Self::Unspecified => AddressFamily::Unspecified,
            Self::IPv4(..) => AddressFamily::IPv4,
            Self::IPv6(..) => AddressFamily::IPv6,
            Self::Unix(..) => AddressFamily::Unix,
        }
    }

    /// Number of bytes the endpoints occupy in a binary header.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.address_family().address_block_length()
    }

    /// Tests whether the endpoints occupy any bytes in a binary header.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<IPv4> for Addresses {
    fn from(addresses: IPv4) -> Self {
        Self::IPv4(addresses)
    }
}

impl From<IPv6> for Addresses {
    fn from(addresses: IPv6) -> Self {
        Self::IPv6(addresses)
    }
}

impl From<Unix> for Addresses {
    fn from(addresses: Unix) -> Self {
        Self::Unix(addresses)
    }
}

impl From<(SocketAddr, SocketAddr)> for Addresses {
    fn from((source, destination): (SocketAddr, SocketAddr)) -> Self {
        match (source, destination) {
            (SocketAddr::V4(source), SocketAddr::V4(destination)) => IPv4::new(
                *source.ip(),
                *destination.ip(),
                source.port(),
                destination.port(),
            )
            .into(),
            (source, destination) => IPv6::new(
                match source.ip() {
                    std::net::IpAddr::V4(ip) => ip.to_ipv6_mapped(),
                    std::net::IpAddr::V6(ip) => ip,
                },
                match destination.ip() {
                    std::net::IpAddr::V4(ip) => ip.to_ipv6_mapped(),
                    std::net::IpAddr::V6(ip) => ip,
                },
                source.port(),
                destination.port(),
            )
            .into(),
        }
    }
}

/// TLS attributes of the proxied connection, flattened from an SSL TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SslInfo {
    /// The client connected over TLS.
    pub ssl: bool,
    /// The client presented a certificate on this connection.
    pub cert_in_connection: bool,
    /// The client presented a certificate in the TLS session,
    /// possibly on an earlier connection of the session.
    pub cert_in_session: bool,
    /// The certificate chain verified successfully.
    pub cert_verified: bool,
}

impl SslInfo {
    const SSL: u8 = 0x01;
    const CERT_IN_CONNECTION: u8 = 0x02;
    const CERT_IN_SESSION: u8 = 0x04;

    pub(crate) const fn from_client(client: u8, verified: bool) -> Self {
        Self {
            ssl: client & Self::SSL != 0,
            cert_in_connection: client & Self::CERT_IN_CONNECTION != 0,
            cert_in_session: client & Self::CERT_IN_SESSION != 0,
            cert_verified: verified,
        }
    }

    pub(crate) const fn client(&self) -> u8 {
        (self.ssl as u8 * Self::SSL)
            | (self.cert_in_connection as u8 * Self::CERT_IN_CONNECTION)
            | (self.cert_in_session as u8 * Self::CERT_IN_SESSION)
    }
}

/// Everything a PROXY protocol header conveys, decoupled from the wire form.
///
/// A `PpInfo` is filled in by [`parse_header`] or assembled by the caller and
/// handed to [`create_header`]. The TLV sequence is append-only and keeps the
/// order of appearance; sub-TLVs of an SSL record are flattened into the same
/// sequence, directly after their envelope.
///
/// [`parse_header`]: crate::parse_header
/// [`create_header`]: crate::create_header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PpInfo {
    /// Transport protocol of the proxied connection.
    pub transport_protocol: TransportProtocol,
    /// The header describes the proxy itself rather than a proxied client.
    pub local: bool,
    /// Source and destination endpoints.
    pub addresses: Addresses,
    /// TLS attributes, meaningful once an SSL TLV is present.
    pub ssl_info: SslInfo,
    /// Whether the header carries (or should carry) a CRC-32C checksum TLV.
    pub crc32c: bool,
    /// Pad the binary header to a multiple of `1 << alignment_power` bytes;
    /// 0 and 1 disable padding.
    pub alignment_power: u8,
    tlvs: Vec<Tlv>,
}

impl PpInfo {
    /// Creates an empty `PpInfo`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field and drops all stored TLVs.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The stored TLVs in order of appearance.
    #[must_use]
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    pub(crate) fn push_tlv(&mut self, tlv: Tlv) {
        self.tlvs.push(tlv);
    }

    fn add_tlv(&mut self, kind: Type, value: Vec<u8>) -> Result<(), Error> {
        if value.len() > MAXIMUM_VALUE_LENGTH {
            return Err(Error::V2TlvLength(
                kind.into(),
                MINIMUM_TLV_LENGTH + value.len(),
            ));
        }

        self.tlvs.push(Tlv::new(kind, value));

        Ok(())
    }

    fn first_value(&self, kind: Type) -> Option<&[u8]> {
        let kind = u8::from(kind);

        self.tlvs
            .iter()
            .find(|tlv| tlv.kind() == kind)
            .map(Tlv::value)
    }

    fn first_subtyped_value(&self, kind: Type, subtype: u8) -> Option<&[u8]> {
        let kind = u8::from(kind);

        self.tlvs
            .iter()
            .find(|tlv| tlv.kind() == kind && tlv.value().first() == Some(&subtype))
            .and_then(|tlv| tlv.value().get(1..))
    }

    /// Appends an ALPN TLV with the negotiated protocol identifier.
    pub fn add_alpn(&mut self, alpn: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.add_tlv(Type::ALPN, alpn.into())
    }

    /// Appends an authority TLV with the host name the client connected to.
    pub fn add_authority(&mut self, authority: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.add_tlv(Type::Authority, authority.into())
    }

    /// Appends a unique id TLV identifying the connection; at most 128 bytes.
    pub fn add_unique_id(&mut self, unique_id: impl Into<Vec<u8>>) -> Result<(), Error> {
        let unique_id = unique_id.into();

        if unique_id.len() > MAXIMUM_UNIQUE_ID_LENGTH {
            return Err(Error::V2UniqueIdLength(unique_id.len()));
        }

        self.add_tlv(Type::UniqueId, unique_id)
    }

    /// Appends a network namespace TLV.
    pub fn add_netns(&mut self, netns: &str) -> Result<(), Error> {
        self.add_tlv(Type::NetworkNamespace, netns.as_bytes().to_vec())
    }

    /// Appends an AWS TLV carrying a VPC endpoint identifier.
    pub fn add_aws_vpce_id(&mut self, vpce_id: &str) -> Result<(), Error> {
        let mut value = Vec::with_capacity(1 + vpce_id.len());

        value.push(AWS_SUBTYPE_VPCE_ID);
        value.extend_from_slice(vpce_id.as_bytes());

        self.add_tlv(Type::AWS, value)
    }

    /// Appends an Azure TLV carrying a Private Endpoint link identifier.
    pub fn add_azure_linkid(&mut self, link_id: u32) -> Result<(), Error> {
        let mut value = Vec::with_capacity(5);

        value.push(AZURE_SUBTYPE_PRIVATE_ENDPOINT_LINK_ID);
        value.extend_from_slice(&link_id.to_le_bytes());

        self.add_tlv(Type::Azure, value)
    }

    /// Appends an SSL TLV composed from [`SslInfo`] and the given attributes.
    ///
    /// Empty attributes are left out. When the `ssl` flag is set the version
    /// must be non-empty, or the resulting header will be rejected on parse.
    pub fn add_ssl(
        &mut self,
        version: &str,
        cipher: &str,
        sig_alg: &str,
        key_alg: &str,
        common_name: &str,
    ) -> Result<(), Error> {
        let sub_tlvs = [
            (Type::SSLVersion, version),
            (Type::SSLCipher, cipher),
            (Type::SSLSignatureAlgorithm, sig_alg),
            (Type::SSLKeyAlgorithm, key_alg),
            (Type::SSLCommonName, common_name),
        ];

        let mut value = Vec::with_capacity(
            5 + sub_tlvs
                .iter()
                .map(|(_, text)| MINIMUM_TLV_LENGTH + text.len())
                .sum::<usize>(),
        );

        value.push(self.ssl_info.client());

        let verify: u32 = if self.ssl_info.cert_verified { 0 } else { 1 };
        value.extend_from_slice(&verify.to_be_bytes());

        for (kind, text) in sub_tlvs {
            if text.is_empty() {
                continue;
            }

            if text.len() > MAXIMUM_VALUE_LENGTH {
                return Err(Error::V2TlvLength(
                    kind.into(),
                    MINIMUM_TLV_LENGTH + text.len(),
                ));
            }

            value.push(kind.into());
            value.extend_from_slice(&(text.len() as u16).to_be_bytes());
            value.extend_from_slice(text.as_bytes());
        }

        self.add_tlv(Type::SSL, value)
    }

    /// The negotiated ALPN protocol identifier, if any.
    #[must_use]
    pub fn alpn(&self) -> Option<&[u8]> {
        self.first_value(Type::ALPN)
    }

    /// The host name the client connected to, if any.
    #[must_use]
    pub fn authority(&self) -> Option<&[u8]> {
        self.first_value(Type::Authority)
    }

    /// The unique connection identifier, if any.
    #[must_use]
    pub fn unique_id(&self) -> Option<&[u8]> {
        self.first_value(Type::UniqueId)
    }

    /// The network namespace name, if any.
    #[must_use]
    pub fn netns(&self) -> Option<&[u8]> {
        self.first_value(Type::NetworkNamespace)
    }

    /// The TLS version string, if any.
    #[must_use]
    pub fn ssl_version(&self) -> Option<&[u8]> {
        self.first_value(Type::SSLVersion)
    }

    /// The common name of the client certificate, if any.
    #[must_use]
    pub fn ssl_common_name(&self) -> Option<&[u8]> {
        self.first_value(Type::SSLCommonName)
    }

    /// The TLS cipher name, if any.
    #[must_use]
    pub fn ssl_cipher(&self) -> Option<&[u8]> {
        self.first_value(Type::SSLCipher)
    }

    /// The TLS signature algorithm, if any.
    #[must_use]
    pub fn ssl_signature_algorithm(&self) -> Option<&[u8]> {
        self.first_value(Type::SSLSignatureAlgorithm)
    }

    /// The TLS key algorithm, if any.
    #[must_use]
    pub fn ssl_key_algorithm(&self) -> Option<&[u8]> {
        self.first_value(Type::SSLKeyAlgorithm)
    }

    /// The AWS VPC endpoint identifier with the subtype byte stripped, if any.
    #[must_use]
    pub fn aws_vpce_id(&self) -> Option<&[u8]> {
        self.first_subtyped_value(Type::AWS, AWS_SUBTYPE_VPCE_ID)
    }

    /// The Azure Private Endpoint link identifier, if any.
    #[must_use]
    pub fn azure_private_endpoint_linkid(&self) -> Option<u32> {
        self.first_subtyped_value(Type::Azure, AZURE_SUBTYPE_PRIVATE_ENDPOINT_LINK_ID)
            .and_then(|value| value.get(..4))
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_le_bytes)
    }
}
