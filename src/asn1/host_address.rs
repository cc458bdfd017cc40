use der::asn1::OctetString;
use der::Sequence;

/// ```text
/// HostAddress     ::= SEQUENCE  {
///         addr-type       [0] Int32,
///         address         [1] OCTET STRING
/// }
///
/// HostAddresses   ::= SEQUENCE OF HostAddress
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct HostAddress {
    #[asn1(context_specific = "0")]
    pub(crate) addr_type: i32,
    #[asn1(context_specific = "1")]
    pub(crate) address: OctetString,
}

pub(crate) type HostAddresses = Vec<HostAddress>;

// RFC4120 section 7.5.3
pub(crate) const ADDR_TYPE_IPV4: i32 = 2;
pub(crate) const ADDR_TYPE_IPV6: i32 = 24;
