use der::asn1::OctetString;
use der::Sequence;

/// ```text
/// TransitedEncoding       ::= SEQUENCE {
///         tr-type         [0] Int32 -- must be registered --,
///         contents        [1] OCTET STRING
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct TransitedEncoding {
    #[asn1(context_specific = "0")]
    pub(crate) tr_type: i32,
    #[asn1(context_specific = "1")]
    pub(crate) contents: OctetString,
}
