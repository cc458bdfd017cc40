use der::asn1::OctetString;
use der::Sequence;

/// ```text
/// EncryptionKey   ::= SEQUENCE {
///         keytype         [0] Int32 -- actually encryption type --,
///         keyvalue        [1] OCTET STRING
/// }
/// ````
#[derive(Clone, Eq, PartialEq, Sequence)]
pub(crate) struct EncryptionKey {
    #[asn1(context_specific = "0")]
    pub(crate) key_type: i32,
    #[asn1(context_specific = "1")]
    pub(crate) key_value: OctetString,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}
