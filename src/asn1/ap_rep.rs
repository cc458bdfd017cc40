use super::encrypted_data::EncryptedData;
use super::encryption_key::EncryptionKey;
use super::kerberos_time::{KerberosTime, Microseconds};
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// AP-REP          ::= [APPLICATION 15] SEQUENCE {
///         pvno            [0] INTEGER (5),
///         msg-type        [1] INTEGER (15),
///         enc-part        [2] EncryptedData -- EncAPRepPart
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct ApRepInner {
    #[asn1(context_specific = "0")]
    pub(crate) pvno: u8,
    #[asn1(context_specific = "1")]
    pub(crate) msg_type: u8,
    // Encrypted with the ticket session key, key usage 12.
    #[asn1(context_specific = "2")]
    pub(crate) enc_part: EncryptedData,
}

/// ```text
/// EncAPRepPart    ::= [APPLICATION 27] SEQUENCE {
///         ctime           [0] KerberosTime,
///         cusec           [1] Microseconds,
///         subkey          [2] EncryptionKey OPTIONAL,
///         seq-number      [3] UInt32 OPTIONAL
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct EncApRepPart {
    // Echoed from the authenticator, proving the server could decrypt it.
    #[asn1(context_specific = "0")]
    pub(crate) ctime: KerberosTime,
    #[asn1(context_specific = "1")]
    pub(crate) cusec: Microseconds,
    #[asn1(context_specific = "2", optional = "true")]
    pub(crate) subkey: Option<EncryptionKey>,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) seq_number: Option<u32>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TaggedApRep(pub(crate) ApRepInner);

impl FixedTag for TaggedApRep {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(15),
    };
}

impl<'a> DecodeValue<'a> for TaggedApRep {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        ApRepInner::decode(reader).map(Self)
    }
}

impl EncodeValue for TaggedApRep {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TaggedEncApRepPart(pub(crate) EncApRepPart);

impl FixedTag for TaggedEncApRepPart {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(27),
    };
}

impl<'a> DecodeValue<'a> for TaggedEncApRepPart {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        EncApRepPart::decode(reader).map(Self)
    }
}

impl EncodeValue for TaggedEncApRepPart {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}
