use super::ap_options::ApOptions;
use super::encrypted_data::EncryptedData;
use super::tagged_ticket::TaggedTicket;
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// AP-REQ          ::= [APPLICATION 14] SEQUENCE {
///         pvno            [0] INTEGER (5),
///         msg-type        [1] INTEGER (14),
///         ap-options      [2] APOptions,
///         ticket          [3] Ticket,
///         authenticator   [4] EncryptedData -- Authenticator
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct ApReqInner {
    #[asn1(context_specific = "0")]
    pub(crate) pvno: u8,
    #[asn1(context_specific = "1")]
    pub(crate) msg_type: u8,
    #[asn1(context_specific = "2")]
    pub(crate) ap_options: ApOptions,
    #[asn1(context_specific = "3")]
    pub(crate) ticket: TaggedTicket,
    // Encrypted with the ticket session key, key usage 11.
    #[asn1(context_specific = "4")]
    pub(crate) authenticator: EncryptedData,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TaggedApReq(pub(crate) ApReqInner);

impl FixedTag for TaggedApReq {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(14),
    };
}

impl<'a> DecodeValue<'a> for TaggedApReq {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        ApReqInner::decode(reader).map(Self)
    }
}

impl EncodeValue for TaggedApReq {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}
