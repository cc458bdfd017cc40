use super::authorization_data::AuthorizationData;
use super::checksum::Checksum;
use super::encryption_key::EncryptionKey;
use super::kerberos_time::{KerberosTime, Microseconds};
use super::principal_name::PrincipalName;
use super::realm::Realm;
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// Authenticator   ::= [APPLICATION 2] SEQUENCE  {
///         authenticator-vno       [0] INTEGER (5),
///         crealm                  [1] Realm,
///         cname                   [2] PrincipalName,
///         cksum                   [3] Checksum OPTIONAL,
///         cusec                   [4] Microseconds,
///         ctime                   [5] KerberosTime,
///         subkey                  [6] EncryptionKey OPTIONAL,
///         seq-number              [7] UInt32 OPTIONAL,
///         authorization-data      [8] AuthorizationData OPTIONAL
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct Authenticator {
    #[asn1(context_specific = "0")]
    pub(crate) authenticator_vno: u8,
    #[asn1(context_specific = "1")]
    pub(crate) crealm: Realm,
    #[asn1(context_specific = "2")]
    pub(crate) cname: PrincipalName,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) cksum: Option<Checksum>,
    // cusec and ctime together are the client's clock at creation. They are
    // what the replay cache remembers.
    #[asn1(context_specific = "4")]
    pub(crate) cusec: Microseconds,
    #[asn1(context_specific = "5")]
    pub(crate) ctime: KerberosTime,
    // The client's choice of key to protect this session, in preference to
    // the ticket session key.
    #[asn1(context_specific = "6", optional = "true")]
    pub(crate) subkey: Option<EncryptionKey>,
    #[asn1(context_specific = "7", optional = "true")]
    pub(crate) seq_number: Option<u32>,
    #[asn1(context_specific = "8", optional = "true")]
    pub(crate) authorization_data: Option<AuthorizationData>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TaggedAuthenticator(pub(crate) Authenticator);

impl FixedTag for TaggedAuthenticator {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(2),
    };
}

impl<'a> DecodeValue<'a> for TaggedAuthenticator {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        Authenticator::decode(reader).map(Self)
    }
}

impl EncodeValue for TaggedAuthenticator {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}
