use super::authorization_data::AuthorizationData;
use super::encryption_key::EncryptionKey;
use super::host_address::HostAddresses;
use super::kerberos_time::KerberosTime;
use super::principal_name::PrincipalName;
use super::realm::Realm;
use super::ticket_flags::TicketFlags;
use super::transited_encoding::TransitedEncoding;
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// EncTicketPart   ::= [APPLICATION 3] SEQUENCE {
///         flags                   [0] TicketFlags,
///         key                     [1] EncryptionKey,
///         crealm                  [2] Realm,
///         cname                   [3] PrincipalName,
///         transited               [4] TransitedEncoding,
///         authtime                [5] KerberosTime,
///         starttime               [6] KerberosTime OPTIONAL,
///         endtime                 [7] KerberosTime,
///         renew-till              [8] KerberosTime OPTIONAL,
///         caddr                   [9] HostAddresses OPTIONAL,
///         authorization-data      [10] AuthorizationData OPTIONAL
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct EncTicketPart {
    #[asn1(context_specific = "0")]
    pub(crate) flags: TicketFlags,
    // The session key the authenticator is encrypted with.
    #[asn1(context_specific = "1")]
    pub(crate) key: EncryptionKey,
    #[asn1(context_specific = "2")]
    pub(crate) crealm: Realm,
    #[asn1(context_specific = "3")]
    pub(crate) cname: PrincipalName,
    #[asn1(context_specific = "4")]
    pub(crate) transited: TransitedEncoding,
    #[asn1(context_specific = "5")]
    pub(crate) auth_time: KerberosTime,
    // If absent, auth_time is used in its place to determine the life of
    // the ticket.
    #[asn1(context_specific = "6", optional = "true")]
    pub(crate) start_time: Option<KerberosTime>,
    #[asn1(context_specific = "7")]
    pub(crate) end_time: KerberosTime,
    #[asn1(context_specific = "8", optional = "true")]
    pub(crate) renew_till: Option<KerberosTime>,
    #[asn1(context_specific = "9", optional = "true")]
    pub(crate) client_addresses: Option<HostAddresses>,
    #[asn1(context_specific = "10", optional = "true")]
    pub(crate) authorization_data: Option<AuthorizationData>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TaggedEncTicketPart(pub(crate) EncTicketPart);

impl FixedTag for TaggedEncTicketPart {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(3),
    };
}

impl<'a> DecodeValue<'a> for TaggedEncTicketPart {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        EncTicketPart::decode(reader).map(Self)
    }
}

impl EncodeValue for TaggedEncTicketPart {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}
