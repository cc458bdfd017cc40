use super::kerberos_flags::{decode_kerberos_flags, encode_kerberos_flags, kerberos_flags_value_len};
use bitmask_enum::bitmask;
use der::{Decode, EncodeValue, Length, Result, Tagged, Writer};

/// ```text
/// TicketFlags     ::= KerberosFlags
///         -- reserved(0),
///         -- forwardable(1),
///         -- forwarded(2),
///         -- proxiable(3),
///         -- proxy(4),
///         -- may-postdate(5),
///         -- postdated(6),
///         -- invalid(7),
///         -- renewable(8),
///         -- initial(9),
///         -- pre-authent(10),
///         -- hw-authent(11),
///         -- transited-policy-checked(12),
///         -- ok-as-delegate(13)
/// ````
#[bitmask(u32)]
pub enum TicketFlags {
    Reserved = 1 << 0,
    Forwardable = 1 << 1,
    Forwarded = 1 << 2,
    Proxiable = 1 << 3,
    Proxy = 1 << 4,
    MayPostdate = 1 << 5,
    Postdated = 1 << 6,
    // A postdated ticket is issued invalid, and must be validated by the KDC
    // before it can be presented to a service.
    Invalid = 1 << 7,
    Renewable = 1 << 8,
    Initial = 1 << 9,
    PreAuthent = 1 << 10,
    HwAuthent = 1 << 11,
    TransitedPolicyChecked = 1 << 12,
    OkAsDelegate = 1 << 13,
}

impl TicketFlags {
    fn from_raw(val: u32) -> Self {
        let mut tf = TicketFlags::none();
        tf.bits = val;
        tf
    }
}

impl<'a> Decode<'a> for TicketFlags {
    type Error = der::Error;

    fn decode<R: der::Reader<'a>>(decoder: &mut R) -> Result<Self> {
        decode_kerberos_flags(decoder).map(TicketFlags::from_raw)
    }
}

impl Tagged for TicketFlags {
    fn tag(&self) -> der::Tag {
        der::Tag::BitString
    }
}

impl EncodeValue for TicketFlags {
    fn value_len(&self) -> Result<Length> {
        kerberos_flags_value_len(self.bits())
    }

    fn encode_value(&self, encoder: &mut impl Writer) -> Result<()> {
        encode_kerberos_flags(self.bits(), encoder)
    }
}
