use super::kerberos_flags::{decode_kerberos_flags, encode_kerberos_flags, kerberos_flags_value_len};
use bitmask_enum::bitmask;
use der::{Decode, EncodeValue, Length, Result, Tagged, Writer};

/// ```text
/// APOptions       ::= KerberosFlags
///         -- reserved(0),
///         -- use-session-key(1),
///         -- mutual-required(2)
/// ````
#[bitmask(u32)]
pub enum ApFlags {
    Reserved = 1 << 0,
    // The ticket is encrypted in the session key from the server's TGT
    // (user to user) rather than the server's long term key.
    UseSessionKey = 1 << 1,
    // The client requires a KRB_AP_REP to authenticate the server.
    MutualRequired = 1 << 2,
}

pub type ApOptions = ApFlags;

impl ApFlags {
    fn from_raw(val: u32) -> Self {
        let mut af = ApFlags::none();
        af.bits = val;
        af
    }
}

impl<'a> Decode<'a> for ApFlags {
    type Error = der::Error;

    fn decode<R: der::Reader<'a>>(decoder: &mut R) -> Result<Self> {
        decode_kerberos_flags(decoder).map(ApFlags::from_raw)
    }
}

impl Tagged for ApFlags {
    fn tag(&self) -> der::Tag {
        der::Tag::BitString
    }
}

impl EncodeValue for ApFlags {
    fn value_len(&self) -> Result<Length> {
        kerberos_flags_value_len(self.bits())
    }

    fn encode_value(&self, encoder: &mut impl Writer) -> Result<()> {
        encode_kerberos_flags(self.bits(), encoder)
    }
}
