use crate::error::KrbError;
use der::asn1::Ia5String;
use der::{DecodeValue, EncodeValue, FixedTag, Tag};
use std::fmt;
use std::str::FromStr;

/// ```text
/// KerberosString  ::= GeneralString (IA5String)
/// ````
/// The GeneralString tag is kept for compatibility while the content is
/// restricted to IA5 characters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct KerberosString(pub(crate) Ia5String);

impl FixedTag for KerberosString {
    const TAG: Tag = Tag::GeneralString;
}

impl<'a> DecodeValue<'a> for KerberosString {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, header: der::Header) -> der::Result<Self> {
        Ia5String::decode_value(reader, header).map(Self)
    }
}

impl EncodeValue for KerberosString {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.value_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode_value(encoder)
    }
}

impl KerberosString {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for KerberosString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KerberosString {
    type Err = KrbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ia5String::new(s)
            .map(KerberosString)
            .map_err(|_| KrbError::DerEncodeKerberosString)
    }
}
