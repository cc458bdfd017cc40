use der::asn1::BitStringRef;
use der::{Decode, EncodeValue, Length, Writer};

/// ```text
/// KerberosFlags   ::= BIT STRING (SIZE (32..MAX))
///                     -- minimum number of bits shall be sent,
///                     -- but no fewer than 32
/// ````
// NOTE: Can't use der::Flagset because it strips all leading zeros and RFC4120
// section 5.2.8 says at least 32 bit must be sent. Bit 0 of the ASN.1 string
// is the most significant bit on the wire, so the u32 is bit reversed.
pub(crate) fn decode_kerberos_flags<'a, R: der::Reader<'a>>(decoder: &mut R) -> der::Result<u32> {
    let bs = BitStringRef::decode(decoder)?;
    let raw = bs.raw_bytes();
    let bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            der::Error::new(
                der::ErrorKind::Incomplete {
                    expected_len: Length::new(4),
                    actual_len: decoder.position(),
                },
                decoder.position(),
            )
        })?;
    Ok(u32::from_be_bytes(bytes).reverse_bits())
}

pub(crate) fn kerberos_flags_value_len(bits: u32) -> der::Result<Length> {
    let buf = bits.reverse_bits().to_be_bytes();
    BitStringRef::from_bytes(&buf)?.value_len()
}

pub(crate) fn encode_kerberos_flags(bits: u32, encoder: &mut impl Writer) -> der::Result<()> {
    let buf = bits.reverse_bits().to_be_bytes();
    BitStringRef::from_bytes(&buf)?.encode_value(encoder)
}
