use crate::asn1::{
    checksum::Checksum as Asn1Checksum, constants::EncryptionType,
    encryption_key::EncryptionKey as Asn1EncryptionKey, OctetString,
};
use crate::constants::{AES_128_KEY_LEN, AES_256_KEY_LEN, RFC_PBKDF2_SHA1_ITER};
use crate::crypto::{
    checksum_hmac_sha1_96, decrypt_aes_cts_hmac_sha1_96, encrypt_aes_cts_hmac_sha1_96,
    string_to_key,
};
use crate::error::KrbError;
use aes::{Aes128, Aes256};
use rand::Rng;
use std::fmt;
use tracing::error;

// RFC3962 section 7.
const CKSUMTYPE_HMAC_SHA1_96_AES128: i32 = 15;
const CKSUMTYPE_HMAC_SHA1_96_AES256: i32 = 16;

/// Key usage numbers from RFC4120 section 7.5.1. The usage is mixed into key
/// derivation, so a ciphertext made for one purpose can't be replayed in the
/// place of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// Ticket enc-part, encrypted with the service key.
    TicketEncPart,
    /// TGS-REQ PA-TGS-REQ authenticator, encrypted with the TGS session key.
    TgsReqAuthenticator,
    /// AP-REQ authenticator checksum.
    ApReqAuthenticatorChecksum,
    /// AP-REQ authenticator, encrypted with the ticket session key.
    ApReqAuthenticator,
    /// AP-REP enc-part, encrypted with the ticket session key.
    ApRepEncPart,
}

impl From<KeyUsage> for u32 {
    fn from(usage: KeyUsage) -> u32 {
        match usage {
            KeyUsage::TicketEncPart => 2,
            KeyUsage::TgsReqAuthenticator => 7,
            KeyUsage::ApReqAuthenticatorChecksum => 10,
            KeyUsage::ApReqAuthenticator => 11,
            KeyUsage::ApRepEncPart => 12,
        }
    }
}

pub(crate) fn supported_etype(etype: i32) -> Result<EncryptionType, KrbError> {
    match EncryptionType::try_from(etype) {
        Ok(etype @ EncryptionType::AES128_CTS_HMAC_SHA1_96)
        | Ok(etype @ EncryptionType::AES256_CTS_HMAC_SHA1_96) => Ok(etype),
        _ => Err(KrbError::UnsupportedEncryption),
    }
}

fn key_array<const N: usize>(key: &[u8]) -> Result<[u8; N], KrbError> {
    key.try_into().map_err(|_| {
        error!(key_len = key.len(), expected = N, "invalid key length");
        KrbError::InvalidEncryptionKey
    })
}

/// A long term key held by the service, as found in a keytab.
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceKey {
    Aes128CtsHmacSha196 { k: [u8; AES_128_KEY_LEN], kvno: u32 },
    Aes256CtsHmacSha196 { k: [u8; AES_256_KEY_LEN], kvno: u32 },
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("ServiceKey");
        match self {
            ServiceKey::Aes128CtsHmacSha196 { kvno, .. } => {
                builder.field("k", &"Aes128").field("kvno", kvno)
            }
            ServiceKey::Aes256CtsHmacSha196 { kvno, .. } => {
                builder.field("k", &"Aes256").field("kvno", kvno)
            }
        }
        .finish()
    }
}

impl ServiceKey {
    pub fn new_aes128_cts_hmac_sha1_96(
        passphrase: &str,
        salt: &str,
        iter_count: Option<u32>,
        kvno: u32,
    ) -> Result<Self, KrbError> {
        let iter_count = iter_count.unwrap_or(RFC_PBKDF2_SHA1_ITER);
        let k = string_to_key::<Aes128>(passphrase.as_bytes(), salt.as_bytes(), iter_count)?;
        Ok(ServiceKey::Aes128CtsHmacSha196 {
            k: key_array(&k)?,
            kvno,
        })
    }

    pub fn new_aes256_cts_hmac_sha1_96(
        passphrase: &str,
        salt: &str,
        iter_count: Option<u32>,
        kvno: u32,
    ) -> Result<Self, KrbError> {
        let iter_count = iter_count.unwrap_or(RFC_PBKDF2_SHA1_ITER);
        let k = string_to_key::<Aes256>(passphrase.as_bytes(), salt.as_bytes(), iter_count)?;
        Ok(ServiceKey::Aes256CtsHmacSha196 {
            k: key_array(&k)?,
            kvno,
        })
    }

    /// Build a key from raw bytes, as stored in a keytab record.
    pub fn from_raw(etype: i32, key: &[u8], kvno: u32) -> Result<Self, KrbError> {
        match supported_etype(etype)? {
            EncryptionType::AES128_CTS_HMAC_SHA1_96 => Ok(ServiceKey::Aes128CtsHmacSha196 {
                k: key_array(key)?,
                kvno,
            }),
            _ => Ok(ServiceKey::Aes256CtsHmacSha196 {
                k: key_array(key)?,
                kvno,
            }),
        }
    }

    pub fn etype(&self) -> EncryptionType {
        match self {
            ServiceKey::Aes128CtsHmacSha196 { .. } => EncryptionType::AES128_CTS_HMAC_SHA1_96,
            ServiceKey::Aes256CtsHmacSha196 { .. } => EncryptionType::AES256_CTS_HMAC_SHA1_96,
        }
    }

    pub fn kvno(&self) -> u32 {
        match self {
            ServiceKey::Aes128CtsHmacSha196 { kvno, .. }
            | ServiceKey::Aes256CtsHmacSha196 { kvno, .. } => *kvno,
        }
    }

    pub(crate) fn k(&self) -> &[u8] {
        match self {
            ServiceKey::Aes128CtsHmacSha196 { k, .. } => k,
            ServiceKey::Aes256CtsHmacSha196 { k, .. } => k,
        }
    }

    pub(crate) fn decrypt(&self, data: &[u8], usage: KeyUsage) -> Result<Vec<u8>, KrbError> {
        match self {
            ServiceKey::Aes128CtsHmacSha196 { k, .. } => {
                decrypt_aes_cts_hmac_sha1_96::<Aes128>(k, data, usage.into())
            }
            ServiceKey::Aes256CtsHmacSha196 { k, .. } => {
                decrypt_aes_cts_hmac_sha1_96::<Aes256>(k, data, usage.into())
            }
        }
    }

    pub(crate) fn encrypt(&self, data: &[u8], usage: KeyUsage) -> Result<Vec<u8>, KrbError> {
        match self {
            ServiceKey::Aes128CtsHmacSha196 { k, .. } => {
                encrypt_aes_cts_hmac_sha1_96::<Aes128>(k, data, usage.into())
            }
            ServiceKey::Aes256CtsHmacSha196 { k, .. } => {
                encrypt_aes_cts_hmac_sha1_96::<Aes256>(k, data, usage.into())
            }
        }
    }
}

/// A short term key shared between the client and the service for the
/// lifetime of a ticket, or negotiated in an authenticator as a sub-key.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionKey {
    Aes128CtsHmacSha196 { k: [u8; AES_128_KEY_LEN] },
    Aes256CtsHmacSha196 { k: [u8; AES_256_KEY_LEN] },
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("SessionKey");
        match self {
            SessionKey::Aes128CtsHmacSha196 { .. } => builder.field("k", &"Aes128"),
            SessionKey::Aes256CtsHmacSha196 { .. } => builder.field("k", &"Aes256"),
        }
        .finish()
    }
}

impl TryFrom<&Asn1EncryptionKey> for SessionKey {
    type Error = KrbError;

    fn try_from(enc_key: &Asn1EncryptionKey) -> Result<SessionKey, KrbError> {
        let key = enc_key.key_value.as_bytes();
        match supported_etype(enc_key.key_type)? {
            EncryptionType::AES128_CTS_HMAC_SHA1_96 => Ok(SessionKey::Aes128CtsHmacSha196 {
                k: key_array(key)?,
            }),
            _ => Ok(SessionKey::Aes256CtsHmacSha196 { k: key_array(key)? }),
        }
    }
}

impl TryFrom<&SessionKey> for Asn1EncryptionKey {
    type Error = KrbError;

    fn try_from(session_key: &SessionKey) -> Result<Asn1EncryptionKey, KrbError> {
        let key_value =
            OctetString::new(session_key.k()).map_err(|_| KrbError::DerEncodeOctetString)?;

        Ok(Asn1EncryptionKey {
            key_type: session_key.etype().into(),
            key_value,
        })
    }
}

impl SessionKey {
    /// Generate a fresh random key of the given type.
    pub fn new(etype: EncryptionType) -> Result<Self, KrbError> {
        let mut rng = rand::rng();
        match etype {
            EncryptionType::AES128_CTS_HMAC_SHA1_96 => {
                let mut k = [0u8; AES_128_KEY_LEN];
                rng.fill(&mut k);
                Ok(SessionKey::Aes128CtsHmacSha196 { k })
            }
            EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
                let mut k = [0u8; AES_256_KEY_LEN];
                rng.fill(&mut k);
                Ok(SessionKey::Aes256CtsHmacSha196 { k })
            }
            _ => Err(KrbError::UnsupportedEncryption),
        }
    }

    pub fn etype(&self) -> EncryptionType {
        match self {
            SessionKey::Aes128CtsHmacSha196 { .. } => EncryptionType::AES128_CTS_HMAC_SHA1_96,
            SessionKey::Aes256CtsHmacSha196 { .. } => EncryptionType::AES256_CTS_HMAC_SHA1_96,
        }
    }

    pub(crate) fn k(&self) -> &[u8] {
        match self {
            SessionKey::Aes128CtsHmacSha196 { k } => k,
            SessionKey::Aes256CtsHmacSha196 { k } => k,
        }
    }

    pub(crate) fn decrypt(&self, data: &[u8], usage: KeyUsage) -> Result<Vec<u8>, KrbError> {
        match self {
            SessionKey::Aes128CtsHmacSha196 { k } => {
                decrypt_aes_cts_hmac_sha1_96::<Aes128>(k, data, usage.into())
            }
            SessionKey::Aes256CtsHmacSha196 { k } => {
                decrypt_aes_cts_hmac_sha1_96::<Aes256>(k, data, usage.into())
            }
        }
    }

    pub(crate) fn encrypt(&self, data: &[u8], usage: KeyUsage) -> Result<Vec<u8>, KrbError> {
        match self {
            SessionKey::Aes128CtsHmacSha196 { k } => {
                encrypt_aes_cts_hmac_sha1_96::<Aes128>(k, data, usage.into())
            }
            SessionKey::Aes256CtsHmacSha196 { k } => {
                encrypt_aes_cts_hmac_sha1_96::<Aes256>(k, data, usage.into())
            }
        }
    }

    pub(crate) fn checksum(&self, data: &[u8], usage: KeyUsage) -> Result<Asn1Checksum, KrbError> {
        let (checksum_type, checksum) = match self {
            SessionKey::Aes128CtsHmacSha196 { k } => (
                CKSUMTYPE_HMAC_SHA1_96_AES128,
                checksum_hmac_sha1_96::<Aes128>(k, data, usage.into())?,
            ),
            SessionKey::Aes256CtsHmacSha196 { k } => (
                CKSUMTYPE_HMAC_SHA1_96_AES256,
                checksum_hmac_sha1_96::<Aes256>(k, data, usage.into())?,
            ),
        };

        let checksum = OctetString::new(checksum).map_err(|_| KrbError::DerEncodeOctetString)?;
        Ok(Asn1Checksum {
            checksum_type,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyUsage, ServiceKey, SessionKey};
    use crate::asn1::constants::EncryptionType;
    use crate::error::KrbError;
    use assert_hex::assert_eq_hex;

    #[test]
    fn service_key_string_to_key() {
        let key = ServiceKey::new_aes128_cts_hmac_sha1_96(
            "password",
            "ATHENA.MIT.EDUraeburn",
            Some(1),
            3,
        )
        .expect("Failed to derive key");

        assert_eq!(key.etype(), EncryptionType::AES128_CTS_HMAC_SHA1_96);
        assert_eq!(key.kvno(), 3);
        assert_eq_hex!(
            key.k(),
            hex::decode("42263c6e89f4fc28b8df68ee09799f15")
                .expect("Failed to decode hex")
                .as_slice()
        );
    }

    #[test]
    fn service_key_debug_is_redacted() {
        let key = ServiceKey::from_raw(17, &[0x41; 16], 2).expect("Invalid key");
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("Aes128"));
        assert!(!dbg.contains("65"));
        assert!(!dbg.contains("0x41"));
    }

    #[test]
    fn service_key_from_raw_checks_etype_and_length() {
        assert_eq!(
            ServiceKey::from_raw(23, &[0; 16], 1),
            Err(KrbError::UnsupportedEncryption)
        );
        assert_eq!(
            ServiceKey::from_raw(18, &[0; 16], 1),
            Err(KrbError::InvalidEncryptionKey)
        );
    }

    #[test]
    fn key_usage_separates_contexts() {
        let key = SessionKey::new(EncryptionType::AES256_CTS_HMAC_SHA1_96)
            .expect("Failed to create key");

        let ct = key
            .encrypt(b"an authenticator", KeyUsage::ApReqAuthenticator)
            .expect("Failed to encrypt");

        let pt = key
            .decrypt(&ct, KeyUsage::ApReqAuthenticator)
            .expect("Failed to decrypt");
        assert_eq!(pt, b"an authenticator");

        assert_eq!(
            key.decrypt(&ct, KeyUsage::TgsReqAuthenticator),
            Err(KrbError::MessageAuthenticationFailed)
        );
    }

    #[test]
    fn session_key_asn1_conversion() {
        let key = SessionKey::new(EncryptionType::AES128_CTS_HMAC_SHA1_96)
            .expect("Failed to create key");
        let enc_key: crate::asn1::encryption_key::EncryptionKey =
            (&key).try_into().expect("Failed to convert");
        assert_eq!(enc_key.key_type, 17);

        let key2 = SessionKey::try_from(&enc_key).expect("Failed to convert");
        assert_eq!(key, key2);

        assert_eq!(
            SessionKey::new(EncryptionType::RC4_HMAC),
            Err(KrbError::UnsupportedEncryption)
        );
    }
}
