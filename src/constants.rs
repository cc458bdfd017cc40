use std::time::Duration;

pub(crate) const AES_BLOCK_SIZE: usize = 16;
pub(crate) const AES_128_KEY_LEN: usize = 16;
pub(crate) const AES_256_KEY_LEN: usize = 32;

// HMAC-SHA1 truncated to 96 bits.
pub(crate) const SHA1_HMAC_LEN: usize = 12;
pub(crate) const SHA1_DIGEST_LEN: usize = 20;

pub(crate) const IV_ZERO: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// RFC3962 default iteration count. This is known to be too low, but it's
/// what MIT and Heimdal assume when no s2kparams are present.
pub const RFC_PBKDF2_SHA1_ITER: u32 = 0x1000;

// The well known constant used by DK during string-to-key.
pub(crate) const KERBEROS_CONSTANT: &[u8] = b"kerberos";

pub(crate) const KRB5_PVNO: u8 = 5;

/// The conventional maximum clock skew between a client and a service.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

pub const DEFAULT_IO_MAX_SIZE: usize = 128 * 1024;
