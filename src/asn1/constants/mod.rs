pub mod encryption_types;
pub mod errors;
pub mod message_types;
pub mod princ_name_types;

pub use self::encryption_types::EncryptionType;
pub use self::errors::KrbErrorCode;
pub use self::message_types::KrbMessageType;
pub use self::princ_name_types::PrincipalNameType;
