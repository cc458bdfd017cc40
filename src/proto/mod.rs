mod builder;
mod keys;
mod replay;
mod reply;
mod ticket;
mod time;
mod validator;

pub use self::builder::ApReqBuilder;
pub use self::keys::{KeyUsage, ServiceKey, SessionKey};
pub use self::replay::{ReplayCache, ReplayEntry, ReplayStatus};
pub use self::reply::{ApReply, ApReplyPart, ApResponse, ErrorReply};
pub use self::ticket::{ApReq, Authenticator, EncTicketPart, EncryptedData, Ticket};
pub use self::time::TimeCheckError;
pub use self::validator::{
    AcceptedContext, AcceptorSettings, ApReqValidator, KeyResolver, ValidationOutcome,
};

pub use crate::asn1::ap_options::ApFlags;
pub use crate::asn1::constants::{EncryptionType, KrbErrorCode, KrbMessageType, PrincipalNameType};
pub use crate::asn1::ticket_flags::TicketFlags;

#[cfg(test)]
pub(crate) use self::builder::TicketIssuer;

use crate::asn1::{
    kerberos_string::KerberosString, principal_name::PrincipalName as Asn1PrincipalName,
};
use crate::error::KrbError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A principal name within a realm. The name type is carried as a hint only,
/// two names are the same principal when their components are identical.
#[derive(Clone)]
pub struct PrincipalName {
    name_type: i32,
    components: Vec<String>,
}

impl PrincipalName {
    pub fn new(name_type: PrincipalNameType, components: Vec<String>) -> Result<Self, KrbError> {
        Self::from_parts(name_type.into(), components)
    }

    /// Build a name with a type number read from the wire or a keytab, which
    /// may not be one we have a variant for.
    pub(crate) fn from_parts(name_type: i32, components: Vec<String>) -> Result<Self, KrbError> {
        if components.is_empty() || components.iter().any(|c| c.is_empty()) {
            return Err(KrbError::PrincipalNameInvalidComponents);
        }

        Ok(PrincipalName {
            name_type,
            components,
        })
    }

    pub fn principal(name: &str) -> Result<Self, KrbError> {
        Self::new(PrincipalNameType::NtPrincipal, vec![name.to_string()])
    }

    pub fn service(srvname: &str, hostname: &str) -> Result<Self, KrbError> {
        Self::new(
            PrincipalNameType::NtSrvHst,
            vec![srvname.to_string(), hostname.to_string()],
        )
    }

    pub fn name_type(&self) -> i32 {
        self.name_type
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl PartialEq for PrincipalName {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for PrincipalName {}

impl Hash for PrincipalName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl fmt::Debug for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalName")
            .field("name_type", &self.name_type)
            .field("components", &self.components)
            .finish()
    }
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("/"))
    }
}

impl FromStr for PrincipalName {
    type Err = KrbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components: Vec<String> = s.split('/').map(str::to_string).collect();
        let name_type = if components.len() > 1 {
            PrincipalNameType::NtSrvInst
        } else {
            PrincipalNameType::NtPrincipal
        };
        Self::new(name_type, components)
    }
}

impl From<&Asn1PrincipalName> for PrincipalName {
    fn from(princ: &Asn1PrincipalName) -> Self {
        PrincipalName {
            name_type: princ.name_type,
            components: princ
                .name_string
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}

impl TryFrom<&PrincipalName> for Asn1PrincipalName {
    type Error = KrbError;

    fn try_from(princ: &PrincipalName) -> Result<Self, KrbError> {
        let name_string = princ
            .components
            .iter()
            .map(|c| KerberosString::from_str(c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Asn1PrincipalName {
            name_type: princ.name_type,
            name_string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PrincipalName, PrincipalNameType};
    use crate::error::KrbError;
    use std::collections::HashSet;

    #[test]
    fn principal_name_ignores_name_type() {
        let a = PrincipalName::service("HTTP", "www.example.com").expect("Invalid name");
        let b: PrincipalName = "HTTP/www.example.com".parse().expect("Invalid name");

        assert_eq!(a.name_type(), PrincipalNameType::NtSrvHst as i32);
        assert_eq!(b.name_type(), PrincipalNameType::NtSrvInst as i32);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn principal_name_is_order_sensitive() {
        let a: PrincipalName = "host/www".parse().expect("Invalid name");
        let b: PrincipalName = "www/host".parse().expect("Invalid name");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "host/www");
    }

    #[test]
    fn principal_name_rejects_empty_components() {
        assert_eq!(
            "HTTP/".parse::<PrincipalName>(),
            Err(KrbError::PrincipalNameInvalidComponents)
        );
        assert_eq!(
            PrincipalName::new(PrincipalNameType::NtPrincipal, Vec::new()),
            Err(KrbError::PrincipalNameInvalidComponents)
        );
    }
}
