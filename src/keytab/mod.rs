mod kt_file;

use crate::asn1::constants::EncryptionType;
use crate::error::KrbError;
use crate::proto::{KeyResolver, PrincipalName, ServiceKey};
use std::env;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeytabEntry {
    pub principal: PrincipalName,
    pub realm: String,
    pub key: ServiceKey,
    pub timestamp: u32,
}

pub type Keytab = Vec<KeytabEntry>;

fn parse_keytab_name(kt_name: Option<&str>) -> String {
    match kt_name {
        Some(c) => c.to_string(),
        None => match env::var("DEFKTNAME") {
            Ok(val) => val,
            _ => "FILE:/etc/krb5.keytab".to_string(),
        },
    }
}

/// Keytab names without a type prefix are paths.
fn keytab_path(kt_name: &str) -> Result<&str, KrbError> {
    match kt_name.split_once(':') {
        Some(("FILE", path)) => Ok(path),
        Some(_) => Err(KrbError::UnsupportedKeytabType),
        None => Ok(kt_name),
    }
}

pub fn store(kt_name: Option<&str>, kt: &Keytab) -> Result<(), KrbError> {
    let kt_name = parse_keytab_name(kt_name);
    kt_file::store(keytab_path(&kt_name)?, kt)
}

pub fn load(kt_name: Option<&str>) -> Result<Keytab, KrbError> {
    let kt_name = parse_keytab_name(kt_name);
    kt_file::load(keytab_path(&kt_name)?)
}

impl KeyResolver for Keytab {
    /// An exact kvno match is preferred. Without one, or when the ticket
    /// carries no kvno or the "unknown" kvno 0, the newest version of the key
    /// is used.
    fn resolve(
        &self,
        service: &PrincipalName,
        realm: &str,
        kvno: Option<u32>,
        etype: EncryptionType,
    ) -> Option<ServiceKey> {
        let candidates = || {
            self.iter().filter(|entry| {
                entry.principal == *service && entry.realm == realm && entry.key.etype() == etype
            })
        };

        let exact = match kvno {
            Some(kvno) if kvno != 0 => candidates().find(|entry| entry.key.kvno() == kvno),
            _ => None,
        };

        let found = exact.or_else(|| {
            let newest = candidates().max_by_key(|entry| entry.key.kvno());
            if let Some(entry) = newest {
                debug!(
                    requested = ?kvno,
                    kvno = entry.key.kvno(),
                    "no exact kvno match, using newest key"
                );
            }
            newest
        });

        trace!(%service, realm, ?kvno, ?etype, found = found.is_some());
        found.map(|entry| entry.key.clone())
    }
}
