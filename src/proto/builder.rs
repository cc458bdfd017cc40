use super::keys::{KeyUsage, SessionKey};
use super::ticket::{ApReq, EncryptedData, Ticket};
use super::PrincipalName;
use crate::asn1::{
    ap_options::ApFlags,
    authenticator::{Authenticator as Asn1Authenticator, TaggedAuthenticator},
    encryption_key::EncryptionKey as Asn1EncryptionKey,
    kerberos_string::KerberosString,
    kerberos_time::KerberosTime,
};
use crate::constants::KRB5_PVNO;
use crate::error::KrbError;
use der::Encode;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{error, trace};

/// Client side construction of an AP-REQ from a ticket and its session key.
#[derive(Debug)]
pub struct ApReqBuilder {
    ticket: Ticket,
    session_key: SessionKey,
    client: PrincipalName,
    client_realm: String,
    client_time: Option<SystemTime>,
    subkey: Option<SessionKey>,
    sequence_number: Option<u32>,
    checksum_data: Option<Vec<u8>>,
    mutual_required: bool,
    key_usage: KeyUsage,
}

impl ApReqBuilder {
    pub fn new(
        ticket: Ticket,
        session_key: SessionKey,
        client: PrincipalName,
        client_realm: String,
    ) -> Self {
        Self {
            ticket,
            session_key,
            client,
            client_realm,
            client_time: None,
            subkey: None,
            sequence_number: None,
            checksum_data: None,
            mutual_required: false,
            key_usage: KeyUsage::ApReqAuthenticator,
        }
    }

    /// Defaults to the time of [ApReqBuilder::build].
    pub fn client_time(mut self, client_time: SystemTime) -> Self {
        self.client_time = Some(client_time);
        self
    }

    pub fn subkey(mut self, subkey: Option<SessionKey>) -> Self {
        self.subkey = subkey;
        self
    }

    pub fn sequence_number(mut self, sequence_number: Option<u32>) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Bind application data to the authenticator with a keyed checksum.
    pub fn checksum_data(mut self, data: &[u8]) -> Self {
        self.checksum_data = Some(data.to_vec());
        self
    }

    pub fn mutual_required(mut self, mutual_required: bool) -> Self {
        self.mutual_required = mutual_required;
        self
    }

    pub fn key_usage(mut self, key_usage: KeyUsage) -> Self {
        self.key_usage = key_usage;
        self
    }

    pub fn build(self) -> Result<ApReq, KrbError> {
        let ApReqBuilder {
            ticket,
            session_key,
            client,
            client_realm,
            client_time,
            subkey,
            sequence_number,
            checksum_data,
            mutual_required,
            key_usage,
        } = self;

        let client_time = client_time.unwrap_or_else(SystemTime::now);
        let (ctime, cusec) = KerberosTime::from_system_time(client_time)?;

        let cksum = checksum_data
            .map(|data| session_key.checksum(&data, KeyUsage::ApReqAuthenticatorChecksum))
            .transpose()?;

        let subkey = subkey
            .as_ref()
            .map(Asn1EncryptionKey::try_from)
            .transpose()?;

        let authenticator = Asn1Authenticator {
            authenticator_vno: KRB5_PVNO,
            crealm: KerberosString::from_str(&client_realm)?,
            cname: (&client).try_into()?,
            cksum,
            cusec,
            ctime,
            subkey,
            seq_number: sequence_number,
            authorization_data: None,
        };

        trace!(?authenticator);

        let data = TaggedAuthenticator(authenticator).to_der().map_err(|err| {
            error!(?err, "DerEncodeAuthenticator");
            KrbError::DerEncodeAuthenticator
        })?;

        let data = session_key.encrypt(&data, key_usage)?;

        let authenticator = EncryptedData {
            etype: session_key.etype().into(),
            kvno: None,
            data,
        };

        let mut ap_options = ApFlags::none();
        if mutual_required {
            ap_options |= ApFlags::MutualRequired;
        }

        Ok(ApReq::new(ap_options, ticket, authenticator))
    }
}

#[cfg(test)]
pub(crate) use self::issuer::TicketIssuer;

#[cfg(test)]
mod issuer {
    use super::super::keys::{KeyUsage, ServiceKey, SessionKey};
    use super::super::ticket::{ip_to_host_address, EncryptedData, Ticket};
    use super::super::PrincipalName;
    use crate::asn1::{
        enc_ticket_part::{EncTicketPart, TaggedEncTicketPart},
        kerberos_string::KerberosString,
        kerberos_time::KerberosTime,
        ticket_flags::TicketFlags,
        transited_encoding::TransitedEncoding,
        OctetString,
    };
    use crate::constants::KRB5_PVNO;
    use der::Encode;
    use std::net::IpAddr;
    use std::str::FromStr;
    use std::time::{Duration, SystemTime};

    /// Stands in for a KDC, sealing tickets with a service key.
    pub(crate) struct TicketIssuer {
        pub(crate) service: PrincipalName,
        pub(crate) realm: String,
        pub(crate) client: PrincipalName,
        pub(crate) client_realm: String,
        pub(crate) flags: TicketFlags,
        pub(crate) auth_time: SystemTime,
        pub(crate) start_time: Option<SystemTime>,
        pub(crate) end_time: SystemTime,
        pub(crate) client_addresses: Option<Vec<IpAddr>>,
    }

    fn kt(t: SystemTime) -> KerberosTime {
        KerberosTime::from_system_time(t)
            .map(|(kt, _)| kt)
            .expect("Invalid ticket time")
    }

    impl TicketIssuer {
        /// A ticket for alice@EXAMPLE.COM to host/server.example.com, valid
        /// for an hour either side of now.
        pub(crate) fn new(now: SystemTime) -> Self {
            let hour = Duration::from_secs(3600);
            TicketIssuer {
                service: PrincipalName::service("host", "server.example.com")
                    .expect("Invalid service"),
                realm: "EXAMPLE.COM".to_string(),
                client: PrincipalName::principal("alice").expect("Invalid client"),
                client_realm: "EXAMPLE.COM".to_string(),
                flags: TicketFlags::none(),
                auth_time: now - hour,
                start_time: None,
                end_time: now + hour,
                client_addresses: None,
            }
        }

        pub(crate) fn issue(&self, service_key: &ServiceKey) -> (Ticket, SessionKey) {
            let session_key = SessionKey::new(service_key.etype()).expect("Invalid session etype");
            let ticket = self.issue_with_session_key(service_key, &session_key);
            (ticket, session_key)
        }

        pub(crate) fn issue_with_session_key(
            &self,
            service_key: &ServiceKey,
            session_key: &SessionKey,
        ) -> Ticket {
            let client_addresses = self.client_addresses.as_ref().map(|addrs| {
                addrs
                    .iter()
                    .map(|ip| ip_to_host_address(*ip).expect("Invalid address"))
                    .collect()
            });

            let enc_ticket_part = EncTicketPart {
                flags: self.flags,
                key: session_key.try_into().expect("Invalid session key"),
                crealm: KerberosString::from_str(&self.client_realm).expect("Invalid realm"),
                cname: (&self.client).try_into().expect("Invalid client"),
                transited: TransitedEncoding {
                    tr_type: 1,
                    contents: OctetString::new(Vec::new()).expect("Invalid contents"),
                },
                auth_time: kt(self.auth_time),
                start_time: self.start_time.map(kt),
                end_time: kt(self.end_time),
                renew_till: None,
                client_addresses,
                authorization_data: None,
            };

            let data = TaggedEncTicketPart(enc_ticket_part)
                .to_der()
                .expect("Failed to encode ticket");
            let data = service_key
                .encrypt(&data, KeyUsage::TicketEncPart)
                .expect("Failed to encrypt ticket");

            Ticket {
                tkt_vno: KRB5_PVNO,
                realm: self.realm.clone(),
                service: self.service.clone(),
                enc_part: EncryptedData {
                    etype: service_key.etype().into(),
                    kvno: Some(service_key.kvno()),
                    data,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApReqBuilder, TicketIssuer};
    use crate::proto::{ApFlags, ApReq, KeyUsage, ServiceKey};
    use std::time::{Duration, SystemTime};

    #[test]
    fn ap_req_builder_der_round_trip() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let service_key = ServiceKey::from_raw(18, &[7; 32], 3).expect("Invalid key");
        let issuer = TicketIssuer::new(now);
        let (ticket, session_key) = issuer.issue(&service_key);

        let ap_req = ApReqBuilder::new(
            ticket.clone(),
            session_key.clone(),
            issuer.client.clone(),
            issuer.client_realm.clone(),
        )
        .client_time(now)
        .mutual_required(true)
        .build()
        .expect("Failed to build ap-req");

        assert!(ap_req.ap_options().contains(ApFlags::MutualRequired));
        assert_eq!(ap_req.ticket(), &ticket);
        assert_eq!(ap_req.ticket().enc_part().kvno(), Some(3));

        let der = ap_req.to_der().expect("Failed to encode");
        let decoded = ApReq::from_der(&der).expect("Failed to decode");
        assert_eq!(decoded, ap_req);

        // The authenticator opens with the session key under the AP-REQ usage.
        let auth = session_key
            .decrypt(&decoded.authenticator.data, KeyUsage::ApReqAuthenticator)
            .expect("Failed to decrypt authenticator");
        let auth = crate::proto::Authenticator::from_der(&auth).expect("Invalid authenticator");
        assert_eq!(auth.client_time(), now);
        assert_eq!(auth.client, issuer.client);
    }
}
