use super::keys::{supported_etype, KeyUsage, ServiceKey, SessionKey};
use super::replay::{ReplayCache, ReplayEntry, ReplayStatus};
use super::reply::ErrorReply;
use super::ticket::{ApReq, Authenticator, EncTicketPart};
use super::time::{check_client_time, check_ticket_window, TimeCheckError};
use super::PrincipalName;
use crate::asn1::{
    ap_options::ApFlags,
    constants::{EncryptionType, KrbErrorCode, KrbMessageType},
    ticket_flags::TicketFlags,
};
use crate::constants::{DEFAULT_MAX_CLOCK_SKEW, KRB5_PVNO};
use crate::error::KrbError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, instrument, trace, warn};

/// Find the long term key of a service. A kvno of `None` asks for whichever
/// key the store considers current.
pub trait KeyResolver {
    fn resolve(
        &self,
        service: &PrincipalName,
        realm: &str,
        kvno: Option<u32>,
        etype: EncryptionType,
    ) -> Option<ServiceKey>;
}

#[derive(Debug, Clone)]
pub struct AcceptorSettings {
    pub maximum_clock_skew: Duration,
    /// Reject tickets whose address list doesn't include the peer address.
    /// Tickets without addresses are always accepted.
    pub enforce_client_address: bool,
    /// Key usage of the authenticator, AP-REQ (11) unless validating the
    /// PA-TGS-REQ of a TGS exchange (7).
    pub authenticator_key_usage: KeyUsage,
}

impl Default for AcceptorSettings {
    fn default() -> Self {
        AcceptorSettings {
            maximum_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            enforce_client_address: false,
            authenticator_key_usage: KeyUsage::ApReqAuthenticator,
        }
    }
}

/// Everything learnt about the client from an accepted AP-REQ.
#[derive(Debug, Clone)]
pub struct AcceptedContext {
    pub(crate) client: PrincipalName,
    pub(crate) client_realm: String,
    pub(crate) service: PrincipalName,
    pub(crate) service_realm: String,
    pub(crate) session_key: SessionKey,
    pub(crate) subkey: Option<SessionKey>,
    pub(crate) sequence_number: Option<u32>,
    pub(crate) checksum: Option<(i32, Vec<u8>)>,
    pub(crate) flags: TicketFlags,
    pub(crate) auth_time: SystemTime,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) renew_until: Option<SystemTime>,
    pub(crate) client_time: SystemTime,
    pub(crate) mutual_required: bool,
}

impl AcceptedContext {
    pub fn client(&self) -> &PrincipalName {
        &self.client
    }

    pub fn client_realm(&self) -> &str {
        &self.client_realm
    }

    pub fn service(&self) -> &PrincipalName {
        &self.service
    }

    pub fn service_realm(&self) -> &str {
        &self.service_realm
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn subkey(&self) -> Option<&SessionKey> {
        self.subkey.as_ref()
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    pub fn ticket_flags(&self) -> TicketFlags {
        self.flags
    }

    pub fn auth_time(&self) -> SystemTime {
        self.auth_time
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn renew_until(&self) -> Option<SystemTime> {
        self.renew_until
    }

    pub fn client_time(&self) -> SystemTime {
        self.client_time
    }

    /// The client asked for an AP-REP.
    pub fn mutual_required(&self) -> bool {
        self.mutual_required
    }

    /// Verify the authenticator checksum over application data. The checksum
    /// is keyed with the ticket session key under key usage 10.
    pub fn verify_checksum(&self, data: &[u8]) -> Result<(), KrbError> {
        let Some((checksum_type, checksum)) = &self.checksum else {
            return Err(KrbError::ChecksumMissing);
        };

        let expected = self
            .session_key
            .checksum(data, KeyUsage::ApReqAuthenticatorChecksum)?;

        if expected.checksum_type != *checksum_type
            || expected.checksum.as_bytes() != checksum.as_slice()
        {
            debug!(checksum_type, "authenticator checksum mismatch");
            return Err(KrbError::ChecksumMismatch);
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Accepted(Box<AcceptedContext>),
    Rejected(ErrorReply),
    /// The input was not a well formed protocol message. No reply is owed.
    TransportFailure,
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }
}

/// Validates AP-REQs for a service. Cheap to share between tasks, the only
/// mutable state is the replay cache.
#[derive(Debug, Clone)]
pub struct ApReqValidator {
    settings: AcceptorSettings,
    replay_cache: Arc<ReplayCache>,
}

enum Rejection {
    Code(KrbErrorCode),
    Malformed,
}

impl From<TimeCheckError> for Rejection {
    fn from(err: TimeCheckError) -> Self {
        Rejection::Code(match err {
            TimeCheckError::NotYetValid => KrbErrorCode::KrbApErrTktNyv,
            TimeCheckError::Expired => KrbErrorCode::KrbApErrTktExpired,
            TimeCheckError::Skew => KrbErrorCode::KrbApErrSkew,
        })
    }
}

impl ApReqValidator {
    /// The replay cache is widened to remember authenticators for at least
    /// as long as this validator's clock skew accepts them.
    pub fn new(settings: AcceptorSettings, replay_cache: Arc<ReplayCache>) -> Self {
        replay_cache.cover_clock_skew(settings.maximum_clock_skew);

        ApReqValidator {
            settings,
            replay_cache,
        }
    }

    pub fn settings(&self) -> &AcceptorSettings {
        &self.settings
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay_cache
    }

    /// Validate an AP-REQ against the current time.
    pub fn validate<K: KeyResolver>(
        &self,
        ap_req: &ApReq,
        keys: &K,
        expected_service: Option<(&PrincipalName, &str)>,
        client_address: Option<IpAddr>,
    ) -> ValidationOutcome {
        self.validate_at(
            ap_req,
            keys,
            expected_service,
            client_address,
            SystemTime::now(),
        )
    }

    /// Validate an AP-REQ as at `current_time`. Every time check of this call
    /// is made against the same instant.
    #[instrument(level = "debug", skip_all, fields(service = %ap_req.ticket.service))]
    pub fn validate_at<K: KeyResolver>(
        &self,
        ap_req: &ApReq,
        keys: &K,
        expected_service: Option<(&PrincipalName, &str)>,
        client_address: Option<IpAddr>,
        current_time: SystemTime,
    ) -> ValidationOutcome {
        match self.accept(ap_req, keys, expected_service, client_address, current_time) {
            Ok(context) => {
                info!(client = %context.client, realm = %context.client_realm, "ap-req accepted");
                ValidationOutcome::Accepted(Box::new(context))
            }
            Err(Rejection::Code(code)) => {
                warn!(?code, "ap-req rejected");
                let ticket = &ap_req.ticket;
                ValidationOutcome::Rejected(ErrorReply::new(
                    code,
                    ticket.service.clone(),
                    ticket.realm.clone(),
                    None,
                    current_time,
                ))
            }
            Err(Rejection::Malformed) => {
                error!("ap-req is malformed");
                ValidationOutcome::TransportFailure
            }
        }
    }

    fn accept<K: KeyResolver>(
        &self,
        ap_req: &ApReq,
        keys: &K,
        expected_service: Option<(&PrincipalName, &str)>,
        client_address: Option<IpAddr>,
        current_time: SystemTime,
    ) -> Result<AcceptedContext, Rejection> {
        let ticket = &ap_req.ticket;

        if ap_req.pvno != KRB5_PVNO || ticket.tkt_vno != KRB5_PVNO {
            error!(pvno = ap_req.pvno, tkt_vno = ticket.tkt_vno, "unsupported protocol version");
            return Err(Rejection::Code(KrbErrorCode::KrbApErrBadversion));
        }

        if ap_req.msg_type != u8::from(KrbMessageType::KrbApReq) {
            error!(msg_type = ap_req.msg_type, "not an ap-req");
            return Err(Rejection::Code(KrbErrorCode::KrbApErrMsgType));
        }

        if let Some((service, realm)) = expected_service {
            if ticket.service != *service || ticket.realm != realm {
                error!(
                    ticket_service = %ticket.service,
                    ticket_realm = %ticket.realm,
                    expected_service = %service,
                    expected_realm = %realm,
                    "ticket is not for this service"
                );
                return Err(Rejection::Code(KrbErrorCode::KrbApErrNotUs));
            }
        }

        // Ticket.

        let etype = supported_etype(ticket.enc_part.etype).map_err(|_| {
            error!(etype = ticket.enc_part.etype, "unsupported ticket encryption type");
            Rejection::Code(KrbErrorCode::KdcErrEtypeNosupp)
        })?;

        let service_key = keys
            .resolve(&ticket.service, &ticket.realm, ticket.enc_part.kvno, etype)
            .filter(|key| key.etype() == etype)
            .ok_or_else(|| {
                error!(kvno = ?ticket.enc_part.kvno, ?etype, "no service key for ticket");
                Rejection::Code(KrbErrorCode::KrbApErrNokey)
            })?;

        trace!(?service_key);

        let enc_ticket_part = ticket.decrypt_enc_part(&service_key).map_err(|err| {
            error!(?err, "unable to decrypt ticket");
            Rejection::Code(KrbErrorCode::KrbApErrBadIntegrity)
        })?;

        let enc_ticket_part = EncTicketPart::from_der(&enc_ticket_part).map_err(|err| {
            error!(?err, "unable to read decrypted ticket");
            match err {
                KrbError::UnsupportedEncryption => {
                    Rejection::Code(KrbErrorCode::KdcErrEtypeNosupp)
                }
                _ => Rejection::Malformed,
            }
        })?;

        trace!(?enc_ticket_part);

        // Authenticator.

        let session_key = &enc_ticket_part.session_key;

        if ap_req.authenticator.etype != i32::from(session_key.etype()) {
            error!(
                etype = ap_req.authenticator.etype,
                session_etype = ?session_key.etype(),
                "authenticator etype does not match the session key"
            );
            return Err(Rejection::Code(KrbErrorCode::KrbApErrBadIntegrity));
        }

        let authenticator = session_key
            .decrypt(
                &ap_req.authenticator.data,
                self.settings.authenticator_key_usage,
            )
            .map_err(|err| {
                error!(?err, "unable to decrypt authenticator");
                Rejection::Code(KrbErrorCode::KrbApErrBadIntegrity)
            })?;

        let authenticator = Authenticator::from_der(&authenticator).map_err(|err| {
            error!(?err, "unable to read decrypted authenticator");
            match err {
                KrbError::UnsupportedEncryption => {
                    Rejection::Code(KrbErrorCode::KdcErrEtypeNosupp)
                }
                KrbError::InvalidPvno => Rejection::Code(KrbErrorCode::KrbApErrBadversion),
                _ => Rejection::Malformed,
            }
        })?;

        trace!(?authenticator);

        // Identity.

        if authenticator.client != enc_ticket_part.client
            || authenticator.client_realm != enc_ticket_part.client_realm
        {
            error!(
                authenticator_client = %authenticator.client,
                authenticator_realm = %authenticator.client_realm,
                ticket_client = %enc_ticket_part.client,
                ticket_realm = %enc_ticket_part.client_realm,
                "authenticator client does not match ticket"
            );
            return Err(Rejection::Code(KrbErrorCode::KrbApErrBadmatch));
        }

        if self.settings.enforce_client_address {
            if let Some(addresses) = &enc_ticket_part.client_addresses {
                let listed = client_address.is_some_and(|peer| {
                    let peer = peer.to_canonical();
                    addresses.iter().any(|addr| addr.to_canonical() == peer)
                });

                if !listed {
                    error!(?client_address, ?addresses, "client address not in ticket");
                    return Err(Rejection::Code(KrbErrorCode::KrbApErrBadaddr));
                }
            }
        }

        // Time.

        let start_time = enc_ticket_part.start_time();
        check_ticket_window(
            current_time,
            start_time,
            enc_ticket_part.end_time,
            enc_ticket_part.flags,
        )?;

        check_client_time(
            current_time,
            authenticator.client_time,
            self.settings.maximum_clock_skew,
        )?;

        // Replay. Nothing before this point may touch the cache.

        let replay_entry = ReplayEntry {
            client: authenticator.client.clone(),
            client_realm: authenticator.client_realm.clone(),
            client_time: authenticator.client_time,
            service: ticket.service.clone(),
        };

        if self
            .replay_cache
            .check_and_store(replay_entry, current_time)
            == ReplayStatus::AlreadySeen
        {
            error!(client = %authenticator.client, "authenticator replayed");
            return Err(Rejection::Code(KrbErrorCode::KrbApErrRepeat));
        }

        let EncTicketPart {
            flags,
            session_key,
            client,
            client_realm,
            auth_time,
            start_time: _,
            end_time,
            renew_until,
            client_addresses: _,
        } = enc_ticket_part;

        Ok(AcceptedContext {
            client,
            client_realm,
            service: ticket.service.clone(),
            service_realm: ticket.realm.clone(),
            session_key,
            subkey: authenticator.subkey,
            sequence_number: authenticator.sequence_number,
            checksum: authenticator.checksum,
            flags,
            auth_time,
            start_time,
            end_time,
            renew_until,
            client_time: authenticator.client_time,
            mutual_required: ap_req.ap_options.contains(ApFlags::MutualRequired),
        })
    }
}
