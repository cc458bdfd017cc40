use super::keys::{KeyUsage, SessionKey};
use super::ticket::EncryptedData;
use super::validator::AcceptedContext;
use super::PrincipalName;
use crate::asn1::{
    ap_rep::{ApRepInner, EncApRepPart, TaggedApRep, TaggedEncApRepPart},
    constants::{KrbErrorCode, KrbMessageType},
    encryption_key::EncryptionKey as Asn1EncryptionKey,
    kerberos_string::KerberosString,
    kerberos_time::KerberosTime,
    krb_error::{KrbError as Asn1KrbError, TaggedKrbError},
    Ia5String,
};
use crate::constants::KRB5_PVNO;
use crate::error::KrbError;
use der::{Decode, Encode, FixedTag, Tagged};
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{error, trace};

/// A rejection, ready to be sent to the client as a KRB-ERROR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    code: KrbErrorCode,
    service: PrincipalName,
    service_realm: String,
    error_text: Option<String>,
    server_time: SystemTime,
}

impl ErrorReply {
    pub fn new(
        code: KrbErrorCode,
        service: PrincipalName,
        service_realm: String,
        error_text: Option<String>,
        server_time: SystemTime,
    ) -> Self {
        Self {
            code,
            service,
            service_realm,
            error_text,
            server_time,
        }
    }

    pub fn code(&self) -> KrbErrorCode {
        self.code
    }

    pub fn service(&self) -> &PrincipalName {
        &self.service
    }

    pub fn service_realm(&self) -> &str {
        &self.service_realm
    }

    pub fn text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    pub fn server_time(&self) -> SystemTime {
        self.server_time
    }

    pub fn to_der(&self) -> Result<Vec<u8>, KrbError> {
        let (stime, susec) = KerberosTime::from_system_time(self.server_time)?;

        // Text that isn't IA5 is dropped rather than failing the reply.
        let error_text = self
            .error_text
            .as_ref()
            .and_then(|et| Ia5String::new(et).map(KerberosString).ok());

        let krb_error = Asn1KrbError {
            pvno: KRB5_PVNO,
            msg_type: KrbMessageType::KrbError.into(),
            ctime: None,
            cusec: None,
            stime,
            susec,
            error_code: self.code.into(),
            crealm: None,
            cname: None,
            service_realm: KerberosString::from_str(&self.service_realm)?,
            service_name: (&self.service).try_into()?,
            error_text,
            error_data: None,
        };

        TaggedKrbError(krb_error).to_der().map_err(|err| {
            error!(?err, "DerEncodeKrbError");
            KrbError::DerEncodeKrbError
        })
    }

    pub fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let TaggedKrbError(krb_error) = TaggedKrbError::from_der(data).map_err(|err| {
            error!(?err, "DerDecodeKrbError");
            KrbError::DerDecodeKrbError
        })?;

        if krb_error.pvno != KRB5_PVNO {
            return Err(KrbError::InvalidPvno);
        }

        if krb_error.msg_type != u8::from(KrbMessageType::KrbError) {
            return Err(KrbError::InvalidMessageType);
        }

        let code = KrbErrorCode::try_from(krb_error.error_code).map_err(|_| {
            error!(error_code = krb_error.error_code, "unknown error code");
            KrbError::KrbErrorCodeUnknown
        })?;

        let server_time = krb_error.stime.to_system_time_with_micros(krb_error.susec)?;

        Ok(ErrorReply {
            code,
            service: (&krb_error.service_name).into(),
            service_realm: krb_error.service_realm.as_str().to_string(),
            error_text: krb_error.error_text.map(|et| et.as_str().to_string()),
            server_time,
        })
    }
}

/// The decrypted part of an AP-REP, as seen by the client.
#[derive(Debug, Clone)]
pub struct ApReplyPart {
    client_time: SystemTime,
    subkey: Option<SessionKey>,
    sequence_number: Option<u32>,
}

impl ApReplyPart {
    /// Must equal the client time of the authenticator that was sent.
    pub fn client_time(&self) -> SystemTime {
        self.client_time
    }

    pub fn subkey(&self) -> Option<&SessionKey> {
        self.subkey.as_ref()
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }
}

/// Mutual authentication reply. Echoes the authenticator's client time under
/// the ticket session key, proving the service could open the ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApReply {
    enc_part: EncryptedData,
}

impl ApReply {
    /// The reply carries no subkey, so both sides keep using the client's
    /// subkey, or the ticket session key when the client sent none.
    pub fn for_context(context: &AcceptedContext) -> Result<Self, KrbError> {
        Self::build(context, None)
    }

    /// As [ApReply::for_context], proposing `subkey` for the rest of the
    /// session in place of the client's choice.
    pub fn for_context_with_subkey(
        context: &AcceptedContext,
        subkey: &SessionKey,
    ) -> Result<Self, KrbError> {
        Self::build(context, Some(subkey))
    }

    fn build(context: &AcceptedContext, subkey: Option<&SessionKey>) -> Result<Self, KrbError> {
        let (ctime, cusec) = KerberosTime::from_system_time(context.client_time)?;

        let subkey = subkey.map(Asn1EncryptionKey::try_from).transpose()?;

        let enc_ap_rep_part = EncApRepPart {
            ctime,
            cusec,
            subkey,
            seq_number: context.sequence_number,
        };

        let data = TaggedEncApRepPart(enc_ap_rep_part)
            .to_der()
            .map_err(|err| {
                error!(?err, "DerEncodeEncApRepPart");
                KrbError::DerEncodeEncApRepPart
            })?;

        let session_key = &context.session_key;
        let data = session_key.encrypt(&data, KeyUsage::ApRepEncPart)?;

        Ok(ApReply {
            enc_part: EncryptedData {
                etype: session_key.etype().into(),
                kvno: None,
                data,
            },
        })
    }

    pub fn decrypt(&self, session_key: &SessionKey) -> Result<ApReplyPart, KrbError> {
        if self.enc_part.etype != i32::from(session_key.etype()) {
            error!(etype = self.enc_part.etype, "ap-rep etype does not match session key");
            return Err(KrbError::UnsupportedEncryption);
        }

        let data = session_key.decrypt(&self.enc_part.data, KeyUsage::ApRepEncPart)?;

        let TaggedEncApRepPart(part) = TaggedEncApRepPart::from_der(&data).map_err(|err| {
            error!(?err, "DerDecodeEncApRepPart");
            KrbError::DerDecodeEncApRepPart
        })?;

        trace!(?part);

        let subkey = part.subkey.as_ref().map(SessionKey::try_from).transpose()?;

        Ok(ApReplyPart {
            client_time: part.ctime.to_system_time_with_micros(part.cusec)?,
            subkey,
            sequence_number: part.seq_number,
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>, KrbError> {
        let ap_rep = ApRepInner {
            pvno: KRB5_PVNO,
            msg_type: KrbMessageType::KrbApRep.into(),
            enc_part: (&self.enc_part).try_into()?,
        };

        TaggedApRep(ap_rep).to_der().map_err(|err| {
            error!(?err, "DerEncodeApRep");
            KrbError::DerEncodeApRep
        })
    }

    pub fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let TaggedApRep(ap_rep) = TaggedApRep::from_der(data).map_err(|err| {
            error!(?err, "DerDecodeApRep");
            KrbError::DerDecodeApRep
        })?;

        if ap_rep.pvno != KRB5_PVNO {
            return Err(KrbError::InvalidPvno);
        }

        if ap_rep.msg_type != u8::from(KrbMessageType::KrbApRep) {
            return Err(KrbError::InvalidMessageType);
        }

        Ok(ApReply {
            enc_part: ap_rep.enc_part.into(),
        })
    }
}

/// What the service sends back for an AP-REQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApResponse {
    Reply(ApReply),
    Error(ErrorReply),
}

impl ApResponse {
    pub fn to_der(&self) -> Result<Vec<u8>, KrbError> {
        match self {
            ApResponse::Reply(rep) => rep.to_der(),
            ApResponse::Error(err) => err.to_der(),
        }
    }

    pub fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let tag = der::Any::from_der(data)
            .map(|any| any.tag())
            .map_err(|err| {
                error!(?err, "unable to read response tag");
                KrbError::InvalidMessageType
            })?;

        if tag == TaggedApRep::TAG {
            ApReply::from_der(data).map(ApResponse::Reply)
        } else if tag == TaggedKrbError::TAG {
            ErrorReply::from_der(data).map(ApResponse::Error)
        } else {
            error!(?tag, "unexpected response message");
            Err(KrbError::InvalidMessageType)
        }
    }
}

impl From<ErrorReply> for ApResponse {
    fn from(err: ErrorReply) -> Self {
        ApResponse::Error(err)
    }
}

impl From<ApReply> for ApResponse {
    fn from(rep: ApReply) -> Self {
        ApResponse::Reply(rep)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApResponse, ErrorReply};
    use crate::asn1::constants::KrbErrorCode;
    use crate::error::KrbError;
    use crate::proto::PrincipalName;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn error_reply_to_der() {
        let server_time = UNIX_EPOCH + Duration::new(1_718_192_885, 121_958_000);
        let service: PrincipalName = "krbtgt/AFOREST.AD".parse().expect("Invalid name");

        let reply = ErrorReply::new(
            KrbErrorCode::KrbErrResponseTooBig,
            service,
            "AFOREST.AD".to_string(),
            None,
            server_time,
        );

        // Matches what a Windows KDC sent for the same error.
        let expected = hex::decode("7e5a3058a003020105a10302011ea411180f32303234303631323131343830355aa505020301dc66a603020134a90c1b0a41464f524553542e4144aa1f301da003020102a11630141b066b72627467741b0a41464f524553542e4144").expect("Failed to decode sample");

        let der = reply.to_der().expect("Failed to encode");
        assert_eq!(der, expected);

        let ApResponse::Error(decoded) = ApResponse::from_der(&der).expect("Failed to decode")
        else {
            unreachable!();
        };
        assert_eq!(decoded, reply);
    }

    #[test]
    fn error_reply_keeps_text() {
        let reply = ErrorReply::new(
            KrbErrorCode::KrbApErrSkew,
            "host/server.example.com".parse().expect("Invalid name"),
            "EXAMPLE.COM".to_string(),
            Some("clock skew too great".to_string()),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        );

        let der = reply.to_der().expect("Failed to encode");
        let decoded = ErrorReply::from_der(&der).expect("Failed to decode");
        assert_eq!(decoded.code(), KrbErrorCode::KrbApErrSkew);
        assert_eq!(decoded.text(), Some("clock skew too great"));
        assert_eq!(decoded.service_realm(), "EXAMPLE.COM");
    }

    #[test]
    fn ap_response_rejects_unknown_message() {
        // An AP-REQ is not a response.
        assert_eq!(
            ApResponse::from_der(&[0x6e, 0x00]),
            Err(KrbError::InvalidMessageType)
        );
    }
}
