use super::keys::{KeyUsage, ServiceKey, SessionKey};
use super::PrincipalName;
use crate::asn1::{
    ap_options::ApFlags,
    ap_req::{ApReqInner, TaggedApReq},
    authenticator::{Authenticator as Asn1Authenticator, TaggedAuthenticator},
    constants::KrbMessageType,
    enc_ticket_part::{EncTicketPart as Asn1EncTicketPart, TaggedEncTicketPart},
    encrypted_data::EncryptedData as Asn1EncryptedData,
    host_address::{HostAddress, ADDR_TYPE_IPV4, ADDR_TYPE_IPV6},
    kerberos_string::KerberosString,
    tagged_ticket::{TaggedTicket, Ticket as Asn1Ticket},
    ticket_flags::TicketFlags,
    OctetString,
};
use crate::constants::KRB5_PVNO;
use crate::error::KrbError;
use der::{Decode, Encode};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{error, trace};

/// Ciphertext as carried on the wire. The etype is kept as the raw number so
/// that an unsupported type can be reported rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub(crate) etype: i32,
    pub(crate) kvno: Option<u32>,
    pub(crate) data: Vec<u8>,
}

impl EncryptedData {
    pub fn etype(&self) -> i32 {
        self.etype
    }

    pub fn kvno(&self) -> Option<u32> {
        self.kvno
    }
}

impl From<Asn1EncryptedData> for EncryptedData {
    fn from(enc_data: Asn1EncryptedData) -> Self {
        EncryptedData {
            etype: enc_data.etype,
            kvno: enc_data.kvno,
            data: enc_data.cipher.into_bytes().into_vec(),
        }
    }
}

impl TryFrom<&EncryptedData> for Asn1EncryptedData {
    type Error = KrbError;

    fn try_from(enc_data: &EncryptedData) -> Result<Self, KrbError> {
        let cipher =
            OctetString::new(enc_data.data.clone()).map_err(|_| KrbError::DerEncodeOctetString)?;
        Ok(Asn1EncryptedData {
            etype: enc_data.etype,
            kvno: enc_data.kvno,
            cipher,
        })
    }
}

/// A service ticket. Only the envelope is readable, the enc-part can only be
/// opened with the service's long term key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub(crate) tkt_vno: u8,
    pub(crate) realm: String,
    pub(crate) service: PrincipalName,
    pub(crate) enc_part: EncryptedData,
}

impl Ticket {
    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn service(&self) -> &PrincipalName {
        &self.service
    }

    pub fn enc_part(&self) -> &EncryptedData {
        &self.enc_part
    }

    pub fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        TaggedTicket::from_der(data)
            .map_err(|err| {
                error!(?err, "DerDecodeTicket");
                KrbError::DerDecodeTicket
            })
            .map(|TaggedTicket(tkt)| tkt.into())
    }

    pub fn to_der(&self) -> Result<Vec<u8>, KrbError> {
        let tkt: TaggedTicket = self.try_into()?;
        tkt.to_der().map_err(|err| {
            error!(?err, "DerEncodeTicket");
            KrbError::DerEncodeTicket
        })
    }

    pub(crate) fn decrypt_enc_part(&self, key: &ServiceKey) -> Result<Vec<u8>, KrbError> {
        key.decrypt(&self.enc_part.data, KeyUsage::TicketEncPart)
    }
}

impl From<Asn1Ticket> for Ticket {
    fn from(tkt: Asn1Ticket) -> Self {
        Ticket {
            tkt_vno: tkt.tkt_vno,
            realm: tkt.realm.as_str().to_string(),
            service: (&tkt.sname).into(),
            enc_part: tkt.enc_part.into(),
        }
    }
}

impl TryFrom<&Ticket> for TaggedTicket {
    type Error = KrbError;

    fn try_from(tkt: &Ticket) -> Result<Self, KrbError> {
        Ok(TaggedTicket(Asn1Ticket {
            tkt_vno: tkt.tkt_vno,
            realm: KerberosString::from_str(&tkt.realm)?,
            sname: (&tkt.service).try_into()?,
            enc_part: (&tkt.enc_part).try_into()?,
        }))
    }
}

/// An AP-REQ as received from a client. The protocol version and message
/// type are kept so they can be rejected with a protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApReq {
    pub(crate) pvno: u8,
    pub(crate) msg_type: u8,
    pub(crate) ap_options: ApFlags,
    pub(crate) ticket: Ticket,
    pub(crate) authenticator: EncryptedData,
}

impl ApReq {
    pub(crate) fn new(ap_options: ApFlags, ticket: Ticket, authenticator: EncryptedData) -> Self {
        ApReq {
            pvno: KRB5_PVNO,
            msg_type: KrbMessageType::KrbApReq.into(),
            ap_options,
            ticket,
            authenticator,
        }
    }

    pub fn ap_options(&self) -> ApFlags {
        self.ap_options
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let TaggedApReq(inner) = TaggedApReq::from_der(data).map_err(|err| {
            error!(?err, "DerDecodeApReq");
            KrbError::DerDecodeApReq
        })?;

        trace!(pvno = inner.pvno, msg_type = inner.msg_type, "decoded ap-req");

        Ok(ApReq {
            pvno: inner.pvno,
            msg_type: inner.msg_type,
            ap_options: inner.ap_options,
            ticket: inner.ticket.0.into(),
            authenticator: inner.authenticator.into(),
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>, KrbError> {
        let inner = ApReqInner {
            pvno: self.pvno,
            msg_type: self.msg_type,
            ap_options: self.ap_options,
            ticket: (&self.ticket).try_into()?,
            authenticator: (&self.authenticator).try_into()?,
        };

        TaggedApReq(inner).to_der().map_err(|err| {
            error!(?err, "DerEncodeApReq");
            KrbError::DerEncodeApReq
        })
    }
}

/// The decrypted contents of a ticket.
#[derive(Debug, Clone)]
pub struct EncTicketPart {
    pub(crate) flags: TicketFlags,
    pub(crate) session_key: SessionKey,
    pub(crate) client: PrincipalName,
    pub(crate) client_realm: String,
    pub(crate) auth_time: SystemTime,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) end_time: SystemTime,
    pub(crate) renew_until: Option<SystemTime>,
    pub(crate) client_addresses: Option<Vec<IpAddr>>,
}

impl EncTicketPart {
    pub(crate) fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let TaggedEncTicketPart(part) = TaggedEncTicketPart::from_der(data).map_err(|err| {
            error!(?err, "DerDecodeEncTicketPart");
            KrbError::DerDecodeEncTicketPart
        })?;

        Self::try_from(part)
    }

    /// RFC4120 5.3, when starttime is absent the authtime is used.
    pub fn start_time(&self) -> SystemTime {
        self.start_time.unwrap_or(self.auth_time)
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn flags(&self) -> TicketFlags {
        self.flags
    }
}

fn host_address_to_ip(addr: &HostAddress) -> Option<IpAddr> {
    let bytes = addr.address.as_bytes();
    match addr.addr_type {
        ADDR_TYPE_IPV4 => <[u8; 4]>::try_from(bytes)
            .ok()
            .map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        ADDR_TYPE_IPV6 => <[u8; 16]>::try_from(bytes)
            .ok()
            .map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn ip_to_host_address(ip: IpAddr) -> Result<HostAddress, KrbError> {
    let (addr_type, address) = match ip {
        IpAddr::V4(v4) => (ADDR_TYPE_IPV4, v4.octets().to_vec()),
        IpAddr::V6(v6) => (ADDR_TYPE_IPV6, v6.octets().to_vec()),
    };
    let address = OctetString::new(address).map_err(|_| KrbError::DerEncodeOctetString)?;
    Ok(HostAddress { addr_type, address })
}

impl TryFrom<Asn1EncTicketPart> for EncTicketPart {
    type Error = KrbError;

    fn try_from(part: Asn1EncTicketPart) -> Result<Self, KrbError> {
        let session_key = SessionKey::try_from(&part.key)?;

        // Address types we can't represent are kept out, so they never match.
        let client_addresses = part
            .client_addresses
            .map(|addrs| addrs.iter().filter_map(host_address_to_ip).collect());

        Ok(EncTicketPart {
            flags: part.flags,
            session_key,
            client: (&part.cname).into(),
            client_realm: part.crealm.as_str().to_string(),
            auth_time: part.auth_time.to_system_time(),
            start_time: part.start_time.map(|t| t.to_system_time()),
            end_time: part.end_time.to_system_time(),
            renew_until: part.renew_till.map(|t| t.to_system_time()),
            client_addresses,
        })
    }
}

/// The decrypted authenticator, proving possession of the ticket's session
/// key at the client time it carries.
#[derive(Debug, Clone)]
pub struct Authenticator {
    pub(crate) client: PrincipalName,
    pub(crate) client_realm: String,
    pub(crate) client_time: SystemTime,
    pub(crate) checksum: Option<(i32, Vec<u8>)>,
    pub(crate) subkey: Option<SessionKey>,
    pub(crate) sequence_number: Option<u32>,
}

impl Authenticator {
    pub(crate) fn from_der(data: &[u8]) -> Result<Self, KrbError> {
        let TaggedAuthenticator(auth) = TaggedAuthenticator::from_der(data).map_err(|err| {
            error!(?err, "DerDecodeAuthenticator");
            KrbError::DerDecodeAuthenticator
        })?;

        Self::try_from(auth)
    }

    pub fn client_time(&self) -> SystemTime {
        self.client_time
    }
}

impl TryFrom<Asn1Authenticator> for Authenticator {
    type Error = KrbError;

    fn try_from(auth: Asn1Authenticator) -> Result<Self, KrbError> {
        if auth.authenticator_vno != KRB5_PVNO {
            error!(vno = auth.authenticator_vno, "invalid authenticator version");
            return Err(KrbError::InvalidPvno);
        }

        let subkey = auth.subkey.as_ref().map(SessionKey::try_from).transpose()?;

        let client_time = auth.ctime.to_system_time_with_micros(auth.cusec)?;

        Ok(Authenticator {
            client: (&auth.cname).into(),
            client_realm: auth.crealm.as_str().to_string(),
            client_time,
            checksum: auth
                .cksum
                .map(|c| (c.checksum_type, c.checksum.into_bytes().into_vec())),
            subkey,
            sequence_number: auth.seq_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ApReq, Ticket};
    use crate::asn1::constants::EncryptionType;

    const MIT_AP_REQ: &str = "6e82053730820533a003020105a10302010ea20703050000000000a382045a6182045630820452a003020105a10c1b0a41464f524553542e4144a21f301da003020102a11630141b066b72627467741b0a41464f524553542e4144a382041a30820416a003020112a103020102a282040804820404047182f3a44f625897c7818b8cb5196127d569250ae4eae113609572e3aa228ce468402cd83d8297ace99a53859168bae937f739a5c6be86591839f4d361a9d9991ea87d1acc41e16262e12372a528c605957597fd5547da8335fff479d423dee607cb0321cda03774c7371762feb1b54b96809917f3663f9788964a5c32aa2414a1707f13fb444efc0dac0ea440f70ff6a0f6b005e48eb5204a423eda036b079ab217a3c28a1905ca239a784caa59835ce9ce3c68101bd737fad1bd0208afd142267645d5adc5fc2916e6c78b440e9542f248dc9fd19b553b26b7bca5466e9a22f8dcddd7c1a52e186663b948471c48466372cbcf5fbda9865d5171790bc5d94eb7025895dffc06144a1aae5958e979ec45bd9c16033999d847740c79134d0768c3561ee3dba6572f31686ce0d2367d2fb19cc3cfbd8848515666fab5689ac6c71ecb2892f7d6e932d42708b908c991fde2c7ed69d741755cd350e599c25cd52c2e6df1a0786ef0fe4522db3739dfdd7c87f155bd5092312047ea47932210c27e9feaaaeb64e2f2ed9a64fa0286b7497bae02b94b9595bf61819dbaf5159e126e485a7d081262726e400bce1a37d7be868bb9b37a69e813f19cd2baf8ca6783b9193f1568888f50ac3a1633daecc45087add270b79c93f58b25860eda60e986a5fae52af55e37bee4e89609a382dccd9de468e68723c745da355745ab7993f391be333a9174406e1fb73e5f6c43d57dd1dedca470ab468d737dee0c773d228711f72bdd4066d2facfb5e297eb0cbe36a3e666fe0759a21b62b0b382fc5f5b4d0b792721d75ba54f7c80e5746c7c80162ef407ed5c91365e9c7da59b8f232ad59a006b4c6be12a23b0ce3327691c979cb6091aa9c13196de3e513296d3946c72d1ecb5279fe4f8a3fb5b90aa218e95723dcade056df4e2e4a5ea93611577969848980c7895f9410c03c26043cf802d42c5f75fec61539d32a99fb31f440bfff144e70e5b236198c0b9baeb3681e43c883b1efb55d165ed593bc850352f257217377677aa5af13231b900ee8586c4bd4a26c490dde68a192e835c3dcede4e32c4e551c66bed360e49b86c976a689bbf0378259cb081b8b6ff61168ef48b18bf8d5ffca324e729d30e368d986251a3587e6ebeda15ada37bb14e9934fb6bd239c2fba489ef5605f8e9d97f21d8d1b178c4483f10e4f9e5c6b7ff6ddd511b24e5f02d9574025228770fce424c527c639545e30d4a9fe5a8c0b0b2e625e42ba81a37bc73173b4690708db8e086310c2b681e83b27e5acb0e482dec7d58b768a0b335608c11a9427a6e1ea42e293e0780808ba0ea18ca4fa665c92da73de64f2467fb2fa26e97e4d2e9d1a9d701e6ea9cc0fbf6dde52beac846d4afd9228139b486dbd14ee3e430c7b46ab554bec0f8a85c4959535755598f8942d176dd6a0a1b7acd55de57fca481bf3081bca003020112a281b40481b13d920e7f4264b8bf505dbde39eec7434d4feb7d8136ca12538364c2fce983df838d837c9ee3d58b23112fec7243ff0c9609b56709a52f06d4223558b789e082d43024444725be842761dee4fcdc4fda3bfbd3973936b7224e5f92a72736c4a073621abaaebbbf824a28408e08f2e2dfbfb7d157046aa6aeba6045e763ac62c0aaea68ea7bac1dab531bb118303e1e1e49b0eaed8412513aca6a23c74a61e545f8864b492d716459a936066bac831ef3806";

    #[test]
    fn ap_req_domain_round_trip() {
        let blob = hex::decode(MIT_AP_REQ).expect("Failed to decode sample");
        let ap_req = ApReq::from_der(&blob).expect("Failed to parse ap-req");

        let ticket = ap_req.ticket();
        assert_eq!(ticket.realm(), "AFOREST.AD");
        assert_eq!(ticket.service().to_string(), "krbtgt/AFOREST.AD");
        assert_eq!(
            ticket.enc_part().etype(),
            EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32
        );
        assert_eq!(ticket.enc_part().kvno(), Some(2));

        assert_eq!(ap_req.to_der().expect("Failed to encode"), blob);

        let tkt_der = ticket.to_der().expect("Failed to encode ticket");
        let ticket2 = Ticket::from_der(&tkt_der).expect("Failed to decode ticket");
        assert_eq!(ticket, &ticket2);
    }

    #[test]
    fn ap_req_rejects_garbage() {
        assert!(ApReq::from_der(&[0x6e, 0x03, 0x30, 0x01]).is_err());
        assert!(ApReq::from_der(&[]).is_err());
    }
}
