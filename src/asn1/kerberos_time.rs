use crate::error::KrbError;
use der::asn1::GeneralizedTime;
use der::{DecodeValue, EncodeValue, FixedTag, Tag};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::error;

/// ```text
/// KerberosTime    ::= GeneralizedTime -- with no fractional seconds
/// ````
/// Sub-second precision travels separately as [Microseconds].
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub(crate) struct KerberosTime(GeneralizedTime);

/// ```text
/// Microseconds    ::= INTEGER (0..999999)
/// ````
pub(crate) type Microseconds = u32;

const MICROSECONDS_MAX: Microseconds = 999_999;

impl KerberosTime {
    pub(crate) fn from_unix_duration(d: Duration) -> der::Result<Self> {
        GeneralizedTime::from_unix_duration(Duration::from_secs(d.as_secs())).map(Self)
    }

    /// Split a system time into the whole second KerberosTime and the
    /// microsecond remainder.
    pub(crate) fn from_system_time(t: SystemTime) -> Result<(Self, Microseconds), KrbError> {
        let d = t.duration_since(UNIX_EPOCH).map_err(|_| {
            error!(?t, "time is before the unix epoch");
            KrbError::DoYouHaveATimeMachine
        })?;
        Self::from_unix_duration(d)
            .map(|kt| (kt, d.subsec_micros()))
            .map_err(|err| {
                error!(?err, "time is not representable as a KerberosTime");
                KrbError::DerEncodeKerberosTime
            })
    }

    pub(crate) fn to_system_time(self) -> SystemTime {
        self.0.to_system_time()
    }

    /// Rejoin a KerberosTime with its microsecond companion field.
    pub(crate) fn to_system_time_with_micros(
        self,
        usec: Microseconds,
    ) -> Result<SystemTime, KrbError> {
        if usec > MICROSECONDS_MAX {
            error!(usec, "microseconds out of range");
            return Err(KrbError::InvalidMicroseconds);
        }
        Ok(self.0.to_system_time() + Duration::from_micros(u64::from(usec)))
    }

    pub(crate) fn to_unix_duration(self) -> Duration {
        self.0.to_unix_duration()
    }

    #[cfg(test)]
    pub(crate) fn from_date_time(dt: der::DateTime) -> Self {
        Self(GeneralizedTime::from_date_time(dt))
    }
}

impl FixedTag for KerberosTime {
    const TAG: Tag = Tag::GeneralizedTime;
}

impl<'a> DecodeValue<'a> for KerberosTime {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, header: der::Header) -> der::Result<Self> {
        GeneralizedTime::decode_value(reader, header).map(Self)
    }
}

impl EncodeValue for KerberosTime {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.value_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode_value(encoder)
    }
}
