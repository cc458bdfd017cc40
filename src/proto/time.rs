use crate::asn1::ticket_flags::TicketFlags;
use std::time::{Duration, SystemTime};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCheckError {
    /// The ticket's start time is after now, or the ticket is flagged invalid.
    NotYetValid,
    /// The ticket's end time is at or before now.
    Expired,
    /// The authenticator's client time is too far from now.
    Skew,
}

/// The ticket window is closed-open, `start <= now < end`. A ticket carrying
/// the INVALID flag (postdated and not yet validated by the KDC) is treated
/// as not yet valid.
pub(crate) fn check_ticket_window(
    current_time: SystemTime,
    start_time: SystemTime,
    end_time: SystemTime,
    flags: TicketFlags,
) -> Result<(), TimeCheckError> {
    if flags.contains(TicketFlags::Invalid) {
        warn!("ticket carries the invalid flag");
        return Err(TimeCheckError::NotYetValid);
    }

    if current_time < start_time {
        warn!(?start_time, ?current_time, "ticket not yet valid");
        return Err(TimeCheckError::NotYetValid);
    }

    if current_time >= end_time {
        warn!(?end_time, ?current_time, "ticket expired");
        return Err(TimeCheckError::Expired);
    }

    Ok(())
}

pub(crate) fn check_client_time(
    current_time: SystemTime,
    client_time: SystemTime,
    maximum_clock_skew: Duration,
) -> Result<(), TimeCheckError> {
    if is_within_allowed_skew(current_time, client_time, maximum_clock_skew) {
        Ok(())
    } else {
        warn!(?client_time, ?current_time, ?maximum_clock_skew, "clock skew");
        Err(TimeCheckError::Skew)
    }
}

fn is_within_allowed_skew(
    reference_time: SystemTime,
    requested_time: SystemTime,
    maximum_clock_skew: Duration,
) -> bool {
    let skew = match reference_time.duration_since(requested_time) {
        // The requested time is equal to or earlier than the reference time
        Ok(diff) => diff,
        // The requested time is later than the reference time
        Err(diff) => diff.duration(),
    };
    trace!(?skew);
    skew <= maximum_clock_skew
}

#[cfg(test)]
mod tests {
    use super::{check_client_time, check_ticket_window, TimeCheckError};
    use crate::asn1::ticket_flags::TicketFlags;
    use std::time::{Duration, SystemTime};

    #[test]
    fn ticket_window_is_closed_open() {
        let now = SystemTime::now();
        let hour = Duration::from_secs(3600);
        let flags = TicketFlags::none();

        assert_eq!(check_ticket_window(now, now, now + hour, flags), Ok(()));
        assert_eq!(
            check_ticket_window(now, now - hour, now, flags),
            Err(TimeCheckError::Expired)
        );
        assert_eq!(
            check_ticket_window(now, now + Duration::from_micros(1), now + hour, flags),
            Err(TimeCheckError::NotYetValid)
        );
    }

    #[test]
    fn ticket_window_invalid_flag() {
        let now = SystemTime::now();
        let hour = Duration::from_secs(3600);

        assert_eq!(
            check_ticket_window(now, now - hour, now + hour, TicketFlags::Invalid),
            Err(TimeCheckError::NotYetValid)
        );
    }

    #[test]
    fn client_time_skew_both_directions() {
        let now = SystemTime::now();
        let skew = Duration::from_secs(300);
        let epsilon = Duration::from_micros(1);

        assert_eq!(check_client_time(now, now - skew, skew), Ok(()));
        assert_eq!(check_client_time(now, now + skew, skew), Ok(()));
        assert_eq!(
            check_client_time(now, now - skew - epsilon, skew),
            Err(TimeCheckError::Skew)
        );
        assert_eq!(
            check_client_time(now, now + skew + epsilon, skew),
            Err(TimeCheckError::Skew)
        );
    }
}
