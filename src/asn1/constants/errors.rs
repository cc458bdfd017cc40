use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Protocol error codes carried in a KRB-ERROR, RFC4120 section 7.5.9. This
/// is the subset an application server can emit or needs to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum KrbErrorCode {
    KdcErrNone = 0,
    KdcErrBadPvno = 3,
    KdcErrEtypeNosupp = 14,
    KdcErrPreauthRequired = 25,
    KrbApErrBadIntegrity = 31,
    KrbApErrTktExpired = 32,
    KrbApErrTktNyv = 33,
    KrbApErrRepeat = 34,
    KrbApErrNotUs = 35,
    KrbApErrBadmatch = 36,
    KrbApErrSkew = 37,
    KrbApErrBadaddr = 38,
    KrbApErrBadversion = 39,
    KrbApErrMsgType = 40,
    KrbApErrModified = 41,
    KrbApErrBadorder = 42,
    KrbApErrBadkeyver = 44,
    KrbApErrNokey = 45,
    KrbApErrMutFail = 46,
    KrbApErrBaddirection = 47,
    KrbApErrMethod = 48,
    KrbApErrBadseq = 49,
    KrbApErrInappCksum = 50,
    KrbErrResponseTooBig = 52,
    KrbErrGeneric = 60,
    KrbErrFieldToolong = 61,
}
