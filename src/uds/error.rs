use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum NegativeResponseCode {
    GeneralReject = 0x10,
    ServiceNotSupported = 0x11,
    SubFunctionNotSupported = 0x12,
    IncorrectMessageLengthOrInvalidFormat = 0x13,
    ResponseTooLong = 0x14,
    BusyRepeatRequest = 0x21,
    ConditionsNotCorrect = 0x22,
    RequestSequenceError = 0x24,
    NoResponseFromSubnetComponent = 0x25,
    FailurePreventsExecutionOfRequestedAction = 0x26,
    RequestOutOfRange = 0x31,
    SecurityAccessDenied = 0x33,
    InvalidKey = 0x35,
    ExeedNumberOfAttempts = 0x36,
    RequiredTimeDelayNotExpired = 0x37,
    UploadDownloadNotAccepted = 0x70,
    TransferDataSuspended = 0x71,
    GeneralProgrammingFailure = 0x72,
    WrongBlockSequenceCounter = 0x73,
    RequestCorrectlyReceivedResponsePending = 0x78,
    SubFunctionNotSupportedInActiveSession = 0x7e,
    ServiceNotSupportedInActiveSession = 0x7f,

    NonStandard(u8),
}

impl From<u8> for NegativeResponseCode {
    fn from(val: u8) -> NegativeResponseCode {
        match val {
            0x10 => NegativeResponseCode::GeneralReject,
            0x11 => NegativeResponseCode::ServiceNotSupported,
            0x12 => NegativeResponseCode::SubFunctionNotSupported,
            0x13 => NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat,
            0x14 => NegativeResponseCode::ResponseTooLong,
            0x21 => NegativeResponseCode::BusyRepeatRequest,
            0x22 => NegativeResponseCode::ConditionsNotCorrect,
            0x24 => NegativeResponseCode::RequestSequenceError,
            0x25 => NegativeResponseCode::NoResponseFromSubnetComponent,
            0x26 => NegativeResponseCode::FailurePreventsExecutionOfRequestedAction,
            0x31 => NegativeResponseCode::RequestOutOfRange,
            0x33 => NegativeResponseCode::SecurityAccessDenied,
            0x35 => NegativeResponseCode::InvalidKey,
            0x36 => NegativeResponseCode::ExeedNumberOfAttempts,
            0x37 => NegativeResponseCode::RequiredTimeDelayNotExpired,
            0x70 => NegativeResponseCode::UploadDownloadNotAccepted,
            0x71 => NegativeResponseCode::TransferDataSuspended,
            0x72 => NegativeResponseCode::GeneralProgrammingFailure,
            0x73 => NegativeResponseCode::WrongBlockSequenceCounter,
            0x78 => NegativeResponseCode::RequestCorrectlyReceivedResponsePending,
            0x7e => NegativeResponseCode::SubFunctionNotSupportedInActiveSession,
            0x7f => NegativeResponseCode::ServiceNotSupportedInActiveSession,
            _ => NegativeResponseCode::NonStandard(val),
        }
    }
}

impl NegativeResponseCode {
    /// Human readable description. Unknown codes outside the reserved range map to `"UNK ERROR"`.
    pub fn description(&self) -> &'static str {
        match self {
            NegativeResponseCode::GeneralReject => "General reject",
            NegativeResponseCode::ServiceNotSupported => "Service not supported",
            NegativeResponseCode::SubFunctionNotSupported => "Subfunction not supported",
            NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat => {
                "Incorrect message length or invalid format"
            }
            NegativeResponseCode::ResponseTooLong => "Response too long",
            NegativeResponseCode::BusyRepeatRequest => "Busy repeat request",
            NegativeResponseCode::ConditionsNotCorrect => "Condition not correct",
            NegativeResponseCode::RequestSequenceError => "Request sequence error",
            NegativeResponseCode::NoResponseFromSubnetComponent => {
                "No response from subnet component"
            }
            NegativeResponseCode::FailurePreventsExecutionOfRequestedAction => {
                "Failure prevents execution of requested action"
            }
            NegativeResponseCode::RequestOutOfRange => "Request out of range",
            NegativeResponseCode::SecurityAccessDenied => "Security access denied",
            NegativeResponseCode::InvalidKey => "Invalid key",
            NegativeResponseCode::ExeedNumberOfAttempts => "Exceeded number of attempts",
            NegativeResponseCode::RequiredTimeDelayNotExpired => "Required time delay not expired",
            NegativeResponseCode::UploadDownloadNotAccepted => "Upload/download not accepted",
            NegativeResponseCode::TransferDataSuspended => "Transfer data suspended",
            NegativeResponseCode::GeneralProgrammingFailure => "General programming failure",
            NegativeResponseCode::WrongBlockSequenceCounter => "Wrong block sequence counter",
            NegativeResponseCode::RequestCorrectlyReceivedResponsePending => {
                "Request correctly received but response is pending"
            }
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => {
                "Subfunction not supported in active session"
            }
            NegativeResponseCode::ServiceNotSupportedInActiveSession => {
                "Service not supported in active session"
            }
            NegativeResponseCode::NonStandard(0x39..=0x4f) => {
                "Reserved by extended data link security document"
            }
            NegativeResponseCode::NonStandard(_) => "UNK ERROR",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    SessionExists(u32),
    SessionNotFound(u32),
    NegativeResponse(NegativeResponseCode),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SessionExists(id) => write!(fmt, "Session already exists: 0x{:x}", id),
            Error::SessionNotFound(id) => write!(fmt, "Session not found: 0x{:x}", id),
            Error::NegativeResponse(e) => write!(fmt, "Negative Response: {:?}", e),
        }
    }
}
impl std::error::Error for Error {}
