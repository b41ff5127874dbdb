//! Types used by the UDS session correlator.
use crate::can::Frame;
use crate::uds::NegativeResponseCode;

/// Sub function part of a session key. [`SubService::Any`] is the record for responses that do not echo a sub function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubService {
    Id(u8),
    Any,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionKey {
    /// Arbitration ID the request was sent on
    pub id: u32,
    pub service: u8,
    pub sub: SubService,
}

impl SessionKey {
    pub fn new(id: u32, service: u8, sub: SubService) -> Self {
        Self { id, service, sub }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionStatus {
    Pending,
    Answered,
    Errored,
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
    /// Arbitration ID the response was received on
    pub id: u32,
    /// Response payload after the echoed service (and sub function). Empty for negative responses.
    pub data: Vec<u8>,
    pub error: Option<String>,
    pub code: Option<NegativeResponseCode>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionRecord {
    pub status: SessionStatus,
    /// Request bytes, starting with the service identifier
    pub request: Vec<u8>,
    pub response: Option<Response>,
}

impl SessionRecord {
    pub(crate) fn pending(request: &[u8]) -> Self {
        Self {
            status: SessionStatus::Pending,
            request: request.to_vec(),
            response: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }
}

/// Outcome of [`super::UdsCorrelator::classify`], evaluated in declaration order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum Classification {
    Duplicate,
    ResponseWithSubservice,
    ResponseWithoutSubservice,
    NegativeResponse,
    NewRequest,
    Unclassified,
}

/// Effect of handling one message.
#[derive(Debug, Clone, PartialEq)]
pub enum UdsEvent {
    /// A request was recorded. Carries the frames that transmit it.
    Request { key: SessionKey, frames: Vec<Frame> },
    /// A pending record received its response.
    Response { key: SessionKey },
    /// A pending record received a negative response.
    NegativeResponse {
        key: SessionKey,
        code: NegativeResponseCode,
    },
    Duplicate,
    /// Matched a session that is no longer pending.
    Ignored,
    Unclassified,
}
