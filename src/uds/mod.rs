//! Unified Diagnostic Services (UDS) session correlator, follows ISO 14229 request/response pairing.
//!
//! The correlator is fed reassembled ISO-TP payloads captured from the bus. Requests open a session record keyed by arbitration ID, service and sub function, responses arriving on the request ID plus a fixed shift close it again.
//! ## Example
//! ```rust
//! use canfuzz::isotp::IsoTpMessage;
//! use canfuzz::uds::{SessionKey, SessionStatus, SubService, UdsCorrelator};
//!
//! let mut uds = UdsCorrelator::default();
//! uds.handle(&IsoTpMessage::new(0x7e0, &[0x10, 0x03])).unwrap();
//! uds.handle(&IsoTpMessage::new(0x7e8, &[0x50, 0x03, 0x00, 0x32])).unwrap();
//!
//! let record = uds.session(&SessionKey::new(0x7e0, 0x10, SubService::Id(0x03))).unwrap();
//! assert_eq!(record.status, SessionStatus::Answered);
//! ```

mod constants;
mod error;
mod types;

use std::collections::BTreeMap;

use crate::can::Frame;
use crate::isotp::{self, IsoTpMessage};
use crate::Result;
pub use constants::*;
pub use error::{Error, NegativeResponseCode};
pub use types::*;

use tracing::debug;

#[derive(Debug, Default, Clone)]
struct ServiceSessions {
    /// Records with an explicit sub function, in the order the requests were seen
    subservices: Vec<(u8, SessionRecord)>,
    sentinel: Option<SessionRecord>,
}

impl ServiceSessions {
    fn position(&self, sub: u8) -> Option<usize> {
        self.subservices.iter().position(|(s, _)| *s == sub)
    }
}

/// Pairs UDS requests with their responses. Sessions are kept for the lifetime of the correlator.
#[derive(Debug, Clone)]
pub struct UdsCorrelator {
    shift: u32,
    padding: Option<u8>,
    sessions: BTreeMap<u32, BTreeMap<u8, ServiceSessions>>,
}

impl Default for UdsCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_SHIFT, None)
    }
}

impl UdsCorrelator {
    /// Creates a correlator expecting responses on `request_id + shift`. `padding` is used when framing requests.
    pub fn new(shift: u32, padding: Option<u8>) -> Self {
        Self {
            shift,
            padding,
            sessions: BTreeMap::new(),
        }
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn set_shift(&mut self, shift: u32) {
        self.shift = shift;
    }

    pub fn start_session(&mut self, id: u32) -> std::result::Result<(), Error> {
        if self.sessions.contains_key(&id) {
            return Err(Error::SessionExists(id));
        }
        self.sessions.insert(id, BTreeMap::new());
        Ok(())
    }

    pub fn delete_session(&mut self, id: u32) -> std::result::Result<(), Error> {
        match self.sessions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::SessionNotFound(id)),
        }
    }

    pub fn session(&self, key: &SessionKey) -> Option<&SessionRecord> {
        let service = self.service(key.id, key.service)?;
        match key.sub {
            SubService::Id(sub) => service
                .subservices
                .iter()
                .find(|(s, _)| *s == sub)
                .map(|(_, record)| record),
            SubService::Any => service.sentinel.as_ref(),
        }
    }

    /// All records ordered by arbitration ID and service. Within a service explicit sub functions come first, the sentinel last.
    pub fn sessions(&self) -> impl Iterator<Item = (SessionKey, &SessionRecord)> + '_ {
        self.sessions.iter().flat_map(|(&id, services)| {
            services.iter().flat_map(move |(&service, sessions)| {
                let subs = sessions
                    .subservices
                    .iter()
                    .map(move |(sub, record)| (SessionKey::new(id, service, SubService::Id(*sub)), record));
                let sentinel = sessions
                    .sentinel
                    .iter()
                    .map(move |record| (SessionKey::new(id, service, SubService::Any), record));
                subs.chain(sentinel)
            })
        })
    }

    fn service(&self, id: u32, service: u8) -> Option<&ServiceSessions> {
        self.sessions.get(&id)?.get(&service)
    }

    fn service_mut(&mut self, id: u32, service: u8) -> Option<&mut ServiceSessions> {
        self.sessions.get_mut(&id)?.get_mut(&service)
    }

    fn has_sub(&self, id: u32, service: u8, sub: u8) -> bool {
        self.service(id, service)
            .map(|s| s.position(sub).is_some())
            .unwrap_or(false)
    }

    /// Classifies a message against the current sessions. The first matching rule wins.
    pub fn classify(&self, id: u32, data: &[u8]) -> Classification {
        let Some(&d0) = data.first() else {
            return Classification::Unclassified;
        };
        let d1 = data.get(1).copied();
        let response_id = id.checked_sub(self.shift);
        let response_service = d0.checked_sub(POSITIVE_RESPONSE);

        if let Some(d1) = d1 {
            if self.has_sub(id, d0, d1) {
                return Classification::Duplicate;
            }
        }

        if let (Some(rid), Some(rs), Some(d1)) = (response_id, response_service, d1) {
            if self.has_sub(rid, rs, d1) {
                return Classification::ResponseWithSubservice;
            }
        }

        if let (Some(rid), Some(rs)) = (response_id, response_service) {
            if self.service(rid, rs).is_some() {
                return Classification::ResponseWithoutSubservice;
            }
        }

        if data.len() > 2 && d0 == NEGATIVE_RESPONSE {
            if let (Some(rid), Some(d1)) = (response_id, d1) {
                if self.service(rid, d1).is_some() {
                    return Classification::NegativeResponse;
                }
            }
        }

        let new_request = match (self.service(id, d0), d1) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(service), Some(d1)) => service.position(d1).is_none(),
        };
        if new_request {
            Classification::NewRequest
        } else {
            Classification::Unclassified
        }
    }

    /// Classifies a reassembled message and applies its effect on the sessions.
    pub fn handle(&mut self, message: &IsoTpMessage) -> Result<UdsEvent> {
        let id = message.raw_id();
        let data = &message.data;
        let classification = self.classify(id, data);
        debug!("UDS 0x{:x} {} {}", id, hex::encode(data), classification);

        match classification {
            Classification::Duplicate => Ok(UdsEvent::Duplicate),
            Classification::Unclassified => Ok(UdsEvent::Unclassified),
            Classification::NewRequest => self.add_raw_request(id, data),
            Classification::ResponseWithSubservice => Ok(self.add_response(id, data)),
            Classification::ResponseWithoutSubservice => Ok(self.add_response_without_sub(id, data)),
            Classification::NegativeResponse => Ok(self.add_negative_response(id, data)),
        }
    }

    /// Builds the frames for a request without recording a session.
    pub fn request(&self, id: u32, service: u8, sub: Option<u8>, data: &[u8]) -> Result<Vec<Frame>> {
        let mut request = vec![service];
        if let Some(sub) = sub {
            request.push(sub);
        }
        request.extend(data);

        Ok(isotp::segment(id, &request, self.padding)?)
    }

    fn add_raw_request(&mut self, id: u32, data: &[u8]) -> Result<UdsEvent> {
        let service = data[0];
        let sessions = self.sessions.entry(id).or_default().entry(service).or_default();

        let sub = match data.get(1) {
            Some(&sub) => {
                sessions.subservices.push((sub, SessionRecord::pending(data)));
                if sessions.sentinel.is_none() {
                    sessions.sentinel = Some(SessionRecord::pending(data));
                }
                SubService::Id(sub)
            }
            None => {
                sessions.sentinel = Some(SessionRecord::pending(data));
                SubService::Any
            }
        };

        let key = SessionKey::new(id, service, sub);
        debug!("UDS new request {:?}", key);

        let frames = isotp::segment(id, data, self.padding)?;
        Ok(UdsEvent::Request { key, frames })
    }

    fn add_response(&mut self, id: u32, data: &[u8]) -> UdsEvent {
        let (Some(rid), Some(service)) = (id.checked_sub(self.shift), data[0].checked_sub(POSITIVE_RESPONSE)) else {
            return UdsEvent::Ignored;
        };
        let sub = data[1];

        let Some(sessions) = self.service_mut(rid, service) else {
            return UdsEvent::Ignored;
        };
        let Some(pos) = sessions.position(sub) else {
            return UdsEvent::Ignored;
        };

        let record = &mut sessions.subservices[pos].1;
        if !record.is_pending() {
            return UdsEvent::Ignored;
        }
        record.status = SessionStatus::Answered;
        record.response = Some(Response {
            id,
            data: data[2..].to_vec(),
            error: None,
            code: None,
        });

        if let Some(sentinel) = sessions.sentinel.as_mut() {
            sentinel.status = SessionStatus::Answered;
        }

        UdsEvent::Response {
            key: SessionKey::new(rid, service, SubService::Id(sub)),
        }
    }

    fn add_response_without_sub(&mut self, id: u32, data: &[u8]) -> UdsEvent {
        let (Some(rid), Some(service)) = (id.checked_sub(self.shift), data[0].checked_sub(POSITIVE_RESPONSE)) else {
            return UdsEvent::Ignored;
        };

        let sentinel = self
            .service_mut(rid, service)
            .and_then(|s| s.sentinel.as_mut())
            .filter(|s| s.is_pending());
        let Some(sentinel) = sentinel else {
            return UdsEvent::Ignored;
        };

        sentinel.status = SessionStatus::Answered;
        sentinel.response = Some(Response {
            id,
            data: data[1..].to_vec(),
            error: None,
            code: None,
        });

        UdsEvent::Response {
            key: SessionKey::new(rid, service, SubService::Any),
        }
    }

    fn add_negative_response(&mut self, id: u32, data: &[u8]) -> UdsEvent {
        let Some(rid) = id.checked_sub(self.shift) else {
            return UdsEvent::Ignored;
        };
        let service = data[1];
        let code = NegativeResponseCode::from(data[2]);

        let Some(sessions) = self.service_mut(rid, service) else {
            return UdsEvent::Ignored;
        };

        let response = Response {
            id,
            data: vec![],
            error: Some(code.description().to_string()),
            code: Some(code),
        };

        if let Some(pos) = sessions.subservices.iter().position(|(_, r)| r.is_pending()) {
            let (sub, record) = &mut sessions.subservices[pos];
            let key = SessionKey::new(rid, service, SubService::Id(*sub));
            record.status = SessionStatus::Errored;
            record.response = Some(response.clone());

            if let Some(sentinel) = sessions.sentinel.as_mut() {
                sentinel.status = SessionStatus::Errored;
                sentinel.response = Some(response);
            }
            return UdsEvent::NegativeResponse { key, code };
        }

        match sessions.sentinel.as_mut().filter(|s| s.is_pending()) {
            Some(sentinel) => {
                sentinel.status = SessionStatus::Errored;
                sentinel.response = Some(response);
                UdsEvent::NegativeResponse {
                    key: SessionKey::new(rid, service, SubService::Any),
                    code,
                }
            }
            None => UdsEvent::Ignored,
        }
    }
}
