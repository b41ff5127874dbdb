//! ISO-TP and UDS reconstruction over a capture.
use std::collections::BTreeMap;

use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::analyze::buffer::CaptureBuffer;
use crate::isotp::{IsoTpAssembler, IsoTpMessage};
use crate::uds::{service_description, SessionStatus, SubService, UdsCorrelator};

/// Sections included in a protocol report.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ProtocolFormat {
    Uds,
    Iso,
    All,
}

/// Reassembles every ISO-TP payload in the capture. Frames of at most one byte abort the payload of their ID, broken sequences are dropped.
pub fn find_iso_tp(buffer: &CaptureBuffer) -> Vec<IsoTpMessage> {
    let mut assembler = IsoTpAssembler::new();
    let mut messages = Vec::new();

    for captured in buffer.iter() {
        let frame = &captured.frame;
        if frame.len() <= 1 {
            assembler.reset(&frame.id);
            continue;
        }

        match assembler.assemble(frame) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => {
                debug!("0x{:x}: dropping ISO-TP sequence: {}", frame.raw_id(), e);
                assembler.reset(&frame.id);
            }
        }
    }

    messages
}

/// Feeds reassembled payloads through a fresh correlator expecting responses `shift` IDs above the requests.
pub fn find_uds(messages: &[IsoTpMessage], shift: u32) -> UdsCorrelator {
    let mut uds = UdsCorrelator::new(shift, None);
    for message in messages {
        if let Err(e) = uds.handle(message) {
            debug!("0x{:x}: not UDS: {}", message.raw_id(), e);
        }
    }
    uds
}

/// Payload as text when every byte is printable ASCII.
fn printable(data: &[u8]) -> Option<String> {
    if !data.is_empty() && data.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        Some(String::from_utf8_lossy(data).into_owned())
    } else {
        None
    }
}

fn with_ascii(data: &[u8]) -> String {
    match printable(data) {
        Some(text) => format!("{} ({})", hex::encode(data), text),
        None => hex::encode(data),
    }
}

fn uds_report(uds: &UdsCorrelator) -> String {
    let mut report = String::from("UDS sessions:\n");

    for (key, record) in uds.sessions() {
        let sub = match key.sub {
            SubService::Id(sub) => Some(sub),
            SubService::Any => None,
        };
        let name = service_description(key.service, sub).unwrap_or("Unknown service");
        let sub_text = sub.map(|s| format!("0x{:02x}", s)).unwrap_or_else(|| "-".to_string());

        match record.status {
            SessionStatus::Answered => {
                report.push_str(&format!(
                    "ID 0x{:x} Service 0x{:02x} Sub {} ({}): Answered\n",
                    key.id, key.service, sub_text, name
                ));
                report.push_str(&format!("\tRequest: {}\n", with_ascii(&record.request)));
                if let Some(response) = &record.response {
                    report.push_str(&format!(
                        "\tResponse (0x{:x}): {}\n",
                        response.id,
                        with_ascii(&response.data)
                    ));
                }
            }
            SessionStatus::Errored => {
                let error = record
                    .response
                    .as_ref()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                report.push_str(&format!(
                    "ID 0x{:x} Service 0x{:02x} Sub {} ({}): Errored, {}\n",
                    key.id, key.service, sub_text, name, error
                ));
            }
            SessionStatus::Pending => {}
        }
    }

    report
}

fn iso_report(messages: &[IsoTpMessage]) -> String {
    let mut by_id: BTreeMap<u32, Vec<&[u8]>> = BTreeMap::new();
    for message in messages {
        let payloads = by_id.entry(message.raw_id()).or_default();
        if !payloads.contains(&message.data.as_slice()) {
            payloads.push(&message.data);
        }
    }

    let mut report = String::from("ISO-TP messages:\n");
    for (id, payloads) in by_id {
        report.push_str(&format!("ID 0x{:x}:\n", id));
        for payload in payloads {
            report.push_str(&format!("\t{}\n", with_ascii(payload)));
        }
    }
    report
}

/// Text report of the ISO-TP payloads and UDS sessions found in the capture.
pub fn report(buffer: &CaptureBuffer, format: ProtocolFormat, shift: u32) -> String {
    let messages = find_iso_tp(buffer);
    match format {
        ProtocolFormat::Iso => iso_report(&messages),
        ProtocolFormat::Uds => uds_report(&find_uds(&messages, shift)),
        ProtocolFormat::All => format!("{}\n{}", iso_report(&messages), uds_report(&find_uds(&messages, shift))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::Frame;
    use crate::isotp::segment;

    fn capture(frames: Vec<Frame>) -> CaptureBuffer {
        frames.into_iter().enumerate().map(|(i, f)| (i as f64 * 0.01, f)).collect()
    }

    #[test]
    fn reassembles_multi_frame() {
        let vin = b"1HGCM82633A004352";
        let mut payload = vec![0x49, 0x02, 0x01];
        payload.extend_from_slice(vin);

        let mut frames = vec![Frame::new(0x7df, &[0x02, 0x09, 0x02])];
        frames.extend(segment(0x7e8, &payload, None).unwrap());
        let messages = find_iso_tp(&capture(frames));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].data, payload);
    }

    #[test]
    fn short_frame_aborts_payload() {
        let mut frames = segment(0x7e8, &[0x11; 20], None).unwrap();
        frames.insert(1, Frame::new(0x7e8, &[0x00]));
        assert!(find_iso_tp(&capture(frames)).is_empty());
    }

    #[test]
    fn uds_answered_and_errored() {
        let frames = vec![
            Frame::new(0x7e0, &[0x02, 0x10, 0x03]),
            Frame::new(0x7e8, &[0x06, 0x50, 0x03, 0x00, 0x32, 0x01, 0xf4]),
            Frame::new(0x7e0, &[0x02, 0x27, 0x01]),
            Frame::new(0x7e8, &[0x03, 0x7f, 0x27, 0x33]),
        ];
        let text = report(&capture(frames), ProtocolFormat::Uds, 8);

        assert!(text.contains("Service 0x10 Sub 0x03 (Extended Diag Session): Answered"));
        assert!(text.contains("Response (0x7e8): 003201f4"));
        assert!(text.contains("Service 0x27 Sub 0x01 (Seed request): Errored"));
    }

    #[test]
    fn format_names() {
        assert_eq!("uds".parse::<ProtocolFormat>().unwrap(), ProtocolFormat::Uds);
        assert_eq!("ALL".parse::<ProtocolFormat>().unwrap(), ProtocolFormat::All);
        assert!("FRAG".parse::<ProtocolFormat>().is_err());
        assert_eq!(ProtocolFormat::Iso.to_string(), "ISO");
    }

    #[test]
    fn ascii_rendering() {
        assert_eq!(with_ascii(b"ECU1"), "45435531 (ECU1)");
        assert_eq!(with_ascii(&[0x00, 0x41]), "0041");
    }
}
