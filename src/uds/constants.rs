//! Constants for the UDS correlator.
use strum_macros::FromRepr;

pub static POSITIVE_RESPONSE: u8 = 0x40;
pub static NEGATIVE_RESPONSE: u8 = 0x7f;

/// Default arbitration ID offset between a request and its response.
pub const DEFAULT_SHIFT: u32 = 8;

/// Service Identifiers (SIDs) as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone, FromRepr)]
#[repr(u8)]
pub enum ServiceIdentifier {
    // Diagnostic and Communication Management
    DiagnosticSessionControl = 0x10,
    EcuReset = 0x11,
    SecurityAccess = 0x27,
    CommunicationControl = 0x28,
    TesterPresent = 0x3e,
    AccessTimingParameter = 0x83,
    SecuredDataTransmission = 0x84,
    ControlDTCSetting = 0x85,
    ResponseOnEvent = 0x86,
    LinkControl = 0x87,

    // Data Transmission
    ReadDataByIdentifier = 0x22,
    ReadMemoryByAddress = 0x23,
    ReadScalingDataByIdentifier = 0x24,
    ReadDataByPeriodicIdentifier = 0x2a,
    DynamicallyDefineDataIdentifier = 0x2c,
    WriteDataByIdentifier = 0x2e,
    WriteMemoryByAddress = 0x3d,

    // Stored Data Transmission
    ClearDiagnosticInformation = 0x14,
    ReadDTCInformation = 0x19,

    // Input/Output Control
    InputOutputControlByIdentifier = 0x2f,

    // Routine
    RoutineControl = 0x31,

    // Upload/Download
    RequestDownload = 0x34,
    RequestUpload = 0x35,
    TransferData = 0x36,
    RequestTransferExit = 0x37,
    RequestFileTransfer = 0x38,

    NegativeResponse = 0x7f,
}

impl ServiceIdentifier {
    pub fn description(&self) -> &'static str {
        match self {
            ServiceIdentifier::DiagnosticSessionControl => "Diagnostic Session Control",
            ServiceIdentifier::EcuReset => "Reset",
            ServiceIdentifier::SecurityAccess => "Security Access",
            ServiceIdentifier::CommunicationControl => "Communication Control",
            ServiceIdentifier::TesterPresent => "Tester",
            ServiceIdentifier::AccessTimingParameter => "Access Timing Parameters",
            ServiceIdentifier::SecuredDataTransmission => "Secured Data Transmission",
            ServiceIdentifier::ControlDTCSetting => "Control DTC Settings",
            ServiceIdentifier::ResponseOnEvent => "Response On Event",
            ServiceIdentifier::LinkControl => "Link Control",
            ServiceIdentifier::ReadDataByIdentifier => "Read Data By Identifier",
            ServiceIdentifier::ReadMemoryByAddress => "Read Memory By Address",
            ServiceIdentifier::ReadScalingDataByIdentifier => "Read Scaling Data By Identifier",
            ServiceIdentifier::ReadDataByPeriodicIdentifier => "Read Data By Identifier Periodic",
            ServiceIdentifier::DynamicallyDefineDataIdentifier => {
                "Dynamically Define Data Identifier"
            }
            ServiceIdentifier::WriteDataByIdentifier => "Write Data By Identifier",
            ServiceIdentifier::WriteMemoryByAddress => "Write Memory By Address",
            ServiceIdentifier::ClearDiagnosticInformation => "Clear Diagnostic Information",
            ServiceIdentifier::ReadDTCInformation => "Read DTC Information",
            ServiceIdentifier::InputOutputControlByIdentifier => {
                "Input Output Control By Identifier"
            }
            ServiceIdentifier::RoutineControl => "Routine Control",
            ServiceIdentifier::RequestDownload => "Request Download",
            ServiceIdentifier::RequestUpload => "Request Upload",
            ServiceIdentifier::TransferData => "Transfer Data",
            ServiceIdentifier::RequestTransferExit => "Request Transfer Exit",
            ServiceIdentifier::RequestFileTransfer => "Request File Transfer",
            ServiceIdentifier::NegativeResponse => "Negative Response",
        }
    }
}

/// Describes a service, or a sub function of it when known. Also covers the OBD-II modes that share the diagnostic IDs.
pub fn service_description(service: u8, sub: Option<u8>) -> Option<&'static str> {
    let sub_name = match (service, sub) {
        (0x01, Some(0x0d)) => Some("Req Current Powertrain"),
        (0x09, Some(0x02)) => Some("Req Vehicle info (VIN)"),
        (0x09, Some(0x04)) => Some("Req ID"),
        (0x09, Some(0x06)) => Some("Calibration Verification Numbers"),
        (0x09, Some(0x0a)) => Some("ECU name"),
        (0x09, Some(0x0d)) => Some("Vehicle info"),
        (0x10, Some(0x01)) => Some("Enter diag session"),
        (0x10, Some(0x03)) => Some("Extended Diag Session"),
        (0x11, Some(0x01)) => Some("ECU HARD Reset"),
        (0x11, Some(0x02)) => Some("ECU Reset"),
        (0x11, Some(0x03)) => Some("Soft reset"),
        (0x19, Some(0x01)) => Some("Report num of DTC by status"),
        (0x19, Some(0x02)) => Some("Report DTC by status"),
        (0x19, Some(0x03)) => Some("Report DTC Snapshot ID"),
        (0x27, Some(0x01)) => Some("Seed request"),
        (0x27, Some(0x02)) => Some("Send Key"),
        (0x3e, Some(0x01)) => Some("Tester present"),
        _ => None,
    };
    if sub_name.is_some() {
        return sub_name;
    }

    match service {
        0x01 => Some("Powertrain"),
        0x03 => Some("Req Emission-Related Diag. Trb. Codes"),
        0x04 => Some("Clear/Reset Emission Diag. Trb. Codes"),
        0x07 => Some("Req Emission-Related Diag. Trb. Codes during last cycle"),
        0x09 => Some("Vehicle info"),
        0x0a => Some("Req Emission-Related Diag. Trb. Codes with perm status"),
        0x20 => Some("Restart communication"),
        _ => ServiceIdentifier::from_repr(service).map(|sid| sid.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_services() {
        assert_eq!(service_description(0x10, Some(0x03)), Some("Extended Diag Session"));
        assert_eq!(service_description(0x10, Some(0x42)), Some("Diagnostic Session Control"));
        assert_eq!(service_description(0x10, None), Some("Diagnostic Session Control"));
        assert_eq!(service_description(0x09, Some(0x02)), Some("Req Vehicle info (VIN)"));
        assert_eq!(service_description(0x55, None), None);
    }
}
