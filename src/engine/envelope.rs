use crate::can::Frame;

/// Bus label of envelopes created by the scheduler.
pub const DEFAULT_BUS: &str = "Default";

/// Mutable carrier passed along the actions bound to one pipe during a single tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    pub frame: Option<Frame>,
    pub has_can_data: bool,
    pub has_debug_data: bool,
    pub debug_text: String,
    /// Source or destination bus of the frame
    pub bus: String,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            frame: None,
            has_can_data: false,
            has_debug_data: false,
            debug_text: String::new(),
            bus: DEFAULT_BUS.to_string(),
        }
    }
}

impl Envelope {
    pub fn with_frame(frame: Frame, bus: &str) -> Self {
        Self {
            frame: Some(frame),
            has_can_data: true,
            bus: bus.to_string(),
            ..Default::default()
        }
    }

    /// The frame, if the envelope carries CAN data.
    pub fn can_frame(&self) -> Option<&Frame> {
        match self.has_can_data {
            true => self.frame.as_ref(),
            false => None,
        }
    }

    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
        self.has_can_data = true;
    }

    pub fn set_debug(&mut self, text: &str) {
        self.debug_text = text.to_string();
        self.has_debug_data = true;
    }
}
