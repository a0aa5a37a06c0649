//! Inbound control protocol.
//!
//! The channel carries dictionaries of numbered tuples. Each inbound
//! field decodes independently into a [`ControlMessage`]; a field with
//! an unexpected type or an unknown key is logged and dropped without
//! affecting the rest of the dictionary.

use log::error;

pub const MSG_KEY_LAST_SENT: u32 = 110;
pub const MSG_KEY_MODAL_MESSAGE: u32 = 120;
pub const MSG_KEY_UPLOAD_DONE: u32 = 130;
pub const MSG_KEY_UPLOAD_START: u32 = 140;
pub const MSG_KEY_UPLOAD_FAILED: u32 = 150;
pub const MSG_KEY_DATA_KEY: u32 = 210;
pub const MSG_KEY_DATA_LINE: u32 = 220;
pub const MSG_KEY_CFG_START: u32 = 301;
pub const MSG_KEY_CFG_END: u32 = 302;
pub const MSG_KEY_CFG_AUTO_CLOSE: u32 = 310;
pub const MSG_KEY_CFG_WAKEUP_TIME: u32 = 320;

/// One field of an inbound dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub key: u32,
    pub value: TupleValue,
}

impl Tuple {
    pub fn new(key: u32, value: TupleValue) -> Self {
        Self { key, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleValue {
    UInt(u32),
    Int(i32),
    Text(String),
}

impl TupleValue {
    fn as_u32(&self) -> Option<u32> {
        match self {
            TupleValue::UInt(v) => Some(*v),
            TupleValue::Int(v) => Some(*v as u32),
            TupleValue::Text(_) => None,
        }
    }

    fn as_i32(&self) -> Option<i32> {
        match self {
            TupleValue::UInt(v) => Some(*v as i32),
            TupleValue::Int(v) => Some(*v),
            TupleValue::Text(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            TupleValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Everything the peer can ask of the engine, one variant per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Last minute key the remote service confirmed; restart point.
    Resume(u32),
    /// Out-of-band notice to display instead of the progress tracks.
    Modal(String),
    /// The peer's upload reached this minute key.
    UploadDone(u32),
    /// The peer's upload started at this minute key.
    UploadStart(u32),
    /// The peer's upload failed; human-readable reason.
    UploadFailed(String),
    CfgAutoClose(bool),
    /// Minutes after midnight, -1 to disable the scheduled wakeup.
    CfgWakeupTime(i32),
    CfgStart,
    CfgEnd,
}

/// Decode one field. `None` means the field was malformed or unknown;
/// it has already been logged and the caller just moves on.
pub fn decode_tuple(tuple: &Tuple) -> Option<ControlMessage> {
    match tuple.key {
        MSG_KEY_LAST_SENT => match tuple.value.as_u32() {
            Some(key) => Some(ControlMessage::Resume(key)),
            None => {
                error!("unexpected payload {:?} for LAST_SENT", tuple.value);
                None
            }
        },
        MSG_KEY_MODAL_MESSAGE => match tuple.value.as_text() {
            Some(text) => Some(ControlMessage::Modal(text.to_string())),
            None => {
                error!("unexpected payload {:?} for MODAL_MESSAGE", tuple.value);
                None
            }
        },
        MSG_KEY_UPLOAD_DONE => drop_malformed(
            tuple,
            tuple.value.as_u32().map(ControlMessage::UploadDone),
        ),
        MSG_KEY_UPLOAD_START => drop_malformed(
            tuple,
            tuple.value.as_u32().map(ControlMessage::UploadStart),
        ),
        MSG_KEY_UPLOAD_FAILED => drop_malformed(
            tuple,
            tuple
                .value
                .as_text()
                .map(|text| ControlMessage::UploadFailed(text.to_string())),
        ),
        MSG_KEY_CFG_AUTO_CLOSE => drop_malformed(
            tuple,
            tuple
                .value
                .as_u32()
                .map(|v| ControlMessage::CfgAutoClose(v != 0)),
        ),
        MSG_KEY_CFG_WAKEUP_TIME => drop_malformed(
            tuple,
            tuple.value.as_i32().map(ControlMessage::CfgWakeupTime),
        ),
        MSG_KEY_CFG_START => Some(ControlMessage::CfgStart),
        MSG_KEY_CFG_END => Some(ControlMessage::CfgEnd),
        other => {
            error!("unknown key {other} in received message");
            None
        }
    }
}

fn drop_malformed(tuple: &Tuple, decoded: Option<ControlMessage>) -> Option<ControlMessage> {
    if decoded.is_none() {
        error!("unexpected payload {:?} for key {}", tuple.value, tuple.key);
    }
    decoded
}
