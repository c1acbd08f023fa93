//! The JSON envelope exchanged with the live endpoint.
//!
//! Every frame is `{ mime_type, data, interrupted?, turn_complete? }`. The
//! `mime_type` selects how `data` is read: a UTF-8 string, a base64 PCM
//! payload, or a `{ command, parameter }` object.

use crate::codec;
use crate::error::MalformedMessageError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Mime types understood on the wire.
pub mod mime {
    pub const TEXT: &str = "text/plain";
    pub const AUDIO_PCM: &str = "audio/pcm";
    pub const JSON: &str = "application/json";
    pub const IMAGE_JPEG: &str = "image/jpeg";
}

/// Command names the server sends to drive the UI.
pub mod ui_command {
    pub const SHOW_QUERY_MSG: &str = "show_query_msg";
    pub const SHOW_AGENT_MSG: &str = "show_agent_msg";
    pub const SHOW_AGENT_THOUGHTS: &str = "show_agent_thoughts";
    pub const SHOW_USER_MSG: &str = "show_user_msg";
    pub const SHOW_USER_IMG: &str = "show_user_img";
    pub const SHOW_SYSTEM_MSG: &str = "show_system_msg";
    pub const PRESENT_ITEMS: &str = "present_items_to_user";
    pub const SET_SESSION_ID: &str = "set_session_id";
    pub const SHOW_SPINNER: &str = "show_spinner";
}

/// Command names the client sends to the agent.
pub mod agent_command {
    pub const SET_USER_LOCATION: &str = "set_user_location";
    pub const GENERATE_IMAGE: &str = "generate_image";
    pub const SET_AUDIO: &str = "set_audio";
}

/// The raw frame as it appears on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// `null` on frames that only carry flags, e.g. a bare interruption.
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CommandPayload {
    command: Option<String>,
    #[serde(default)]
    parameter: Value,
}

/// A command the server addressed to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    PresentItems(Value),
    SetSessionId(Value),
    ShowAgentMessage(Value),
    ShowAgentThoughts(Value),
    ShowUserMessage(Value),
    /// The image payload, already unwrapped from `parameter.data` when nested.
    ShowUserImage(Value),
    ShowSpinner(Value),
    /// A query response; `group_id` is set when the response names a result group.
    ShowQueryResult {
        parameter: Value,
        group_id: Option<Value>,
    },
    /// Known-but-unhandled or unknown names. Dispatch ignores these.
    Unrecognized(String),
}

impl InboundCommand {
    fn from_parts(name: &str, parameter: Value) -> Self {
        match name {
            ui_command::PRESENT_ITEMS => Self::PresentItems(parameter),
            ui_command::SET_SESSION_ID => Self::SetSessionId(parameter),
            ui_command::SHOW_AGENT_MSG => Self::ShowAgentMessage(parameter),
            ui_command::SHOW_AGENT_THOUGHTS => Self::ShowAgentThoughts(parameter),
            ui_command::SHOW_USER_MSG => Self::ShowUserMessage(parameter),
            ui_command::SHOW_USER_IMG => {
                let image = match parameter.get("data") {
                    Some(nested) if !nested.is_null() => nested.clone(),
                    _ => parameter,
                };
                Self::ShowUserImage(image)
            }
            ui_command::SHOW_SPINNER => Self::ShowSpinner(parameter),
            ui_command::SHOW_QUERY_MSG => {
                let group_id = parameter
                    .get("group_id")
                    .filter(|id| is_truthy(id))
                    .cloned();
                Self::ShowQueryResult {
                    parameter,
                    group_id,
                }
            }
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Whether a loosely typed parameter counts as set: `null`, `false`, `0`
/// and `""` do not; arrays and objects always do.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The decoded content of a frame, one interpretation per mime type.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Text(String),
    AudioPcm {
        /// Base64 little-endian int16 samples.
        data: String,
        /// Taken from a `;rate=N` mime parameter when present.
        sample_rate: Option<u32>,
    },
    Command(InboundCommand),
    /// No mime type or no payload; the frame only carries flags.
    Empty,
    /// A mime type this client does not handle.
    Unknown(String),
}

/// A decoded inbound frame with its out-of-band flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub envelope: Envelope,
    pub interrupted: bool,
    pub turn_complete: bool,
}

impl Inbound {
    /// Parses one text frame from the socket.
    pub fn decode(raw: &str) -> Result<Self, MalformedMessageError> {
        let wire: WireEnvelope = serde_json::from_str(raw)?;
        Self::from_wire(wire)
    }

    pub fn from_wire(wire: WireEnvelope) -> Result<Self, MalformedMessageError> {
        let interrupted = wire.interrupted.unwrap_or(false);
        let turn_complete = wire.turn_complete.unwrap_or(false);
        let envelope = match wire.mime_type {
            None => Envelope::Empty,
            Some(mime_type) => classify(mime_type, wire.data)?,
        };
        Ok(Self {
            envelope,
            interrupted,
            turn_complete,
        })
    }
}

fn classify(mime_type: String, data: Value) -> Result<Envelope, MalformedMessageError> {
    if data.is_null() {
        return Ok(Envelope::Empty);
    }
    if mime_type == mime::TEXT {
        return match data {
            Value::String(text) => Ok(Envelope::Text(text)),
            _ => Err(MalformedMessageError::NonStringData { mime_type }),
        };
    }
    if mime_type.starts_with(mime::AUDIO_PCM) {
        let sample_rate = parse_rate(&mime_type);
        return match data {
            Value::String(data) => Ok(Envelope::AudioPcm { data, sample_rate }),
            _ => Err(MalformedMessageError::NonStringData { mime_type }),
        };
    }
    if mime_type == mime::JSON {
        let payload: CommandPayload = serde_json::from_value(data)?;
        let name = payload
            .command
            .ok_or(MalformedMessageError::MissingCommandName)?;
        return Ok(Envelope::Command(InboundCommand::from_parts(
            &name,
            payload.parameter,
        )));
    }
    Ok(Envelope::Unknown(mime_type))
}

/// A `rate=N` parameter outside the supported range is ignored.
fn parse_rate(mime_type: &str) -> Option<u32> {
    let rate = mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())?;
    if codec::SUPPORTED_SAMPLE_RATES.contains(&rate) {
        Some(rate)
    } else {
        debug!(rate, "Ignoring unsupported sample rate in mime type");
        None
    }
}

/// A command the client addresses to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Switches the agent between spoken (`true`) and text replies.
    SetAudio(bool),
    /// Asks for a try-on image of the given product.
    GenerateImage(String),
    SetUserLocation(Value),
}

impl OutboundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetAudio(_) => agent_command::SET_AUDIO,
            Self::GenerateImage(_) => agent_command::GENERATE_IMAGE,
            Self::SetUserLocation(_) => agent_command::SET_USER_LOCATION,
        }
    }

    fn parameter(&self) -> Value {
        match self {
            Self::SetAudio(audio) => Value::Bool(*audio),
            Self::GenerateImage(product_id) => Value::String(product_id.clone()),
            Self::SetUserLocation(location) => location.clone(),
        }
    }

    /// Serializes the command as an `application/json` envelope.
    pub fn encode(&self) -> String {
        json!({
            "mime_type": mime::JSON,
            "data": {
                "command": self.name(),
                "parameter": self.parameter(),
            },
        })
        .to_string()
    }
}

/// A user text message.
pub fn encode_text(message: &str) -> String {
    json!({ "mime_type": mime::TEXT, "data": message }).to_string()
}

/// A block of microphone audio, already base64-encoded PCM.
pub fn encode_audio_pcm(base64_pcm: &str) -> String {
    json!({ "mime_type": mime::AUDIO_PCM, "data": base64_pcm }).to_string()
}

/// A user image upload, already base64-encoded JPEG.
pub fn encode_image_jpeg(base64_jpeg: &str) -> String {
    json!({ "mime_type": mime::IMAGE_JPEG, "data": base64_jpeg }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text() {
        let inbound = Inbound::decode(r#"{"mime_type":"text/plain","data":"hello"}"#).unwrap();
        assert_eq!(inbound.envelope, Envelope::Text("hello".to_string()));
        assert!(!inbound.interrupted);
        assert!(!inbound.turn_complete);
    }

    #[test]
    fn test_is_truthy() {
        for value in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&value), "{}", value);
        }
        for value in [json!(true), json!(3), json!("on"), json!([]), json!({})] {
            assert!(is_truthy(&value), "{}", value);
        }
    }

    #[test]
    fn test_decode_audio_with_rate() {
        let inbound =
            Inbound::decode(r#"{"mime_type":"audio/pcm;rate=24000","data":"AAA="}"#).unwrap();
        assert_eq!(
            inbound.envelope,
            Envelope::AudioPcm {
                data: "AAA=".to_string(),
                sample_rate: Some(24000),
            }
        );

        for mime in ["audio/pcm", "audio/pcm;rate=0", "audio/pcm;rate=1", "audio/pcm;rate=4000000"] {
            let raw = json!({"mime_type": mime, "data": "AAA="}).to_string();
            assert!(
                matches!(
                    Inbound::decode(&raw).unwrap().envelope,
                    Envelope::AudioPcm {
                        sample_rate: None,
                        ..
                    }
                ),
                "{}",
                mime
            );
        }

        let plain = Inbound::decode(r#"{"mime_type":"audio/pcm","data":"AAA="}"#).unwrap();
        assert!(matches!(
            plain.envelope,
            Envelope::AudioPcm {
                sample_rate: None,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_set_session_id() {
        let inbound = Inbound::decode(
            r#"{"mime_type":"application/json","data":{"command":"set_session_id","parameter":"abc123"}}"#,
        )
        .unwrap();
        assert_eq!(
            inbound.envelope,
            Envelope::Command(InboundCommand::SetSessionId(json!("abc123")))
        );
    }

    #[test]
    fn test_decode_flags_only_frame() {
        let inbound = Inbound::decode(
            r#"{"mime_type":null,"data":null,"interrupted":true,"turn_complete":false}"#,
        )
        .unwrap();
        assert_eq!(inbound.envelope, Envelope::Empty);
        assert!(inbound.interrupted);

        let text_interrupt =
            Inbound::decode(r#"{"mime_type":"text/plain","data":null,"interrupted":true}"#)
                .unwrap();
        assert_eq!(text_interrupt.envelope, Envelope::Empty);
        assert!(text_interrupt.interrupted);
    }

    #[test]
    fn test_decode_unknown_mime_is_not_an_error() {
        let inbound = Inbound::decode(r#"{"mime_type":"video/mp4","data":"x"}"#).unwrap();
        assert_eq!(inbound.envelope, Envelope::Unknown("video/mp4".to_string()));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            Inbound::decode("not json"),
            Err(MalformedMessageError::Json(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"mime_type":"text/plain","data":{"a":1}}"#),
            Err(MalformedMessageError::NonStringData { .. })
        ));
        assert!(matches!(
            Inbound::decode(r#"{"mime_type":"application/json","data":{"parameter":1}}"#),
            Err(MalformedMessageError::MissingCommandName)
        ));
    }

    #[test]
    fn test_user_image_unwraps_nested_data() {
        let nested = InboundCommand::from_parts("show_user_img", json!({"data": "b64"}));
        assert_eq!(nested, InboundCommand::ShowUserImage(json!("b64")));

        let flat = InboundCommand::from_parts("show_user_img", json!("b64"));
        assert_eq!(flat, InboundCommand::ShowUserImage(json!("b64")));
    }

    #[test]
    fn test_query_result_group_id() {
        let with_group = InboundCommand::from_parts(
            "show_query_msg",
            json!({"group_id": 7, "user_intent": "shoes"}),
        );
        assert!(matches!(
            with_group,
            InboundCommand::ShowQueryResult { group_id: Some(_), .. }
        ));

        let without = InboundCommand::from_parts("show_query_msg", json!("searching"));
        assert!(matches!(
            without,
            InboundCommand::ShowQueryResult { group_id: None, .. }
        ));
    }

    #[test]
    fn test_unrecognized_commands() {
        assert_eq!(
            InboundCommand::from_parts("show_system_msg", Value::Null),
            InboundCommand::Unrecognized("show_system_msg".to_string())
        );
        assert_eq!(
            InboundCommand::from_parts("dance", Value::Null),
            InboundCommand::Unrecognized("dance".to_string())
        );
    }

    #[test]
    fn test_encode_outbound() {
        let text: Value = serde_json::from_str(&encode_text("hi")).unwrap();
        assert_eq!(text, json!({"mime_type": "text/plain", "data": "hi"}));

        let audio: Value = serde_json::from_str(&encode_audio_pcm("AAA=")).unwrap();
        assert_eq!(audio, json!({"mime_type": "audio/pcm", "data": "AAA="}));

        let set_audio: Value =
            serde_json::from_str(&OutboundCommand::SetAudio(true).encode()).unwrap();
        assert_eq!(
            set_audio,
            json!({
                "mime_type": "application/json",
                "data": {"command": "set_audio", "parameter": true}
            })
        );

        let generate: Value =
            serde_json::from_str(&OutboundCommand::GenerateImage("m42".into()).encode()).unwrap();
        assert_eq!(generate["data"]["command"], "generate_image");
        assert_eq!(generate["data"]["parameter"], "m42");
    }
}
