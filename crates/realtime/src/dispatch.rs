//! Turns inbound frames into session events.

use serde_json::Value;
use shoplive_core::{Envelope, EventBus, Inbound, InboundCommand, SessionEvent};
use tracing::{debug, info, warn};

/// Text frames the agent emits as filler; never shown to the user.
const SUPPRESSED_TEXT: &[&str] = &["agent message", "\n"];

/// Decodes one raw frame and publishes the resulting events in order.
///
/// Malformed frames are logged and dropped.
pub fn dispatch(raw: &str, bus: &EventBus<SessionEvent>) {
    let inbound = match Inbound::decode(raw) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, bytes = raw.len(), "Dropping malformed inbound message");
            return;
        }
    };
    for event in events_for(inbound) {
        bus.emit(event);
    }
}

/// The events a decoded frame produces, in emission order.
///
/// An interruption is reported first, independent of the payload; turn
/// completion is reported last.
pub fn events_for(inbound: Inbound) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    if inbound.interrupted {
        events.push(SessionEvent::AgentMessageInterrupted);
    }

    match inbound.envelope {
        Envelope::Text(text) => {
            if !SUPPRESSED_TEXT.contains(&text.as_str()) {
                events.push(SessionEvent::AgentMessage(Value::String(text)));
            }
        }
        Envelope::AudioPcm { data, sample_rate } => {
            events.push(SessionEvent::AudioPlayerMessage { data, sample_rate });
        }
        Envelope::Command(command) => command_events(command, &mut events),
        Envelope::Unknown(mime_type) => {
            debug!(%mime_type, "Ignoring envelope with unhandled mime type");
        }
        Envelope::Empty => {}
    }

    if inbound.turn_complete {
        events.push(SessionEvent::TurnComplete);
    }
    events
}

fn command_events(command: InboundCommand, events: &mut Vec<SessionEvent>) {
    match command {
        InboundCommand::PresentItems(items) => events.push(SessionEvent::PresentItems(items)),
        InboundCommand::SetSessionId(id) => {
            info!(session_id = %id, "Server assigned session id");
            events.push(SessionEvent::SetSessionId(id));
        }
        InboundCommand::ShowAgentMessage(text) | InboundCommand::ShowAgentThoughts(text) => {
            events.push(SessionEvent::AgentMessage(text));
        }
        InboundCommand::ShowUserMessage(text) => events.push(SessionEvent::UserMessage(text)),
        InboundCommand::ShowUserImage(image) => {
            events.push(SessionEvent::UserImage(image));
            events.push(SessionEvent::ImageUploaded);
        }
        InboundCommand::ShowSpinner(parameter) => {
            events.push(SessionEvent::ShowSpinner(parameter));
        }
        InboundCommand::ShowQueryResult {
            parameter,
            group_id,
        } => {
            events.push(SessionEvent::ShowQueryMsg(parameter.clone()));
            if group_id.is_some() {
                events.push(SessionEvent::SetProductGroup(parameter));
            }
        }
        InboundCommand::Unrecognized(name) => {
            debug!(command = %name, "Ignoring unrecognized command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_of(raw: &str) -> Vec<SessionEvent> {
        events_for(Inbound::decode(raw).unwrap())
    }

    #[test]
    fn test_text_becomes_agent_message() {
        assert_eq!(
            events_of(r#"{"mime_type":"text/plain","data":"Hello there"}"#),
            vec![SessionEvent::AgentMessage(json!("Hello there"))]
        );
    }

    #[test]
    fn test_placeholder_text_is_suppressed() {
        assert!(events_of(r#"{"mime_type":"text/plain","data":"agent message"}"#).is_empty());
        assert!(events_of(r#"{"mime_type":"text/plain","data":"\n"}"#).is_empty());
    }

    #[test]
    fn test_audio_goes_to_player() {
        assert_eq!(
            events_of(r#"{"mime_type":"audio/pcm","data":"AAA="}"#),
            vec![SessionEvent::AudioPlayerMessage {
                data: "AAA=".to_string(),
                sample_rate: None,
            }]
        );
    }

    #[test]
    fn test_set_session_id_command() {
        assert_eq!(
            events_of(
                r#"{"mime_type":"application/json","data":{"command":"set_session_id","parameter":"abc123"}}"#
            ),
            vec![SessionEvent::SetSessionId(json!("abc123"))]
        );
    }

    #[test]
    fn test_interruption_is_independent_of_payload() {
        assert_eq!(
            events_of(r#"{"mime_type":"audio/pcm","data":"AAA=","interrupted":true}"#),
            vec![
                SessionEvent::AgentMessageInterrupted,
                SessionEvent::AudioPlayerMessage {
                    data: "AAA=".to_string(),
                    sample_rate: None,
                },
            ]
        );
        assert_eq!(
            events_of(r#"{"mime_type":null,"data":null,"interrupted":true}"#),
            vec![SessionEvent::AgentMessageInterrupted]
        );
    }

    #[test]
    fn test_turn_complete_comes_last() {
        assert_eq!(
            events_of(r#"{"mime_type":"text/plain","data":"done","turn_complete":true}"#),
            vec![
                SessionEvent::AgentMessage(json!("done")),
                SessionEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_user_image_emits_upload_signal() {
        assert_eq!(
            events_of(
                r#"{"mime_type":"application/json","data":{"command":"show_user_img","parameter":{"data":"jpeg64"}}}"#
            ),
            vec![
                SessionEvent::UserImage(json!("jpeg64")),
                SessionEvent::ImageUploaded,
            ]
        );
    }

    #[test]
    fn test_query_result_with_group_sets_product_group() {
        let parameter = json!({"group_id": 3, "user_intent": "red sneakers", "found_item_count": 12});
        let raw = json!({
            "mime_type": "application/json",
            "data": {"command": "show_query_msg", "parameter": parameter},
        })
        .to_string();
        assert_eq!(
            events_of(&raw),
            vec![
                SessionEvent::ShowQueryMsg(parameter.clone()),
                SessionEvent::SetProductGroup(parameter),
            ]
        );

        assert_eq!(
            events_of(
                r#"{"mime_type":"application/json","data":{"command":"show_query_msg","parameter":"Searching"}}"#
            ),
            vec![SessionEvent::ShowQueryMsg(json!("Searching"))]
        );
    }

    #[test]
    fn test_agent_thoughts_are_agent_messages() {
        assert_eq!(
            events_of(
                r#"{"mime_type":"application/json","data":{"command":"show_agent_thoughts","parameter":"hmm"}}"#
            ),
            vec![SessionEvent::AgentMessage(json!("hmm"))]
        );
    }

    #[test]
    fn test_unknown_command_and_mime_are_ignored() {
        assert!(
            events_of(r#"{"mime_type":"application/json","data":{"command":"dance","parameter":1}}"#)
                .is_empty()
        );
        assert!(events_of(r#"{"mime_type":"image/png","data":"x"}"#).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_drops_malformed_frames() {
        let bus = EventBus::<SessionEvent>::default();
        let mut sub = bus.subscribe();
        dispatch("{not json", &bus);
        dispatch(r#"{"mime_type":"text/plain","data":"ok"}"#, &bus);
        assert_eq!(sub.recv().await, Some(SessionEvent::AgentMessage(json!("ok"))));
        assert_eq!(sub.try_recv(), None);
    }
}
