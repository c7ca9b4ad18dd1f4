//! Relay wire protocol frames.
//!
//! Frames are JSON arrays whose first element names the message type. The
//! frame types are `nostr`'s own [`ClientMessage`] and [`RelayMessage`];
//! this module maps codec failures onto [`RelayError::Protocol`].
//!
//! | Direction | Frame |
//! |-----------|-------|
//! | out | `["REQ", <sub id>, <filter>...]` |
//! | out | `["CLOSE", <sub id>]` |
//! | out | `["EVENT", <event>]` |
//! | out | `["AUTH", <signed event>]` |
//! | in | `["EVENT", <sub id>, <event>]` |
//! | in | `["EOSE", <sub id>]` |
//! | in | `["OK", <event id>, <bool>, <message>]` |
//! | in | `["NOTICE", <message>]` |
//! | in | `["CLOSED", <sub id>, <message>]` |
//! | in | `["AUTH", <challenge>]` |

pub use nostr::message::MachineReadablePrefix;
pub use nostr::{ClientMessage, RelayMessage, SubscriptionId};

use nostr::JsonUtil;

use super::error::{RelayError, RelayResult};

/// A decoded relay frame that owns its data.
pub type InboundMessage = RelayMessage<'static>;

/// Serializes an outgoing frame.
pub(crate) fn encode(message: &ClientMessage<'_>) -> RelayResult<String> {
    message
        .try_as_json()
        .map_err(|e| RelayError::Protocol(e.to_string()))
}

/// Parses an incoming frame. Signatures are not checked here.
pub(crate) fn decode(text: &str) -> RelayResult<InboundMessage> {
    RelayMessage::from_json(text)
        .map_err(|e| RelayError::Protocol(format!("malformed frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{Event, EventBuilder, Filter, Keys, Kind};
    use serde_json::{json, Value};

    fn signed_note() -> Event {
        let keys = Keys::generate();
        EventBuilder::new(Kind::TextNote, "hello relay")
            .sign_with_keys(&keys)
            .unwrap()
    }

    #[test]
    fn req_frame_lists_every_filter() {
        let filters = vec![
            Filter::new().kind(Kind::TextNote).limit(10),
            Filter::new().kind(Kind::Metadata),
        ];
        let text = encode(&ClientMessage::req(SubscriptionId::new("sub-1"), filters)).unwrap();
        let frame: Vec<Value> = serde_json::from_str(&text).unwrap();

        assert_eq!(frame.len(), 4);
        assert_eq!(frame[0], "REQ");
        assert_eq!(frame[1], "sub-1");
        assert_eq!(frame[2]["limit"], 10);
    }

    #[test]
    fn close_frame() {
        let text = encode(&ClientMessage::close(SubscriptionId::new("sub-1"))).unwrap();
        assert_eq!(text, r#"["CLOSE","sub-1"]"#);
    }

    #[test]
    fn decodes_event_frame() {
        let event = signed_note();
        let text = json!(["EVENT", "sub-1", event]).to_string();

        match decode(&text).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event: got,
            } => {
                assert_eq!(subscription_id.as_str(), "sub-1");
                assert_eq!(got.id, event.id);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn closed_prefix_is_machine_readable() {
        let RelayMessage::Closed { message, .. } =
            decode(r#"["CLOSED","s","auth-required: sign in"]"#).unwrap()
        else {
            panic!("expected CLOSED");
        };

        assert_eq!(
            MachineReadablePrefix::parse(&message),
            Some(MachineReadablePrefix::AuthRequired)
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        for text in [
            "not json",
            "{}",
            "[]",
            "[42]",
            r#"["UNKNOWN","x"]"#,
            r#"["EOSE"]"#,
            r#"["OK","zz",true,""]"#,
            r#"["EVENT","s",{"id":"nope"}]"#,
        ] {
            assert!(
                matches!(decode(text), Err(RelayError::Protocol(_))),
                "{text} should be rejected"
            );
        }
    }
}
