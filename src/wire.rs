//! Projection of the transcript onto the outbound message list.

use chat_provider::WireMessage;

use crate::transcript::Transcript;

/// Builds the wire messages for a completion request.
///
/// Output is one leading system entry followed by every user and assistant
/// message in order. Error entries are dropped, as is an in-progress
/// placeholder that has not received any content yet.
#[must_use]
pub fn to_wire_messages(transcript: &Transcript, system_prompt: &str) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(transcript.len() + 1);
    wire.push(WireMessage::system(system_prompt));

    for (index, message) in transcript.messages().iter().enumerate() {
        if transcript.is_pending_placeholder(index) {
            continue;
        }
        if let Some(role) = message.role.wire_role() {
            wire.push(WireMessage {
                role,
                content: message.content.clone(),
            });
        }
    }

    wire
}
