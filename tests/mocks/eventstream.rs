//! AWS event-stream bodies for the Bedrock upstream

use aws_smithy_eventstream::frame::write_message_to;
use aws_smithy_types::event_stream::{Header, HeaderValue, Message};
use base64::{engine::general_purpose::STANDARD, Engine as _};

fn encode(headers: &[(&'static str, &str)], payload: String) -> Vec<u8> {
    let mut message = Message::new(payload.into_bytes());
    for (name, value) in headers {
        message = message.add_header(Header::new(*name, HeaderValue::String(value.to_string().into())));
    }
    let mut out = Vec::new();
    write_message_to(&message, &mut out).expect("encode event-stream message");
    out
}

/// `chunk` event carrying one model frame
pub fn bedrock_chunk(frame: &str) -> Vec<u8> {
    let payload = serde_json::json!({ "bytes": STANDARD.encode(frame) }).to_string();
    encode(&[(":message-type", "event"), (":event-type", "chunk")], payload)
}

/// Exception message raised mid-stream
pub fn bedrock_exception(kind: &str, message: &str) -> Vec<u8> {
    let payload = serde_json::json!({ "message": message }).to_string();
    encode(
        &[(":message-type", "exception"), (":exception-type", kind)],
        payload,
    )
}
