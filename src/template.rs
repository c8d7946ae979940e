//! Import of Llama-3 style transcripts (`<|start_header_id|>role<|end_header_id|>...<|eot_id|>`).

use crate::types::ChatMessage;

const START_HEADER: &str = "<|start_header_id|>";
const END_HEADER: &str = "<|end_header_id|>";
const END_OF_TURN: &str = "<|eot_id|>";

/// Split a header-token transcript into messages.
///
/// Escaped `\n` sequences become newlines and escaped `\r` are dropped,
/// so transcripts pasted from JSON strings work as-is. Sections without a
/// role header are skipped.
pub fn parse_messages(input: &str) -> Vec<ChatMessage> {
    let input = input.replace("\\n", "\n").replace("\\r", "");

    input
        .split(END_OF_TURN)
        .filter_map(parse_section)
        .collect()
}

fn parse_section(section: &str) -> Option<ChatMessage> {
    let (_, after_start) = section.split_once(START_HEADER)?;
    let (role, content) = after_start.split_once(END_HEADER)?;
    let role = role.trim();
    if role.is_empty() {
        return None;
    }
    Some(ChatMessage::new(role, content.trim()))
}
