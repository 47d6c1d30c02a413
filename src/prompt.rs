//! Model input construction.

/// Opens the system turn of the chat template.
pub const SYSTEM_MARKER: &str = "<|system|>";
/// Opens the user turn of the chat template.
pub const USER_MARKER: &str = "<|user|>";
/// Closes the user turn.
pub const END_OF_TURN: &str = "</s>";

/// Build the chat-framed prompt for a raw query name.
///
/// Dots in the name become spaces, so `hello.world.` reads as `hello world `.
pub fn build(query_name: &str, system_preamble: &str) -> String {
    let question = query_name.replace('.', " ");

    let mut prompt = String::with_capacity(
        SYSTEM_MARKER.len()
            + system_preamble.len()
            + USER_MARKER.len()
            + question.len()
            + END_OF_TURN.len(),
    );
    prompt.push_str(SYSTEM_MARKER);
    prompt.push_str(system_preamble);
    prompt.push_str(USER_MARKER);
    prompt.push_str(&question);
    prompt.push_str(END_OF_TURN);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_query_with_preamble() {
        let prompt = build("hello.world.example.com.", "Answer briefly.");
        assert_eq!(
            prompt,
            "<|system|>Answer briefly.<|user|>hello world example com </s>"
        );
    }

    #[test]
    fn empty_preamble_still_terminates_turn() {
        let prompt = build("what.is.rust.", "");
        assert_eq!(prompt, "<|system|><|user|>what is rust </s>");
        assert!(prompt.ends_with("what is rust </s>"));
    }

    #[test]
    fn preamble_with_markers_does_not_move_terminator() {
        let prompt = build("a.b.", "ends with </s>\n");
        assert!(prompt.ends_with("<|user|>a b </s>"));
    }
}
