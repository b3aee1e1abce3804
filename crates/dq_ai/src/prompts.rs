/// Placeholder rendered when a prompt section has no content.
pub const EMPTY_SECTION: &str = "(none)";

fn or_none(s: &str) -> &str {
    if s.trim().is_empty() {
        EMPTY_SECTION
    } else {
        s
    }
}

/// Answer prompt: past conversation, retrieved context, then the question.
///
/// Each section sits between BEGIN/END markers so the model can tell where
/// retrieved text stops and the question starts.
pub fn answer_prompt(transcript: &str, context: &str, question: &str) -> String {
    let transcript = or_none(transcript);
    let context = or_none(context);
    format!(
        r#"You are a helpful AI assistant.
Maintain a conversational tone and use context from previous chats.
Answer only from the context below. If it does not contain the answer, say that you don't know.

BEGIN PAST CONVERSATION
{transcript}
END PAST CONVERSATION

BEGIN CONTEXT
{context}
END CONTEXT

BEGIN QUESTION
{question}
END QUESTION

Answer the question above in a friendly and engaging way.
"#
    )
}

/// Ask the model to restate a follow-up as a standalone question.
pub fn standalone_question_prompt(transcript: &str, question: &str) -> String {
    let transcript = or_none(transcript);
    format!(
        r#"Given a chat history and the latest user question which might reference context in the chat history, formulate a standalone question which can be understood without the chat history.
Do NOT answer the question; just reformulate it if needed and otherwise return it as is.
Return only the question.

BEGIN CHAT HISTORY
{transcript}
END CHAT HISTORY

BEGIN QUESTION
{question}
END QUESTION
"#
    )
}

pub fn transcript_cleanup_prompt(raw_transcript: &str) -> String {
    format!(
        r#"You improve raw speech-to-text transcripts. Your job is to:
- Fix punctuation and capitalization.
- Remove filler words like "um", "uh", "you know".
- Format the text into readable paragraphs (but don't add speaker labels).
- Ensure clarity and proper sentence structure.
Respond with the formatted transcript only, without commentary.

BEGIN TRANSCRIPT
{raw_transcript}
END TRANSCRIPT
"#
    )
}
