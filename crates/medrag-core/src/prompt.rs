use std::fmt::Write as _;

use medrag_llm::provider::Message;
use medrag_memory::CallerRole;

use crate::assembler::QueryContext;

const DOCTOR_PROMPT: &str = "You are an AI assistant helping a doctor in a healthcare setting. \
Provide accurate, professional medical information based on the provided context. \
Always remind users to verify information and consult current medical guidelines.";

const NURSE_PROMPT: &str = "You are an AI assistant helping a nurse in a healthcare setting. \
Provide practical, relevant information for nursing care based on the provided context. \
Focus on procedures, patient care, and safety protocols.";

const ADMIN_PROMPT: &str = "You are an AI assistant helping a healthcare administrator. \
Provide information about policies, procedures, and administrative matters based on the \
provided context.";

/// Appended to answers produced without any supporting document.
pub const NO_CONTEXT_NOTE: &str = "\n\n*Note: This response was generated without specific \
document context. Please verify information with current medical guidelines.*";

/// Role framing for the completion model. Unknown roles get the administrative prompt.
#[must_use]
pub fn system_prompt(role: CallerRole) -> &'static str {
    match role {
        CallerRole::Doctor => DOCTOR_PROMPT,
        CallerRole::Nurse => NURSE_PROMPT,
        CallerRole::Admin | CallerRole::Staff => ADMIN_PROMPT,
    }
}

#[must_use]
pub fn format_context(context: &QueryContext) -> String {
    let mut out = String::new();
    for entry in &context.entries {
        let _ = write!(
            out,
            "Document: {}\nContent: {}\n---\n",
            entry.hit.document_title, entry.hit.content
        );
    }
    out
}

/// Role prompt, then the retrieved context (if any), then the question.
#[must_use]
pub fn build_messages(role: CallerRole, context: &QueryContext, question: &str) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt(role))];
    if !context.is_empty() {
        messages.push(Message::system(format!(
            "Use the following context to answer the user's question:\n\n{}",
            format_context(context)
        )));
    }
    messages.push(Message::user(question));
    messages
}
