//! Prompt assembly for the formatting call.

use crate::models::Mode;

const DEFAULT_PREAMBLE: &str = "\
You are a helpful code assistant explaining a codebase to a non-technical stakeholder \
(a product manager, support lead or executive). Describe what the code does in terms of \
behavior and business impact, and translate jargon into everyday language.

Length rule: by default keep the answer brief, a short paragraph or a few short lines that \
directly answer the question. Only give a detailed, step-by-step explanation if the user \
explicitly asks for more detail, an elaboration, or a step-by-step walkthrough.";

const ONCALL_PREAMBLE: &str = "\
You are a senior engineer writing a fix guide for an on-call developer who needs to resolve \
a problem quickly. Be concrete and actionable.

Structure the answer in exactly three labeled sections, in this order:
Fix Steps: numbered, ordered steps to resolve the problem.
Files and Functions: each specific file or function involved, with a one-line reason it matters.
Checklist: a short list of things to verify once the fix is in place.

Keep file paths and function names exactly as they appear in the analysis.";

const FORMATTING_RULES: &str = "\
IMPORTANT FORMATTING RULES:
- Do NOT use markdown formatting like ### (headers) or ** (bold text)
- Do NOT use asterisks, hashes, or other markdown symbols
- Use plain text only - the output will be displayed in a chat client
- Keep the font consistent throughout
- Use simple line breaks and spacing for structure
- If the response contains code, format it as plain text code blocks or inline code only

If the analysis above is unclear, incomplete, or does not answer the question, say so plainly \
and explain what is missing instead of guessing.";

const fn preamble(mode: Mode) -> &'static str {
    match mode {
        Mode::Default => DEFAULT_PREAMBLE,
        Mode::Oncall => ONCALL_PREAMBLE,
    }
}

/// Build the single user message sent to the completion API.
pub fn build_prompt(
    raw_text: &str,
    user_query: &str,
    conversation_context: Option<&str>,
    mode: Mode,
) -> String {
    let mut prompt = format!(
        "{}\n\nA user asked: \"{user_query}\"\n\n\
         The codebase query tool returned the following response:\n\n{raw_text}",
        preamble(mode)
    );

    if let Some(context) = conversation_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\nConversation History:\n{context}\n\n\
             Please use the conversation history to understand the context of follow-up \
             questions. If this is a follow-up question, refer back to previous messages to \
             provide a coherent answer."
        ));
    }

    prompt.push_str("\n\n");
    prompt.push_str(FORMATTING_RULES);
    prompt
}
