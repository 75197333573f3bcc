// Shared prompt constants. Each module that calls the LLM keeps its own
// prompts.rs alongside it; this file holds the cross-cutting fragments.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for short spoken replies.
pub const PLAIN_TEXT_SYSTEM: &str = "You are a professional interviewer. \
    Respond with plain text only: no markdown, no quotation marks, no lists.";
