// Cross-cutting prompt fragments shared by every caller of the LLM client.
// Task-specific prompts live next to the module that sends them.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "Return ONLY one JSON object. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended when a previous reply already failed to parse.
pub const STRICT_NO_PROSE: &str = "Any text outside the JSON object makes the reply unusable.";
