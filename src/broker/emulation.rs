//! Prompt-based tool calling for backends without a native tools API.
//!
//! The tools are described in a trailing system message that asks the model to
//! answer with a `<code>`-fenced JSON object tagged `FUNC_CALL`. The reply is
//! then scanned for that object.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;

use crate::types::{FunctionCall, InferenceMessage, Tool};

/// Tag the model must put in the `type` field of an emulated call.
pub const FUNC_CALL_MARKER: &str = "FUNC_CALL";

const OUTPUT_FORMAT: &str = r#"OUTPUT_FORMAT:
Parameter Selection:
<Provide the step by step thought process to select the parameters. Go through the entire conversation>

Function Call:
<code>
{
    "type": "FUNC_CALL",
    "reasoning": "<reasoning for choosing the parameters>",
    "name": "<name of function>",
    "parameters": "<value to pass to function as parameter>"
}
</code>"#;

/// Render the system message describing `tools` and the expected reply format.
pub fn function_call_prompt(tools: &[Tool]) -> String {
    let mut out = String::from(
        "You may use the following FUNCTIONS in the response. Only use one function at a time. \
         Give output in following OUTPUT_FORMAT if you want to call a function.\n\nFUNCTIONS:\n",
    );
    for tool in tools {
        let _ = writeln!(out, "- Name: {}", tool.name);
        if let Some(desc) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "  Description: {}", desc);
        }
        let _ = writeln!(out, "  Parameter JSON Schema: {}\n", tool.args);
    }
    out.push('\n');
    out.push_str(OUTPUT_FORMAT);
    out
}

/// Append the tool-description system message to `messages`.
pub fn inject_fn_call_prompt(messages: &mut Vec<InferenceMessage>, tools: &[Tool]) {
    messages.push(InferenceMessage::system(function_call_prompt(tools)));
}

/// Slice from the first `{` to the last `}`, looking inside `<code>…</code>`
/// when the text has a fence.
pub fn json_region(text: &str) -> Option<&str> {
    let scoped = match (text.find("<code>"), text.rfind("</code>")) {
        (Some(start), Some(end)) if end > start => &text[start + "<code>".len()..end],
        (Some(_), _) => return None,
        _ => text,
    };
    let start = scoped.find('{')?;
    let end = scoped.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&scoped[start..=end])
}

#[derive(Debug, Deserialize)]
struct EmulatedCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    parameters: Value,
}

/// Parse an emulated call out of model output. `None` when no object with a
/// non-empty `name` can be found.
pub fn extract_function_call(text: &str) -> Option<FunctionCall> {
    let region = json_region(text)?;
    let call: EmulatedCall = serde_json::from_str(region).ok()?;
    let name = call.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(FunctionCall::new(name, call.parameters))
}

/// Content that replaces the raw model output once a call was extracted.
pub fn describe_call(call: &FunctionCall) -> String {
    format!(
        "Execute function {} with arguments: {}",
        call.name, call.parameters
    )
}
