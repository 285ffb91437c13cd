use serde_json::Value;

pub const EMPTY_RESPONSE_TEXT: &str = "No response";

/// Fields probed, in order, for the text to show.
const TEXT_FIELDS: [&str; 5] = ["text", "content", "result", "message", "data"];

/// A loose string field must be longer than this to count as the answer.
const MIN_LOOSE_FIELD_CHARS: usize = 10;

/// Turns an opaque success payload into the text the response view shows.
///
/// Strings are used as-is. Objects are probed for a text-bearing field,
/// arrays are joined line by line, and otherwise the first long string
/// field wins before falling back to pretty JSON. The result is trimmed
/// line by line with runs of blank lines collapsed to one.
pub fn display_text(response: &Value) -> String {
    if !is_truthy(response) {
        return EMPTY_RESPONSE_TEXT.to_string();
    }

    let raw = match response {
        Value::String(text) => text.clone(),
        other => extract(other),
    };
    tidy(&raw)
}

fn extract(response: &Value) -> String {
    if let Some(value) = TEXT_FIELDS
        .iter()
        .find_map(|field| response.get(*field).filter(|value| is_truthy(value)))
    {
        return render(value);
    }

    match response {
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join("\n"),
        Value::Object(fields) => fields
            .values()
            .find_map(|value| {
                value
                    .as_str()
                    .filter(|text| text.chars().count() > MIN_LOOSE_FIELD_CHARS)
            })
            .map(str::to_string)
            .unwrap_or_else(|| pretty(response)),
        other => render(other),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(","),
        Value::Object(_) => pretty(value),
        other => other.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn tidy(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.trim().lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Loose truthiness used when probing untyped replies.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
