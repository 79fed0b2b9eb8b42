//! Placeholder substitution for message templates.
//!
//! Templates reference lead fields with bracketed names such as
//! `[First Name]` or `[Program]`. Names are matched case-insensitively and
//! missing fields fall back to generic text. Unknown bracketed text is left
//! alone. Lead values are inserted with `[` and `]` removed.

use crm_core::types::Lead;

const NAME_FALLBACK: &str = "there";
const PROGRAM_FALLBACK: &str = "our programs";

/// Replaces every known placeholder in `template` with the lead's value.
///
/// Runs left-to-right substitution passes until the text stops changing; a
/// value can complete a placeholder opened by surrounding brackets, as in
/// `[[First Name]]`. Values are bracket-stripped, so each pass that changes
/// the text removes brackets and the result is a fixed point:
/// `personalize(&personalize(t, l), l) == personalize(t, l)`.
pub fn personalize(template: &str, lead: &Lead) -> String {
    let mut current = substitute_once(template, lead);
    // Each change removes a bracket pair, so this terminates.
    loop {
        let next = substitute_once(&current, lead);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Value for a placeholder name, or `None` if the name is not recognized.
pub fn resolve_placeholder(name: &str, lead: &Lead) -> Option<String> {
    let key = normalize_key(name);
    let value = match key.as_str() {
        "first name" | "firstname" => non_empty(lead.first_name.as_deref())
            .unwrap_or(NAME_FALLBACK)
            .to_string(),
        "last name" | "lastname" => non_empty(lead.last_name.as_deref())
            .unwrap_or_default()
            .to_string(),
        "full name" | "fullname" | "name" => lead
            .full_name()
            .unwrap_or_else(|| NAME_FALLBACK.to_string()),
        "email" => non_empty(lead.email.as_deref()).unwrap_or_default().to_string(),
        "phone" => non_empty(lead.phone.as_deref()).unwrap_or_default().to_string(),
        "program" => non_empty(lead.program.as_deref())
            .unwrap_or(PROGRAM_FALLBACK)
            .to_string(),
        _ => return None,
    };
    Some(strip_brackets(&value))
}

fn substitute_once(template: &str, lead: &Lead) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let resolved = after_open.find(']').and_then(|close| {
            resolve_placeholder(&after_open[..close], lead).map(|value| (value, close))
        });
        match resolved {
            Some((value, close)) => {
                out.push_str(&value);
                rest = &after_open[close + 1..];
            }
            None => {
                out.push('[');
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

fn normalize_key(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn strip_brackets(value: &str) -> String {
    value.chars().filter(|c| *c != '[' && *c != ']').collect()
}
