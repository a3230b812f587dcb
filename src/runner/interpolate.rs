//! Variable interpolation for strings
//!
//! Templates reference variables as `${name}`. Rendering is strict: a name
//! missing from the mapping is an error rather than an empty string.
//! `$${` renders as a literal `${`.

use crate::error::{InterpolationError, InterpolationResult};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\$?)\{([^}]*)\}").expect("placeholder pattern is valid"))
}

/// Render `${name}` references in a template
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> InterpolationResult<String> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &template[last..whole.start()];
        check_unclosed(literal, template)?;
        result.push_str(literal);

        let name = caps[2].trim();
        if !caps[1].is_empty() {
            result.push_str("${");
            result.push_str(&caps[2]);
            result.push('}');
        } else if name.is_empty() {
            return Err(InterpolationError::InvalidSyntax(format!(
                "empty variable reference in '{}'",
                template
            )));
        } else {
            match vars.get(name) {
                Some(value) => result.push_str(value),
                None => return Err(InterpolationError::UndefinedVariable(name.to_string())),
            }
        }

        last = whole.end();
    }

    let rest = &template[last..];
    check_unclosed(rest, template)?;
    result.push_str(rest);

    Ok(result)
}

/// Render every value of a mapping
pub fn interpolate_map(
    values: &BTreeMap<String, String>,
    vars: &HashMap<String, String>,
) -> InterpolationResult<BTreeMap<String, String>> {
    values
        .iter()
        .map(|(key, template)| Ok((key.clone(), interpolate(template, vars)?)))
        .collect()
}

fn check_unclosed(segment: &str, template: &str) -> InterpolationResult<()> {
    if segment.contains("${") {
        return Err(InterpolationError::InvalidSyntax(format!(
            "unclosed '${{' in '{}'",
            template
        )));
    }
    Ok(())
}
