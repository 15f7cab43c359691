use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::store::VariableStore;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid placeholder regex"));

/// Errors raised while resolving `${name}` references.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// One or more names in the input had no value in the store.
    #[error("undefined variables: [{0}]", .0.join(", "))]
    UndefinedVariables(Vec<String>),
}

/// Replaces every `${name}` reference in `input` with its current value in
/// `vars`. Returns an error naming every undefined variable if any reference
/// cannot be resolved; the literal `${name}` text is left in place for
/// undefined references so the error message and the (unused) return value
/// agree on what's missing.
///
/// Inputs with no `${` are returned unchanged without running the regex —
/// the fast path required for the hot per-step field resolution this is
/// called from.
pub fn interpolate(input: &str, vars: &VariableStore) -> Result<String, InterpolationError> {
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut missing = Vec::new();
    let resolved = PLACEHOLDER.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value,
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(InterpolationError::UndefinedVariables(missing))
    }
}

/// Like [`interpolate`], but substitutes `default` for every undefined
/// reference instead of erroring.
#[must_use]
pub fn interpolate_or_default(input: &str, vars: &VariableStore, default: &str) -> String {
    if !input.contains("${") {
        return input.to_string();
    }

    PLACEHOLDER
        .replace_all(input, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1]).unwrap_or_else(|| default.to_string())
        })
        .into_owned()
}

/// Like [`interpolate`], but panics if any reference is undefined. Only
/// safe to call where validation has already proven every reference
/// resolves against the bot's declared config params and reserved names.
#[must_use]
pub fn interpolate_required(input: &str, vars: &VariableStore) -> String {
    interpolate(input, vars).unwrap_or_else(|err| panic!("required interpolation failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_returns_unchanged_when_no_placeholder() {
        let vars = VariableStore::new();
        assert_eq!(interpolate("plain text", &vars).unwrap(), "plain text");
    }

    #[test]
    fn substitutes_defined_variable_once() {
        let vars = VariableStore::new();
        vars.set("name", "Ash");
        assert_eq!(
            interpolate("hello ${name}!", &vars).unwrap(),
            "hello Ash!"
        );
    }

    #[test]
    fn reports_every_undefined_name() {
        let vars = VariableStore::new();
        vars.set("known", "1");
        let err = interpolate("${known} ${a} ${b}", &vars).unwrap_err();
        match err {
            InterpolationError::UndefinedVariables(names) => {
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
        }
    }

    #[test]
    fn nested_interpolation_is_not_recursive() {
        let vars = VariableStore::new();
        vars.set("inner", "${outer}");
        vars.set("outer", "final");
        assert_eq!(interpolate("${inner}", &vars).unwrap(), "${outer}");
    }

    #[test]
    fn default_variant_never_errors() {
        let vars = VariableStore::new();
        assert_eq!(
            interpolate_or_default("${missing}", &vars, "fallback"),
            "fallback"
        );
    }
}
