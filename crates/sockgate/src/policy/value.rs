use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::*;

/// A string is treated as a regex only when it carries one of these; anything
/// else must equal-match exactly.
const REGEX_METACHARS: &[char] = &[
	'.', '*', '+', '?', '^', '$', '(', ')', '[', ']', '{', '}', '|',
];

pub fn is_pattern(s: &str) -> bool {
	s.contains(REGEX_METACHARS)
}

// Policies are small and immutable, so the set of patterns is bounded; cache
// compilations, and remember failures so each bad pattern is logged once.
static PATTERNS: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
	Lazy::new(|| Mutex::new(HashMap::new()));

/// Compiles `pattern`, returning None (and logging, once per unique pattern)
/// when it is not a valid regex.
pub fn compile(pattern: &str) -> Option<Regex> {
	let mut cache = PATTERNS.lock().expect("pattern cache poisoned");
	if let Some(cached) = cache.get(pattern) {
		return cached.clone();
	}
	let compiled = match Regex::new(pattern) {
		Ok(re) => Some(re),
		Err(err) => {
			warn!(%pattern, %err, "invalid regex in policy");
			None
		},
	};
	cache.insert(pattern.to_string(), compiled.clone());
	compiled
}

/// The string leaf rule: regex match when the pattern carries a metachar,
/// exact equality otherwise. A pattern that fails to compile falls back to
/// equality.
pub fn match_string(expected: &str, actual: &str) -> bool {
	if is_pattern(expected) {
		match compile(expected) {
			Some(re) => re.is_match(actual),
			None => expected == actual,
		}
	} else {
		expected == actual
	}
}

/// Structural value matching between an expected (policy-side) value and an
/// actual (request-side) value:
///
/// - strings use [`match_string`], and match against an array when any string
///   element does;
/// - an expected array matches when every element is matched by some element
///   of the actual array (order-free; strings by the leaf rule, everything
///   else by deep equality);
/// - an expected object matches when every key is present in the actual
///   object and its value matches recursively;
/// - nulls match only each other; any remaining combination requires deep
///   equality.
pub fn match_value(expected: &Value, actual: &Value) -> bool {
	match (expected, actual) {
		(Value::Null, Value::Null) => true,
		(Value::Null, _) | (_, Value::Null) => false,
		(Value::String(e), Value::String(a)) => match_string(e, a),
		(Value::String(e), Value::Array(a)) => a
			.iter()
			.any(|el| matches!(el, Value::String(s) if match_string(e, s))),
		(Value::Array(e), Value::Array(a)) => e.iter().all(|ee| {
			a.iter().any(|aa| match ee {
				Value::String(_) => match_value(ee, aa),
				_ => ee == aa,
			})
		}),
		(Value::Object(e), Value::Object(a)) => e
			.iter()
			.all(|(k, ev)| a.get(k).is_some_and(|av| match_value(ev, av))),
		_ => expected == actual,
	}
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
