use ::http::request::Parts;
use serde_json::Value;

use super::{Action, Rule, RuleMatch, Settings, SocketConfig, rewrite, value};
use crate::http::{WellKnownContentTypes, classify_content_type};
use crate::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
	Allow { reason: Option<String> },
	Deny { reason: String },
}

impl Verdict {
	pub fn is_allow(&self) -> bool {
		matches!(self, Verdict::Allow { .. })
	}
}

/// The outcome of evaluating a policy over one request: the verdict plus the
/// body bytes to forward. `modified` marks a rewritten body, whose
/// Content-Length the caller must recompute.
#[derive(Debug)]
pub struct Evaluation {
	pub verdict: Verdict,
	pub body: Bytes,
	pub modified: bool,
}

/// Evaluates `config` against one buffered request.
///
/// Rules run in order (the implicit propagate-socket rule first); for each
/// rule whose match fires, actions run in order. The first terminal action
/// decides the request immediately, keeping any rewrites applied up to that
/// point. A policy that never reaches a terminal action allows the request:
/// the proxy is transparent by default.
///
/// Bodies that are empty, non-JSON, or sent with a non-JSON content type are
/// never rewritten, and no `contains` clause can match them; method and path
/// clauses still apply.
pub fn evaluate(parts: &Parts, body: Bytes, config: &SocketConfig) -> Evaluation {
	let mut decoded = decode_body(parts, &body);
	let mut dirty = false;
	let implicit = implicit_rule(&config.settings);
	for rule in implicit.iter().chain(&config.rules) {
		if !rule_matches(parts, decoded.as_ref(), &rule.matches) {
			continue;
		}
		for action in &rule.actions {
			match action {
				Action::Allow { reason } => {
					return finish(
						Verdict::Allow {
							reason: reason.clone(),
						},
						body,
						decoded,
						dirty,
					);
				},
				Action::Deny { reason } => {
					return finish(
						Verdict::Deny {
							reason: reason.clone(),
						},
						body,
						decoded,
						dirty,
					);
				},
				Action::Upsert { update } => {
					if let Some(decoded) = decoded.as_mut() {
						dirty |= rewrite::upsert(decoded, update);
					}
				},
				Action::Replace { contains, update } => {
					if let Some(decoded) = decoded.as_mut() {
						dirty |= rewrite::replace(decoded, contains, update);
					}
				},
				Action::Delete { contains } => {
					if let Some(decoded) = decoded.as_mut() {
						dirty |= rewrite::delete(decoded, contains);
					}
				},
			}
		}
	}
	finish(Verdict::Allow { reason: None }, body, decoded, dirty)
}

fn rule_matches(parts: &Parts, body: Option<&Value>, m: &RuleMatch) -> bool {
	if !m.path.is_empty() {
		// A pattern that does not compile fails closed.
		let Some(re) = value::compile(&m.path) else {
			return false;
		};
		if !re.is_match(parts.uri.path()) {
			return false;
		}
	}
	if !m.method.is_empty() {
		let Some(re) = value::compile(&m.method) else {
			return false;
		};
		if !re.is_match(parts.method.as_str()) {
			return false;
		}
	}
	if !m.contains.is_null() {
		let Some(body) = body else {
			return false;
		};
		if !value::match_value(&m.contains, body) {
			return false;
		}
	}
	true
}

fn decode_body(parts: &Parts, body: &Bytes) -> Option<Value> {
	if body.is_empty() {
		return None;
	}
	match classify_content_type(&parts.headers) {
		WellKnownContentTypes::Json | WellKnownContentTypes::Unspecified => {
			serde_json::from_slice(body).ok()
		},
		WellKnownContentTypes::Other => None,
	}
}

/// `settings.propagate_socket` contributes an upsert binding the socket path
/// read-only into every container created through this proxy, evaluated
/// before any user rules.
fn implicit_rule(settings: &Settings) -> Option<Rule> {
	if settings.propagate_socket.is_empty() {
		return None;
	}
	let path = &settings.propagate_socket;
	Some(Rule {
		matches: RuleMatch {
			path: r"^(/v[0-9.]+)?/containers/create$".to_string(),
			method: "^POST$".to_string(),
			contains: Value::Null,
		},
		actions: vec![Action::Upsert {
			update: serde_json::json!({ "HostConfig": { "Binds": [format!("{path}:{path}:ro")] } }),
		}],
	})
}

fn finish(verdict: Verdict, original: Bytes, decoded: Option<Value>, dirty: bool) -> Evaluation {
	if !dirty {
		return Evaluation {
			verdict,
			body: original,
			modified: false,
		};
	}
	let encoded = decoded.as_ref().map(serde_json::to_vec);
	match encoded {
		Some(Ok(bytes)) => Evaluation {
			verdict,
			body: bytes.into(),
			modified: true,
		},
		// Rewrites only happen on a decoded body, and serializing a Value
		// cannot produce invalid JSON; forward the original rather than fail.
		Some(Err(err)) => {
			error!(%err, "failed to re-encode rewritten body");
			Evaluation {
				verdict,
				body: original,
				modified: false,
			}
		},
		None => Evaluation {
			verdict,
			body: original,
			modified: false,
		},
	}
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
