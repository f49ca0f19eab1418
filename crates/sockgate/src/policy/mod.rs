use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod engine;
pub mod rewrite;
pub mod value;

pub use engine::{Evaluation, Verdict, evaluate};

/// The declarative policy attached to one proxy socket. Immutable once
/// created; replaced wholesale, never edited in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SocketConfig {
	#[serde(default, skip_serializing_if = "Settings::is_default")]
	pub settings: Settings,
	#[serde(default)]
	pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
	/// When non-empty, this host path is bound read-only into every container
	/// created through the socket, via an implicit rewrite rule that runs
	/// before any user rules.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub propagate_socket: String,
}

impl Settings {
	fn is_default(&self) -> bool {
		*self == Settings::default()
	}
}

/// One ordered policy entry: a match clause plus the actions that run when it
/// fires. The first terminal action across all matching rules decides the
/// request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
	#[serde(rename = "match", default)]
	pub matches: RuleMatch,
	#[serde(default)]
	pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleMatch {
	/// Regex over the request path, evaluated as written (callers anchor with
	/// `^...$` if they want full matches).
	#[serde(default)]
	pub path: String,
	/// Regex over the HTTP method.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub method: String,
	/// Structural containment matcher over the decoded JSON body.
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub contains: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
	/// Terminal: forward the request (with any rewrites applied so far).
	Allow {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reason: Option<String>,
	},
	/// Terminal: reject the request with 403 and the given reason.
	Deny {
		#[serde(default)]
		reason: String,
	},
	/// Merge `update` into the body without clobbering existing scalars.
	Upsert {
		#[serde(default, skip_serializing_if = "Value::is_null")]
		update: Value,
	},
	/// When `contains` matches the body, overwrite-merge `update` into it.
	Replace {
		#[serde(default, skip_serializing_if = "Value::is_null")]
		contains: Value,
		#[serde(default, skip_serializing_if = "Value::is_null")]
		update: Value,
	},
	/// Remove the keys and elements matched by `contains`.
	Delete {
		#[serde(default, skip_serializing_if = "Value::is_null")]
		contains: Value,
	},
}

impl Action {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Action::Allow { .. } | Action::Deny { .. })
	}
}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
	#[error("at least one rule is required")]
	NoRules,
	#[error("settings.propagate_socket must be an absolute path")]
	PropagateSocketNotAbsolute,
	#[error("rule {0}: match.path must not be empty")]
	EmptyMatchPath(usize),
	#[error("rule {rule} action {action}: deny requires a reason")]
	DenyWithoutReason { rule: usize, action: usize },
	#[error("rule {rule} action {action}: {kind} requires {field}")]
	MissingActionField {
		rule: usize,
		action: usize,
		kind: &'static str,
		field: &'static str,
	},
}

impl SocketConfig {
	pub fn validate(&self) -> Result<(), ValidationError> {
		if !self.settings.propagate_socket.is_empty()
			&& !self.settings.propagate_socket.starts_with('/')
		{
			return Err(ValidationError::PropagateSocketNotAbsolute);
		}
		if self.rules.is_empty() {
			return Err(ValidationError::NoRules);
		}
		for (r, rule) in self.rules.iter().enumerate() {
			if rule.matches.path.is_empty() {
				return Err(ValidationError::EmptyMatchPath(r));
			}
			for (a, action) in rule.actions.iter().enumerate() {
				match action {
					Action::Allow { .. } => {},
					Action::Deny { reason } => {
						if reason.is_empty() {
							return Err(ValidationError::DenyWithoutReason { rule: r, action: a });
						}
					},
					Action::Upsert { update } => {
						require(update, r, a, "upsert", "update")?;
					},
					Action::Replace { contains, update } => {
						require(contains, r, a, "replace", "contains")?;
						require(update, r, a, "replace", "update")?;
					},
					Action::Delete { contains } => {
						require(contains, r, a, "delete", "contains")?;
					},
				}
			}
		}
		Ok(())
	}

	/// True when evaluating this policy can depend on the request body: either
	/// a match clause inspects it or some action would rewrite it.
	pub fn requires_body(&self) -> bool {
		!self.settings.propagate_socket.is_empty()
			|| self.rules.iter().any(|rule| {
				!rule.matches.contains.is_null()
					|| rule.actions.iter().any(|action| !action.is_terminal())
			})
	}
}

fn require(
	value: &Value,
	rule: usize,
	action: usize,
	kind: &'static str,
	field: &'static str,
) -> Result<(), ValidationError> {
	if value.is_null() {
		return Err(ValidationError::MissingActionField {
			rule,
			action,
			kind,
			field,
		});
	}
	Ok(())
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
