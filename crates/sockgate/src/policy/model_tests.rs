use assert_matches::assert_matches;
use serde_json::json;

use super::*;

fn parse(v: serde_json::Value) -> Result<SocketConfig, serde_json::Error> {
	serde_json::from_value(v)
}

#[test]
fn parses_every_action_kind() {
	let config = parse(json!({
		"settings": { "propagate_socket": "/var/run/docker.sock" },
		"rules": [
			{
				"match": { "path": "/v1\\..*/containers/create", "method": "POST" },
				"actions": [
					{ "action": "deny", "reason": "no privileged containers" },
				]
			},
			{
				"match": { "path": ".*", "contains": { "HostConfig": { "Privileged": true } } },
				"actions": [
					{ "action": "replace", "contains": { "HostConfig": { "Privileged": true } },
						"update": { "HostConfig": { "Privileged": false } } },
					{ "action": "upsert", "update": { "Env": ["A=1"] } },
					{ "action": "delete", "contains": { "Env": ["DEBUG=.*"] } },
					{ "action": "allow" },
				]
			}
		]
	}))
	.unwrap();
	assert_eq!(config.rules.len(), 2);
	assert_eq!(config.settings.propagate_socket, "/var/run/docker.sock");
	assert_matches!(config.rules[0].actions[0], Action::Deny { .. });
	assert!(config.rules[1].actions[3].is_terminal());
	assert!(config.validate().is_ok());
}

#[test]
fn rejects_unknown_action_tag() {
	assert!(
		parse(json!({
			"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "audit" }] }]
		}))
		.is_err()
	);
}

#[test]
fn rejects_unknown_settings_key() {
	assert!(parse(json!({ "settings": { "propagate": "/x" }, "rules": [] })).is_err());
}

#[test]
fn round_trips_through_serialization() {
	let config = parse(json!({
		"rules": [{
			"match": { "path": ".*", "method": "GET" },
			"actions": [{ "action": "allow" }]
		}]
	}))
	.unwrap();
	let echoed: SocketConfig =
		serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
	assert_eq!(config, echoed);
}

#[test]
fn validation_requires_rules() {
	assert_matches!(
		SocketConfig::default().validate(),
		Err(ValidationError::NoRules)
	);
}

#[test]
fn validation_requires_match_path() {
	let config = parse(json!({
		"rules": [{ "match": { "method": "GET" }, "actions": [{ "action": "allow" }] }]
	}))
	.unwrap();
	assert_matches!(config.validate(), Err(ValidationError::EmptyMatchPath(0)));
}

#[test]
fn validation_requires_deny_reason() {
	let config = parse(json!({
		"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "deny" }] }]
	}))
	.unwrap();
	assert_matches!(
		config.validate(),
		Err(ValidationError::DenyWithoutReason { rule: 0, action: 0 })
	);
}

#[test]
fn validation_requires_action_fields() {
	let upsert = parse(json!({
		"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "upsert" }] }]
	}))
	.unwrap();
	assert_matches!(
		upsert.validate(),
		Err(ValidationError::MissingActionField { kind: "upsert", field: "update", .. })
	);

	let replace = parse(json!({
		"rules": [{ "match": { "path": ".*" },
			"actions": [{ "action": "replace", "update": { "a": 1 } }] }]
	}))
	.unwrap();
	assert_matches!(
		replace.validate(),
		Err(ValidationError::MissingActionField { kind: "replace", field: "contains", .. })
	);

	let delete = parse(json!({
		"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "delete" }] }]
	}))
	.unwrap();
	assert_matches!(
		delete.validate(),
		Err(ValidationError::MissingActionField { kind: "delete", field: "contains", .. })
	);
}

#[test]
fn validation_requires_absolute_propagate_socket() {
	let config = parse(json!({
		"settings": { "propagate_socket": "docker.sock" },
		"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "allow" }] }]
	}))
	.unwrap();
	assert_matches!(
		config.validate(),
		Err(ValidationError::PropagateSocketNotAbsolute)
	);
}

#[test]
fn requires_body_reflects_policy_shape() {
	let acl_only = parse(json!({
		"rules": [{ "match": { "path": ".*", "method": "GET" }, "actions": [{ "action": "allow" }] }]
	}))
	.unwrap();
	assert!(!acl_only.requires_body());

	let with_contains = parse(json!({
		"rules": [{ "match": { "path": ".*", "contains": { "a": 1 } }, "actions": [{ "action": "allow" }] }]
	}))
	.unwrap();
	assert!(with_contains.requires_body());

	let with_rewrite = parse(json!({
		"rules": [{ "match": { "path": ".*" },
			"actions": [{ "action": "upsert", "update": { "a": 1 } }, { "action": "allow" }] }]
	}))
	.unwrap();
	assert!(with_rewrite.requires_body());

	let with_propagation = parse(json!({
		"settings": { "propagate_socket": "/run/docker.sock" },
		"rules": [{ "match": { "path": ".*" }, "actions": [{ "action": "allow" }] }]
	}))
	.unwrap();
	assert!(with_propagation.requires_body());
}
