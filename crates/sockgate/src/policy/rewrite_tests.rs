use serde_json::json;

use super::*;

#[test]
fn upsert_appends_env_entries() {
	let mut body = json!({ "Env": ["EXISTING=1"] });
	assert!(upsert(&mut body, &json!({ "Env": ["ADDED=1"] })));
	assert_eq!(body, json!({ "Env": ["EXISTING=1", "ADDED=1"] }));
}

#[test]
fn upsert_replaces_env_entries_by_key() {
	let mut body = json!({ "Env": ["DEBUG=true", "KEEP=1"] });
	assert!(upsert(&mut body, &json!({ "Env": ["DEBUG=false"] })));
	assert_eq!(body, json!({ "Env": ["DEBUG=false", "KEEP=1"] }));
}

#[test]
fn upsert_plain_arrays_append_missing_elements_only() {
	let mut body = json!({ "CapDrop": ["ALL"] });
	assert!(upsert(&mut body, &json!({ "CapDrop": ["ALL", "NET_RAW"] })));
	assert_eq!(body, json!({ "CapDrop": ["ALL", "NET_RAW"] }));
}

#[test]
fn upsert_never_clobbers_scalars() {
	let mut body = json!({ "Image": "alpine" });
	assert!(!upsert(&mut body, &json!({ "Image": "debian" })));
	assert_eq!(body, json!({ "Image": "alpine" }));

	let mut body = json!({});
	assert!(upsert(&mut body, &json!({ "Image": "debian" })));
	assert_eq!(body, json!({ "Image": "debian" }));
}

#[test]
fn upsert_merges_objects_recursively() {
	let mut body = json!({ "HostConfig": { "Memory": 1 } });
	assert!(upsert(
		&mut body,
		&json!({ "HostConfig": { "Binds": ["/a:/a:ro"] } })
	));
	assert_eq!(
		body,
		json!({ "HostConfig": { "Memory": 1, "Binds": ["/a:/a:ro"] } })
	);
}

#[test]
fn upsert_leaves_type_mismatches_alone() {
	let mut body = json!({ "HostConfig": "odd" });
	assert!(!upsert(&mut body, &json!({ "HostConfig": { "Memory": 1 } })));
	assert_eq!(body, json!({ "HostConfig": "odd" }));
}

#[test]
fn upsert_is_idempotent() {
	let update = json!({
		"Env": ["ADDED=1"],
		"HostConfig": { "Binds": ["/a:/a:ro"] },
		"Labels": { "owner": "ops" }
	});
	let mut body = json!({ "Env": ["EXISTING=1"] });
	assert!(upsert(&mut body, &update));
	let after_first = body.clone();
	assert!(!upsert(&mut body, &update));
	assert_eq!(body, after_first);
}

#[test]
fn replace_needs_containment() {
	let mut body = json!({ "HostConfig": { "Privileged": false } });
	assert!(!replace(
		&mut body,
		&json!({ "HostConfig": { "Privileged": true } }),
		&json!({ "HostConfig": { "Privileged": false } })
	));
	assert_eq!(body, json!({ "HostConfig": { "Privileged": false } }));
}

#[test]
fn replace_overwrites_scalars() {
	let mut body = json!({ "HostConfig": { "Privileged": true, "Memory": 1 } });
	assert!(replace(
		&mut body,
		&json!({ "HostConfig": { "Privileged": true } }),
		&json!({ "HostConfig": { "Privileged": false } })
	));
	assert_eq!(
		body,
		json!({ "HostConfig": { "Privileged": false, "Memory": 1 } })
	);
}

#[test]
fn replace_substitutes_keyed_strings() {
	let mut body = json!({ "Env": ["DEBUG=true", "KEEP=1"] });
	assert!(replace(
		&mut body,
		&json!({ "Env": ["DEBUG=.*"] }),
		&json!({ "Env": ["DEBUG=false"] })
	));
	assert_eq!(body, json!({ "Env": ["DEBUG=false", "KEEP=1"] }));
}

#[test]
fn replace_substitutes_objects_sharing_a_key() {
	let mut body = json!({ "Mounts": [
		{ "Target": "/data", "ReadOnly": false },
		{ "Target": "/other", "ReadOnly": false }
	] });
	assert!(replace(
		&mut body,
		&json!({}),
		&json!({ "Mounts": [{ "Target": "/data", "ReadOnly": true }] })
	));
	assert_eq!(
		body,
		json!({ "Mounts": [
			{ "Target": "/data", "ReadOnly": true },
			{ "Target": "/other", "ReadOnly": false }
		] })
	);
}

#[test]
fn replace_keeps_unmatched_update_elements() {
	let mut body = json!({ "Env": ["KEEP=1"] });
	assert!(replace(
		&mut body,
		&json!({}),
		&json!({ "Env": ["NEW=1"] })
	));
	assert_eq!(body, json!({ "Env": ["NEW=1", "KEEP=1"] }));
}

#[test]
fn replace_inserts_missing_keys() {
	let mut body = json!({});
	assert!(replace(
		&mut body,
		&json!({}),
		&json!({ "HostConfig": { "Privileged": false } })
	));
	assert_eq!(body, json!({ "HostConfig": { "Privileged": false } }));
}

#[test]
fn delete_removes_matching_array_elements() {
	let mut body = json!({ "Env": ["DEBUG=true", "KEEP=1"] });
	assert!(delete(&mut body, &json!({ "Env": ["DEBUG=.*"] })));
	assert_eq!(body, json!({ "Env": ["KEEP=1"] }));
}

#[test]
fn delete_drops_emptied_arrays() {
	let mut body = json!({ "Env": ["DEBUG=true"], "Image": "alpine" });
	assert!(delete(&mut body, &json!({ "Env": ["DEBUG=.*"] })));
	assert_eq!(body, json!({ "Image": "alpine" }));
}

#[test]
fn delete_removes_matching_scalars() {
	let mut body = json!({ "Tty": true, "Image": "alpine" });
	assert!(delete(&mut body, &json!({ "Tty": true })));
	assert_eq!(body, json!({ "Image": "alpine" }));

	let mut body = json!({ "Tty": false });
	assert!(!delete(&mut body, &json!({ "Tty": true })));
	assert_eq!(body, json!({ "Tty": false }));
}

#[test]
fn delete_recurses_and_drops_emptied_objects() {
	let mut body = json!({ "HostConfig": { "Privileged": true }, "Image": "alpine" });
	assert!(delete(
		&mut body,
		&json!({ "HostConfig": { "Privileged": true } })
	));
	assert_eq!(body, json!({ "Image": "alpine" }));
}

#[test]
fn delete_ignores_absent_keys() {
	let mut body = json!({ "Image": "alpine" });
	assert!(!delete(&mut body, &json!({ "Env": ["DEBUG=.*"] })));
	assert_eq!(body, json!({ "Image": "alpine" }));
}
