use serde_json::map::Entry;
use serde_json::{Map, Value};

use super::value;

/// Merges `update` into `body` without clobbering anything already present.
/// Arrays of `K=V` strings (env-style) are treated as keyed sets: an update
/// entry replaces the element sharing its `K=` prefix, else appends. Other
/// arrays append elements not already present; scalars insert only when the
/// key is absent. Returns whether the body changed.
pub fn upsert(body: &mut Value, update: &Value) -> bool {
	let (Value::Object(body), Value::Object(update)) = (body, update) else {
		return false;
	};
	upsert_object(body, update)
}

fn upsert_object(body: &mut Map<String, Value>, update: &Map<String, Value>) -> bool {
	let mut dirty = false;
	for (key, uv) in update {
		let bv = match body.entry(key.clone()) {
			Entry::Vacant(slot) => {
				slot.insert(uv.clone());
				dirty = true;
				continue;
			},
			Entry::Occupied(slot) => slot.into_mut(),
		};
		match (bv, uv) {
			(Value::Object(bo), Value::Object(uo)) => {
				dirty |= upsert_object(bo, uo);
			},
			(Value::Array(ba), Value::Array(ua)) => {
				if is_keyed_set(ua) {
					for entry in ua {
						let Value::String(entry) = entry else { continue };
						dirty |= upsert_keyed(ba, entry);
					}
				} else {
					for entry in ua {
						if !ba.contains(entry) {
							ba.push(entry.clone());
							dirty = true;
						}
					}
				}
			},
			// A present scalar (or any type mismatch) is left alone.
			_ => {},
		}
	}
	dirty
}

/// True when every element is a `K=V` string, e.g. a Docker `Env` list.
fn is_keyed_set(items: &[Value]) -> bool {
	!items.is_empty()
		&& items
			.iter()
			.all(|item| matches!(item, Value::String(s) if s.contains('=')))
}

fn key_prefix(entry: &str) -> &str {
	entry.split('=').next().unwrap_or(entry)
}

fn upsert_keyed(items: &mut Vec<Value>, entry: &str) -> bool {
	let key = key_prefix(entry);
	for item in items.iter_mut() {
		let Value::String(existing) = item else {
			continue;
		};
		if key_prefix(existing) == key {
			if existing == entry {
				return false;
			}
			*item = Value::String(entry.to_string());
			return true;
		}
	}
	items.push(Value::String(entry.to_string()));
	true
}

/// When `contains` structurally matches the body, overwrite-merges `update`
/// into it: scalars overwrite, objects merge recursively, and arrays are
/// rebuilt as the update elements (each replacing its first replacement
/// candidate) followed by the untouched originals.
pub fn replace(body: &mut Value, contains: &Value, update: &Value) -> bool {
	if !value::match_value(contains, body) {
		return false;
	}
	replace_merge(body, update)
}

fn replace_merge(body: &mut Value, update: &Value) -> bool {
	match (body, update) {
		(Value::Object(bo), Value::Object(uo)) => {
			let mut dirty = false;
			for (key, uv) in uo {
				match bo.entry(key.clone()) {
					Entry::Vacant(slot) => {
						slot.insert(uv.clone());
						dirty = true;
					},
					Entry::Occupied(slot) => dirty |= replace_merge(slot.into_mut(), uv),
				}
			}
			dirty
		},
		(Value::Array(ba), Value::Array(ua)) => {
			let mut replaced = vec![false; ba.len()];
			for uv in ua {
				if let Some(i) =
					(0..ba.len()).find(|&i| !replaced[i] && is_replacement_candidate(uv, &ba[i]))
				{
					replaced[i] = true;
				}
			}
			let mut next: Vec<Value> = ua.clone();
			next.extend(
				ba.iter()
					.zip(&replaced)
					.filter(|(_, replaced)| !**replaced)
					.map(|(bv, _)| bv.clone()),
			);
			if *ba == next {
				false
			} else {
				*ba = next;
				true
			}
		},
		(bv, uv) => {
			if bv == uv {
				false
			} else {
				*bv = uv.clone();
				true
			}
		},
	}
}

/// Whether an update element stands in for an original array element: strings
/// pair up by their `K=` prefix, objects when they share at least one key
/// with a deep-equal value, everything else only when deep-equal.
fn is_replacement_candidate(update: &Value, original: &Value) -> bool {
	match (update, original) {
		(Value::String(u), Value::String(o)) => key_prefix(u) == key_prefix(o),
		(Value::Object(u), Value::Object(o)) => {
			u.iter().any(|(k, uv)| o.get(k).is_some_and(|ov| ov == uv))
		},
		_ => update == original,
	}
}

/// Removes from the body everything `contains` matches: object values recurse
/// (dropping keys whose sub-object empties out), array values remove every
/// element matched by any listed item (dropping the key when the array
/// empties), and scalar values drop the key when the current value matches.
pub fn delete(body: &mut Value, contains: &Value) -> bool {
	let (Value::Object(body), Value::Object(contains)) = (body, contains) else {
		return false;
	};
	delete_keys(body, contains)
}

fn delete_keys(body: &mut Map<String, Value>, contains: &Map<String, Value>) -> bool {
	let mut dirty = false;
	for (key, cv) in contains {
		let Some(bv) = body.get_mut(key) else {
			continue;
		};
		match cv {
			Value::Object(co) => {
				if let Value::Object(bo) = bv {
					dirty |= delete_keys(bo, co);
					if bo.is_empty() {
						body.remove(key);
						dirty = true;
					}
				}
			},
			Value::Array(items) => {
				if let Value::Array(arr) = bv {
					let before = arr.len();
					arr.retain(|el| !items.iter().any(|item| value::match_value(item, el)));
					if arr.len() != before {
						dirty = true;
					}
					if arr.is_empty() {
						body.remove(key);
						dirty = true;
					}
				}
			},
			scalar => {
				if value::match_value(scalar, bv) {
					body.remove(key);
					dirty = true;
				}
			},
		}
	}
	dirty
}

#[cfg(test)]
#[path = "rewrite_tests.rs"]
mod tests;
