use crate::error::Result;
use mapping_protocol::MappingRule;
use serde_json::Value;

/// Applies `patch` onto `target` in place.
///
/// Objects merge recursively. Any other patch value, `null` included,
/// replaces the target value, so a field can be nulled but never removed.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_patch(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Returns `rule` with `patch` merged in. The rule keeps its id.
pub fn patch_rule(rule: &MappingRule, patch: &Value) -> Result<MappingRule> {
    let mut value = serde_json::to_value(rule)?;
    merge_patch(&mut value, patch);
    let mut patched: MappingRule = serde_json::from_value(value)?;
    patched.set_id(rule.id());
    Ok(patched)
}
