//! Mirrors the selected rule into a page address so a reload restores it.
//!
//! Everything here is best effort: unparsable addresses are logged and
//! ignored.

use reqwest::Url;

pub const RULE_ID_PARAM: &str = "ruleId";

/// `ruleId` query value of `address`, if present and non-empty.
pub fn rule_id_from_address(address: &str) -> Option<String> {
    let url = match Url::parse(address) {
        Ok(url) => url,
        Err(err) => {
            log::warn!("Ignoring unparsable address {address}: {err}");
            return None;
        }
    };
    url.query_pairs()
        .find(|(key, _)| key == RULE_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// `address` with its `ruleId` replaced (or removed for `None`), other query
/// parameters kept in order.
pub fn with_rule_id(address: &str, rule_id: Option<&str>) -> Option<String> {
    let mut url = match Url::parse(address) {
        Ok(url) => url,
        Err(err) => {
            log::warn!("Cannot update address {address}: {err}");
            return None;
        }
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != RULE_ID_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() || rule_id.is_some() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        if let Some(rule_id) = rule_id {
            pairs.append_pair(RULE_ID_PARAM, rule_id);
        }
    }
    Some(url.to_string())
}

/// Link to the rule editor page of `rule_id`.
pub fn editor_href(context: &str, project: &str, task: &str, rule_id: &str, inline: bool) -> String {
    format!(
        "{}/transform/{project}/{task}/editor/{rule_id}?inlineView={inline}",
        context.trim_end_matches('/')
    )
}

/// Page address kept in step with the current rule.
#[derive(Debug, Clone, Default)]
pub struct AddressSync {
    address: Option<String>,
}

impl AddressSync {
    pub fn new(address: Option<String>) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Rule id to restore on start-up.
    pub fn initial_rule_id(&self) -> Option<String> {
        self.address.as_deref().and_then(rule_id_from_address)
    }

    pub fn update(&mut self, rule_id: Option<&str>) {
        let Some(address) = self.address.as_deref() else {
            return;
        };
        if let Some(updated) = with_rule_id(address, rule_id) {
            self.address = Some(updated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_rule_id() {
        assert_eq!(
            rule_id_from_address("http://host/editor?x=1&ruleId=address").as_deref(),
            Some("address")
        );
        assert_eq!(rule_id_from_address("http://host/editor?ruleId="), None);
        assert_eq!(rule_id_from_address("not a url"), None);
    }

    #[test]
    fn replaces_rule_id_keeping_other_params() {
        assert_eq!(
            with_rule_id("http://host/e?ruleId=a&tab=2", Some("b")).as_deref(),
            Some("http://host/e?tab=2&ruleId=b")
        );
        assert_eq!(
            with_rule_id("http://host/e?ruleId=a", None).as_deref(),
            Some("http://host/e")
        );
        assert_eq!(with_rule_id("::", Some("b")), None);
    }

    #[test]
    fn sync_swallows_bad_addresses() {
        let mut sync = AddressSync::new(Some("bogus".to_string()));
        sync.update(Some("x"));
        assert_eq!(sync.address(), Some("bogus"));
        assert_eq!(sync.initial_rule_id(), None);

        let mut sync = AddressSync::new(Some("http://host/e".to_string()));
        sync.update(Some("city"));
        assert_eq!(sync.initial_rule_id().as_deref(), Some("city"));
    }

    #[test]
    fn builds_editor_link() {
        assert_eq!(
            editor_href("/di/", "movies", "t1", "address", true),
            "/di/transform/movies/t1/editor/address?inlineView=true"
        );
    }
}
