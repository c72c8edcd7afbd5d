use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Raw description of one patch, as found in a patch set.
///
/// Only `url` is required; its presence is what distinguishes a patch from
/// a nested map. Keys this crate does not know about are kept in `extra`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PatchDescriptor {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub args: Option<PatchArgs>,
    #[serde(default)]
    pub title: Option<String>,
    /// Numbers and booleans are kept in their JSON spelling
    #[serde(default, deserialize_with = "scalar_id")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extra arguments for the patch tool.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PatchArgs {
    /// Whitespace separated, e.g. `"-l --ignore-whitespace"`
    Line(String),
    List(Vec<String>),
}

impl PatchArgs {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PatchArgs::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            PatchArgs::List(args) => args.clone(),
        }
    }
}

impl PatchDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha1: None,
            args: None,
            title: None,
            id: None,
            extra: Map::new(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map.clone()))
    }

    pub fn extra_args(&self) -> Vec<String> {
        self.args.as_ref().map(PatchArgs::to_vec).unwrap_or_default()
    }
}

fn scalar_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id)),
        Value::Number(id) => Ok(Some(id.to_string())),
        Value::Bool(id) => Ok(Some(id.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "patch id must be a string or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_fields_and_extra() {
        let value = json!({
            "url": "https://example.com/fix.diff",
            "sha1": "abc",
            "title": "Fix the thing",
            "id": "FIX-1",
            "type": "bugfix"
        });
        let descriptor: PatchDescriptor = serde_json::from_value(value).unwrap();

        assert_eq!(descriptor.url, "https://example.com/fix.diff");
        assert_eq!(descriptor.sha1.as_deref(), Some("abc"));
        assert_eq!(descriptor.title.as_deref(), Some("Fix the thing"));
        assert_eq!(descriptor.id.as_deref(), Some("FIX-1"));
        assert_eq!(descriptor.extra.get("type"), Some(&json!("bugfix")));
        assert!(!descriptor.extra.contains_key("url"));
    }

    #[test]
    fn test_args_as_line() {
        let descriptor: PatchDescriptor =
            serde_json::from_value(json!({"url": "x", "args": "-l  --ignore-whitespace"})).unwrap();
        assert_eq!(descriptor.extra_args(), vec!["-l", "--ignore-whitespace"]);
    }

    #[test]
    fn test_args_as_list() {
        let descriptor: PatchDescriptor =
            serde_json::from_value(json!({"url": "x", "args": ["-F", "3"]})).unwrap();
        assert_eq!(descriptor.extra_args(), vec!["-F", "3"]);
    }

    #[test]
    fn test_numeric_id() {
        let descriptor: PatchDescriptor =
            serde_json::from_value(json!({"url": "x", "id": 42})).unwrap();
        assert_eq!(descriptor.id.as_deref(), Some("42"));
        assert!(!descriptor.extra.contains_key("id"));

        let descriptor: PatchDescriptor =
            serde_json::from_value(json!({"url": "x", "id": null})).unwrap();
        assert_eq!(descriptor.id, None);

        let result: Result<PatchDescriptor, _> =
            serde_json::from_value(json!({"url": "x", "id": ["a"]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_url_must_be_string() {
        let result: Result<PatchDescriptor, _> = serde_json::from_value(json!({"url": 42}));
        assert!(result.is_err());
    }
}
