//! Feature definitions: which tagged records belong to which feature

use std::{collections::BTreeMap, collections::HashMap, io::Read};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tags (key/value attributes) of a record
pub type Tags = HashMap<String, String>;

/// A predicate over the tags of a record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagRule {
    /// The tag `key` has the value `value`
    Equals { key: String, value: String },
    /// The tag `key` is present (any value)
    HasKey { key: String },
    /// At least one of the rules matches
    AnyOf(Vec<TagRule>),
}

impl TagRule {
    pub fn equals(key: &str, value: &str) -> Self {
        TagRule::Equals {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn has_key(key: &str) -> Self {
        TagRule::HasKey {
            key: key.to_string(),
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            TagRule::Equals { key, value } => tags.get(key).map_or(false, |v| v == value),
            TagRule::HasKey { key } => tags.contains_key(key),
            TagRule::AnyOf(rules) => rules.iter().any(|rule| rule.matches(tags)),
        }
    }
}

/// A named feature and its rule
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: String,
    pub rule: TagRule,
}

impl FeatureSpec {
    pub fn new(name: &str, rule: TagRule) -> Self {
        Self {
            name: name.to_string(),
            rule,
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.rule.matches(tags)
    }
}

/// The set of features to extract, keyed by name
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct FeatureSpecs {
    specs: BTreeMap<String, FeatureSpec>,
}

impl FeatureSpecs {
    pub fn new(specs: impl IntoIterator<Item = FeatureSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    /// Traffic signals, stop signs and traffic calming
    pub fn default_specs() -> Self {
        Self::new([
            FeatureSpec::new(
                "signals",
                TagRule::AnyOf(vec![
                    TagRule::equals("highway", "traffic_signals"),
                    TagRule::equals("crossing", "traffic_signals"),
                ]),
            ),
            FeatureSpec::new("stops", TagRule::equals("highway", "stop")),
            FeatureSpec::new("calming", TagRule::has_key("traffic_calming")),
        ])
    }

    /// The default features, plus give way signs, crossings
    /// and level crossings
    pub fn extended_specs() -> Self {
        let mut specs = Self::default_specs();
        specs.insert(FeatureSpec::new(
            "give_way",
            TagRule::equals("highway", "give_way"),
        ));
        specs.insert(FeatureSpec::new(
            "crossing",
            TagRule::equals("highway", "crossing"),
        ));
        specs.insert(FeatureSpec::new(
            "level_crossing",
            TagRule::equals("railway", "level_crossing"),
        ));
        specs
    }

    /// Selects features by name among the extended set
    pub fn select<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::extended_specs().subset(names)
    }

    /// Selects features by name among these specs
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut selected = Self::default();
        for name in names {
            let name = name.as_ref();
            match self.specs.get(name) {
                Some(spec) => selected.insert(spec.clone()),
                None => {
                    return Err(Error::UnknownFeatureSpec {
                        name: name.to_string(),
                        available: self.names().join(", "),
                    })
                }
            }
        }
        Ok(selected)
    }

    /// Reads specs from a JSON list of `{"name": ..., "rule": ...}` objects
    ///
    /// Names become file names, so they must be non-empty and must not
    /// contain path separators or be `.` or `..`
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let specs: Vec<FeatureSpec> = serde_json::from_reader(reader)
            .map_err(|e| Error::Config(format!("invalid feature specifications: {}", e)))?;
        for spec in specs.iter() {
            if !is_valid_name(&spec.name) {
                return Err(Error::Config(format!(
                    "invalid feature name '{}'",
                    spec.name
                )));
            }
        }
        Ok(Self::new(specs))
    }

    pub fn insert(&mut self, spec: FeatureSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    /// Sorted feature names
    pub fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.specs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}
