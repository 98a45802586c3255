//! The layered configuration document: agent definitions in a `universal`
//! layer and any number of named `branches`, plus engine settings and
//! per-function policies.
//!
//! Object key order in the document is significant (the first matching agent
//! wins), so layers are read into ordered entry lists rather than hash maps.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use super::agent::AgentDefinition;

pub const UNIVERSAL_LAYER: &str = "universal";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRoot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub universal: AgentLayer,
    #[serde(default, deserialize_with = "ordered_layers")]
    pub branches: Vec<(String, AgentLayer)>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub engine: EngineConfig,
    #[serde(default, deserialize_with = "null_as_default")]
    pub function_policies: BTreeMap<String, FunctionPolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct AgentLayer {
    pub items: Vec<(String, AgentDefinition)>,
    /// Entries that could not be read as agents. They never match a request.
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

impl<'de> Deserialize<'de> for AgentLayer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawLayer {
            #[serde(default, deserialize_with = "ordered_entries")]
            items: Vec<(String, Value)>,
        }

        let raw = RawLayer::deserialize(deserializer)?;
        let mut layer = AgentLayer::default();
        for (key, value) in raw.items {
            if !value.is_object() {
                layer.skipped.push(SkippedEntry { key, reason: "not an object".to_string() });
                continue;
            }
            match serde_json::from_value::<AgentDefinition>(value) {
                Ok(agent) => layer.items.push((key, agent)),
                Err(error) => layer.skipped.push(SkippedEntry { key, reason: error.to_string() }),
            }
        }
        Ok(layer)
    }
}

/// One agent in search order, with the layer it was found in.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    pub layer: &'a str,
    pub key: &'a str,
    pub agent: &'a AgentDefinition,
}

impl<'a> Candidate<'a> {
    /// Provenance tag: the agent's own `_layer` when set, else where it was found.
    pub fn layer_tag(&self) -> &'a str {
        let agent: &'a AgentDefinition = self.agent;
        agent.layer.as_deref().filter(|layer| !layer.is_empty()).unwrap_or(self.layer)
    }

    pub fn id(&self) -> &'a str {
        let agent: &'a AgentDefinition = self.agent;
        if agent.id.is_empty() {
            self.key
        } else {
            &agent.id
        }
    }
}

impl ConfigRoot {
    /// Every agent in search order: universal entries first, then each branch
    /// in document order, entries within a layer in document order.
    pub fn candidates(&self) -> Vec<Candidate<'_>> {
        let universal = self.universal.items.iter().map(|(key, agent)| Candidate {
            layer: UNIVERSAL_LAYER,
            key,
            agent,
        });
        let branches = self.branches.iter().flat_map(|(branch, layer)| {
            layer.items.iter().map(move |(key, agent)| Candidate { layer: branch, key, agent })
        });

        universal.chain(branches).collect()
    }

    /// Unreadable entries as `(layer, entry)`, in search order.
    pub fn skipped_entries(&self) -> Vec<(&str, &SkippedEntry)> {
        let universal = self.universal.skipped.iter().map(|entry| (UNIVERSAL_LAYER, entry));
        let branches = self.branches.iter().flat_map(|(branch, layer)| {
            layer.skipped.iter().map(move |entry| (branch.as_str(), entry))
        });

        universal.chain(branches).collect()
    }

    pub fn policy_for(&self, function_key: &str) -> Option<&FunctionPolicy> {
        self.function_policies.get(function_key)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Emit the per-request research record.
    #[serde(default = "default_true")]
    pub log_metadata: bool,
    /// Include raw message and reply text in the research record.
    #[serde(default)]
    pub log_content: bool,
    #[serde(default)]
    pub default_thinking_budget: Option<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kernel: KernelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            log_metadata: true,
            log_content: false,
            default_thinking_budget: None,
            kernel: KernelConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct KernelConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub public: KernelFlags,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private: KernelFlags,
}

/// Named boolean governance flags. Non-boolean values in the document are
/// ignored rather than failing the whole load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelFlags(BTreeMap<String, bool>);

impl KernelFlags {
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).unwrap_or(false)
    }

    /// Flags of `self`, with every flag named in `top` replaced by its value there.
    pub fn overlaid_with(&self, top: &KernelFlags) -> KernelFlags {
        let mut merged = self.0.clone();
        merged.extend(top.0.iter().map(|(name, enabled)| (name.clone(), *enabled)));
        KernelFlags(merged)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for KernelFlags {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, enabled)| (name.into(), enabled)).collect())
    }
}

impl<'de> Deserialize<'de> for KernelFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(name, value)| value.as_bool().map(|enabled| (name, enabled)))
                .collect(),
        ))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionPolicy {
    #[serde(default)]
    pub allow_full_solution: Option<bool>,
    #[serde(default)]
    pub require_criteria_for_evaluation: Option<bool>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn ordered_layers<'de, D>(deserializer: D) -> Result<Vec<(String, AgentLayer)>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<(String, Option<AgentLayer>)> = ordered_entries(deserializer)?;
    Ok(entries.into_iter().map(|(name, layer)| (name, layer.unwrap_or_default())).collect())
}

/// Reads a JSON object into `(key, value)` pairs in document order. `null`
/// reads as an empty list.
fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V> Visitor<'de> for EntriesVisitor<V>
    where
        V: Deserialize<'de>,
    {
        type Value = Vec<(String, V)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an object of named entries")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(EntriesVisitor(PhantomData))
}
