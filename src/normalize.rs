use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CorpusError, CorpusResult};

/// Every phrase in `members` is rewritten to `canonical`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhraseGroup {
    pub members: Vec<String>,
    pub canonical: String,
}

/// Cosmetic rewrite of annotation values through closed lookup tables.
///
/// Only `discovery_results[].measures[].name`, `dimensions[].name` and
/// `unmatched_intents[].phrase` are touched. Anything missing or of an unexpected type is
/// passed through untouched; nothing is ever added or removed.
#[derive(Clone, Debug)]
pub struct SchemaNormalizer {
    measures: HashMap<String, String>,
    dimensions: HashMap<String, String>,
    phrases: HashMap<String, String>,
}

impl SchemaNormalizer {
    pub fn new(
        measures: HashMap<String, String>,
        dimensions: HashMap<String, String>,
        phrase_groups: &[PhraseGroup],
    ) -> CorpusResult<Self> {
        let mut phrases: HashMap<String, String> = HashMap::new();
        for group in phrase_groups {
            for member in &group.members {
                // first group listing a phrase owns it
                phrases
                    .entry(member.clone())
                    .or_insert_with(|| group.canonical.clone());
            }
        }
        check_fixed_points("measures", &measures)?;
        check_fixed_points("dimensions", &dimensions)?;
        check_fixed_points("phrase_groups", &phrases)?;
        Ok(Self {
            measures,
            dimensions,
            phrases,
        })
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_measures(), builtin_dimensions(), &builtin_phrase_groups())
            .expect("builtin normalizer tables")
    }

    /// Return a rewritten copy; the input is left as it was.
    #[must_use]
    pub fn normalize(&self, annotation: &Value) -> Value {
        let mut out = annotation.clone();
        self.normalize_in_place(&mut out);
        out
    }

    fn normalize_in_place(&self, annotation: &mut Value) {
        let Some(steps) = annotation
            .get_mut("discovery_results")
            .and_then(Value::as_array_mut)
        else {
            return;
        };
        for step in steps.iter_mut() {
            rewrite_list_key(step, "measures", "name", &self.measures);
            rewrite_list_key(step, "dimensions", "name", &self.dimensions);
            rewrite_list_key(step, "unmatched_intents", "phrase", &self.phrases);
        }
    }
}

fn rewrite_list_key(step: &mut Value, list: &str, key: &str, table: &HashMap<String, String>) {
    let Some(items) = step.get_mut(list).and_then(Value::as_array_mut) else {
        return;
    };
    for item in items.iter_mut() {
        let Some(slot) = item.get_mut(key) else {
            continue;
        };
        let replacement = slot.as_str().and_then(|s| table.get(s));
        if let Some(r) = replacement {
            *slot = Value::String(r.clone());
        }
    }
}

/// A table is only safe to apply repeatedly if every value it produces maps to itself.
fn check_fixed_points(table_name: &str, table: &HashMap<String, String>) -> CorpusResult<()> {
    for (from, to) in table {
        if let Some(next) = table.get(to) {
            if next != to {
                return Err(CorpusError::config(format!(
                    "{table_name}: '{from}' -> '{to}' is rewritten again to '{next}'"
                )));
            }
        }
    }
    Ok(())
}

pub fn builtin_measures() -> HashMap<String, String> {
    pairs(&[
        ("Count", "Total"),
        ("Average", "Average"),
        ("Max", "Maximum"),
        ("Min", "Minimum"),
        ("Sum", "Total"),
    ])
}

pub fn builtin_dimensions() -> HashMap<String, String> {
    pairs(&[
        ("Geographic", "Region"),
        ("Temporal", "Time"),
        ("Entity", "Entity"),
        ("Categorical", "Category"),
    ])
}

pub fn builtin_phrase_groups() -> Vec<PhraseGroup> {
    vec![
        group(&["departments", "employees", "customers", "students"], "users"),
        group(&["budget", "sales", "revenue"], "revenue"),
        group(&["companies", "schools", "organizations"], "publishers"),
    ]
}

fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn group(members: &[&str], canonical: &str) -> PhraseGroup {
    PhraseGroup {
        members: members.iter().map(|s| s.to_string()).collect(),
        canonical: canonical.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Value {
        json!({
            "intent": "intents_discovery",
            "discovery_results": [{
                "step_id": "step_1",
                "sub_question": "q",
                "measures": [{"name": "Count", "agg": "count"}, {"name": "Clicks"}],
                "dimensions": [{"name": "Geographic"}, {"label": "no name"}],
                "timegrain": null,
                "timeframe": null,
                "pattern": null,
                "segments": ["a"],
                "breakdowns": [],
                "unmatched_intents": [{"phrase": "students"}, {"phrase": "schools"}, {"phrase": "misc"}]
            }]
        })
    }

    #[test]
    fn rewrites_names_and_phrases_only() {
        let n = SchemaNormalizer::builtin();
        let out = n.normalize(&sample());
        let step = &out["discovery_results"][0];
        assert_eq!(step["measures"][0], json!({"name": "Total", "agg": "count"}));
        assert_eq!(step["measures"][1]["name"], "Clicks");
        assert_eq!(step["dimensions"][0]["name"], "Region");
        assert_eq!(step["dimensions"][1], json!({"label": "no name"}));
        assert_eq!(step["unmatched_intents"][0]["phrase"], "users");
        assert_eq!(step["unmatched_intents"][1]["phrase"], "publishers");
        assert_eq!(step["unmatched_intents"][2]["phrase"], "misc");
        assert_eq!(step["segments"], json!(["a"]));
    }

    #[test]
    fn input_is_not_mutated() {
        let n = SchemaNormalizer::builtin();
        let input = sample();
        let before = input.clone();
        let _ = n.normalize(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn odd_shapes_pass_through() {
        let n = SchemaNormalizer::builtin();
        for v in [
            json!(null),
            json!("text"),
            json!({"intent": "x"}),
            json!({"discovery_results": "not a list"}),
            json!({"discovery_results": [1, {"measures": "nope"}, {"measures": [{"name": 7}]}]}),
        ] {
            assert_eq!(n.normalize(&v), v);
        }
    }

    #[test]
    fn first_group_owns_a_shared_phrase() {
        let groups = vec![group(&["x"], "first"), group(&["x"], "second")];
        let n = SchemaNormalizer::new(HashMap::new(), HashMap::new(), &groups).expect("ok");
        let out = n.normalize(&json!({"discovery_results": [{"unmatched_intents": [{"phrase": "x"}]}]}));
        assert_eq!(out["discovery_results"][0]["unmatched_intents"][0]["phrase"], "first");
    }

    #[test]
    fn rejects_tables_that_are_not_idempotent() {
        let measures = pairs(&[("Count", "Total"), ("Total", "Sum")]);
        let err = SchemaNormalizer::new(measures, HashMap::new(), &[]).unwrap_err();
        assert!(matches!(err, CorpusError::Configuration(_)));
    }
}
