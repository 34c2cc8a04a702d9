use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, CorpusResult};

/// One row of the generic → domain table. The first `domain` entry is the one used for
/// substitution; the rest are kept so reports and prompts can show the alternatives.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TermEntry {
    pub generic: String,
    pub domain: Vec<String>,
}

/// Second-pass rewrite for questions that came out of substitution with no domain term.
///
/// `detect` is matched case-insensitively; `find` is replaced literally (case-sensitive),
/// so a rule can fire and still leave the question unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenerRule {
    pub detect: String,
    pub find: String,
    pub replace: String,
}

#[derive(Clone, Debug)]
struct CompiledTerm {
    generic_lower: String,
    candidates: Vec<String>,
    matcher: Regex,
}

/// Ordered, immutable vocabulary table with precompiled matchers.
#[derive(Clone, Debug)]
pub struct VocabularyMapping {
    terms: Vec<CompiledTerm>,
    domain_terms_lower: Vec<String>,
    openers: Vec<OpenerRule>,
}

impl VocabularyMapping {
    /// Build a mapping from entries in table order. A repeated `generic` keeps its first
    /// position and takes the later candidate list.
    pub fn new(entries: Vec<TermEntry>, openers: Vec<OpenerRule>) -> CorpusResult<Self> {
        let mut terms: Vec<CompiledTerm> = Vec::with_capacity(entries.len());
        for entry in entries {
            let generic_lower = entry.generic.trim().to_lowercase();
            if generic_lower.is_empty() {
                return Err(CorpusError::config("vocabulary entry with empty generic term"));
            }
            let candidates: Vec<String> = entry
                .domain
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if candidates.is_empty() {
                return Err(CorpusError::config(format!(
                    "vocabulary entry '{generic_lower}' has no domain terms"
                )));
            }
            if let Some(existing) = terms.iter_mut().find(|t| t.generic_lower == generic_lower) {
                existing.candidates = candidates;
                continue;
            }
            let matcher = Regex::new(&format!("(?i){}", regex::escape(&generic_lower)))
                .map_err(|e| {
                    CorpusError::config(format!("vocabulary term '{generic_lower}': {e}"))
                })?;
            terms.push(CompiledTerm {
                generic_lower,
                candidates,
                matcher,
            });
        }

        let mut domain_terms_lower: Vec<String> = Vec::new();
        for t in &terms {
            for c in &t.candidates {
                let c = c.to_lowercase();
                if !domain_terms_lower.contains(&c) {
                    domain_terms_lower.push(c);
                }
            }
        }

        for rule in &openers {
            if rule.detect.trim().is_empty() || rule.find.is_empty() {
                return Err(CorpusError::config("opener rule needs non-empty detect and find"));
            }
        }

        Ok(Self {
            terms,
            domain_terms_lower,
            openers,
        })
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_terms(), builtin_openers()).expect("builtin vocabulary")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn candidates(&self, generic: &str) -> Option<&[String]> {
        let key = generic.trim().to_lowercase();
        self.terms
            .iter()
            .find(|t| t.generic_lower == key)
            .map(|t| t.candidates.as_slice())
    }

    pub fn domain_terms(&self) -> &[String] {
        &self.domain_terms_lower
    }

    /// Rewrite a question into the domain vocabulary.
    ///
    /// Entries are tried in table order; the containment test runs against the original
    /// question while replacements accumulate on the working copy, so overlapping entries
    /// can substitute twice.
    #[must_use]
    pub fn rewrite(&self, question: &str) -> String {
        let question_lower = question.to_lowercase();
        let mut converted = question.to_string();
        for term in &self.terms {
            if !question_lower.contains(&term.generic_lower) {
                continue;
            }
            let replacement = term.candidates[0].as_str();
            converted = term
                .matcher
                .replace_all(&converted, NoExpand(replacement))
                .into_owned();
        }

        let converted_lower = converted.to_lowercase();
        if self
            .domain_terms_lower
            .iter()
            .any(|t| converted_lower.contains(t.as_str()))
        {
            return converted;
        }
        for rule in &self.openers {
            if converted_lower.contains(&rule.detect.to_lowercase()) {
                return converted.replace(&rule.find, &rule.replace);
            }
        }
        converted
    }
}

pub fn builtin_openers() -> Vec<OpenerRule> {
    [
        ("how many", "how many", "How many users"),
        ("list", "List", "List all campaigns"),
        ("what are", "What are", "What are all the"),
    ]
    .iter()
    .map(|(detect, find, replace)| OpenerRule {
        detect: detect.to_string(),
        find: find.to_string(),
        replace: replace.to_string(),
    })
    .collect()
}

pub fn builtin_terms() -> Vec<TermEntry> {
    BUILTIN_TERMS
        .iter()
        .map(|(generic, domain)| TermEntry {
            generic: generic.to_string(),
            domain: domain.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}

const BUILTIN_TERMS: &[(&str, &[&str])] = &[
    // entities
    ("departments", &["publishers", "advertisers", "bidders", "campaigns"]),
    ("employees", &["users", "customers", "viewers", "clicks"]),
    ("budget", &["revenue", "spend", "cost", "budget"]),
    ("companies", &["publishers", "advertisers", "platforms", "networks"]),
    ("schools", &["websites", "apps", "channels", "sites"]),
    ("students", &["users", "visitors", "customers", "audience"]),
    ("customers", &["users", "viewers", "clients", "audience"]),
    ("products", &["ads", "campaigns", "creatives", "placements"]),
    ("sales", &["impressions", "clicks", "conversions", "revenue"]),
    ("orders", &["requests", "bids", "impressions", "clicks"]),
    ("payments", &["revenue", "spend", "cost", "payments"]),
    ("branches", &["locations", "regions", "markets", "territories"]),
    ("ships", &["campaigns", "ads", "creatives", "placements"]),
    ("films", &["ads", "videos", "creatives", "content"]),
    ("movies", &["ads", "videos", "creatives", "content"]),
    ("books", &["ads", "creatives", "content", "materials"]),
    ("sports", &["campaigns", "ads", "activities", "events"]),
    ("games", &["campaigns", "ads", "activities", "events"]),
    ("directors", &["managers", "leaders", "operators", "controllers"]),
    // measures
    ("count", &["total", "count", "number", "sum"]),
    ("total", &["total", "sum", "count", "number"]),
    ("average", &["average", "mean", "avg", "typical"]),
    ("maximum", &["maximum", "highest", "peak", "top"]),
    ("minimum", &["minimum", "lowest", "bottom", "least"]),
    ("sum", &["sum", "total", "count", "number"]),
    // dimensions
    ("name", &["name", "title", "label", "identifier"]),
    ("type", &["type", "category", "classification", "group"]),
    ("status", &["status", "state", "condition", "phase"]),
    ("location", &["location", "region", "area", "market"]),
    ("date", &["date", "time", "period", "duration"]),
    ("year", &["year", "period", "timeframe", "duration"]),
    ("month", &["month", "period", "timeframe", "duration"]),
    ("day", &["day", "date", "time", "period"]),
    ("age", &["age", "duration", "period", "time"]),
    ("rank", &["rank", "position", "order", "level"]),
    ("value", &["value", "amount", "quantity", "measure"]),
    ("amount", &["amount", "value", "quantity", "measure"]),
    ("price", &["price", "cost", "value", "amount"]),
    ("cost", &["cost", "price", "value", "amount"]),
    ("enrollment", &["engagement", "participation", "involvement", "activity"]),
    ("population", &["audience", "users", "viewers", "participants"]),
    ("market_value", &["revenue", "value", "worth", "performance"]),
    ("tonnage", &["volume", "capacity", "size", "amount"]),
    ("nationality", &["origin", "source", "location", "region"]),
    ("headquarters", &["location", "region", "market", "area"]),
    ("industry", &["category", "type", "sector", "domain"]),
    ("affiliation", &["association", "connection", "relationship", "partnership"]),
    ("foundation", &["creation", "start", "beginning", "launch"]),
    ("establishment", &["creation", "start", "beginning", "launch"]),
    ("creation", &["creation", "start", "beginning", "launch"]),
    ("birth", &["creation", "start", "beginning", "launch"]),
    ("born", &["created", "started", "launched", "established"]),
    ("acting", &["temporary", "interim", "provisional", "acting"]),
    ("temporary", &["temporary", "interim", "provisional", "acting"]),
    ("permanent", &["permanent", "fixed", "stable", "established"]),
    ("public", &["public", "open", "accessible", "available"]),
    ("private", &["private", "restricted", "exclusive", "limited"]),
    ("scholarship", &["premium", "preferred", "priority", "special"]),
    ("tryout", &["test", "trial", "evaluation", "assessment"]),
    ("decision", &["result", "outcome", "status", "state"]),
    ("position", &["role", "function", "position", "category"]),
    ("striker", &["primary", "main", "key", "important"]),
    ("goalkeeper", &["secondary", "support", "backup", "auxiliary"]),
    ("defender", &["secondary", "support", "backup", "auxiliary"]),
    ("midfielder", &["secondary", "support", "backup", "auxiliary"]),
    ("forward", &["primary", "main", "key", "important"]),
    ("coach", &["manager", "leader", "supervisor", "controller"]),
    ("team", &["group", "team", "unit", "collective"]),
    ("league", &["category", "group", "class", "division"]),
    ("season", &["period", "timeframe", "duration", "cycle"]),
    ("match", &["event", "activity", "session", "engagement"]),
    ("game", &["event", "activity", "session", "engagement"]),
    ("tournament", &["event", "activity", "session", "engagement"]),
    ("competition", &["event", "activity", "session", "engagement"]),
    ("championship", &["event", "activity", "session", "engagement"]),
    ("winner", &["winner", "leader", "top", "best"]),
    ("loser", &["loser", "bottom", "worst", "least"]),
    ("score", &["score", "rating", "performance", "result"]),
    ("goal", &["goal", "target", "objective", "aim"]),
    ("assist", &["assist", "support", "help", "aid"]),
    ("red_card", &["penalty", "violation", "issue", "problem"]),
    ("yellow_card", &["warning", "caution", "alert", "notice"]),
    ("foul", &["violation", "penalty", "issue", "problem"]),
    ("corner", &["corner", "edge", "boundary", "limit"]),
    ("penalty", &["penalty", "violation", "issue", "problem"]),
    ("substitution", &["change", "replacement", "switch", "update"]),
    ("injury", &["issue", "problem", "disruption", "interruption"]),
    ("suspension", &["suspension", "pause", "stop", "halt"]),
    ("transfer", &["transfer", "move", "change", "shift"]),
    ("contract", &["contract", "agreement", "deal", "arrangement"]),
    ("salary", &["salary", "payment", "compensation", "reward"]),
    ("bonus", &["bonus", "reward", "incentive", "benefit"]),
    ("commission", &["commission", "fee", "charge", "cost"]),
    ("tax", &["tax", "fee", "charge", "cost"]),
    ("insurance", &["insurance", "protection", "coverage", "safety"]),
    ("medical", &["medical", "health", "care", "treatment"]),
    ("physical", &["physical", "health", "fitness", "condition"]),
    ("mental", &["mental", "psychological", "emotional", "cognitive"]),
    ("technical", &["technical", "skill", "ability", "capability"]),
    ("tactical", &["tactical", "strategic", "planning", "approach"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(entries: &[(&str, &[&str])]) -> VocabularyMapping {
        let entries = entries
            .iter()
            .map(|(g, d)| TermEntry {
                generic: g.to_string(),
                domain: d.iter().map(|s| s.to_string()).collect(),
            })
            .collect();
        VocabularyMapping::new(entries, builtin_openers()).expect("mapping")
    }

    #[test]
    fn substitutes_first_candidate() {
        let m = mapping(&[("departments", &["publishers", "advertisers"])]);
        assert_eq!(
            m.rewrite("How many departments are there?"),
            "How many publishers are there?"
        );
    }

    #[test]
    fn builtin_table_handles_the_reference_question() {
        let m = VocabularyMapping::builtin();
        assert_eq!(
            m.rewrite("How many departments are there?"),
            "How many publishers are there?"
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_replacement_keeps_its_own_casing() {
        let m = mapping(&[("departments", &["publishers"])]);
        assert_eq!(m.rewrite("DEPARTMENTS by Departments"), "publishers by publishers");
    }

    #[test]
    fn matches_inside_longer_words() {
        let m = mapping(&[("age", &["duration"])]);
        assert_eq!(m.rewrite("Show the average"), "Show the averduration");
    }

    #[test]
    fn overlapping_entries_can_substitute_twice() {
        // "sale" is in the original question, so it also rewrites inside "sale items".
        let m = mapping(&[("sales", &["sale items"]), ("sale", &["deal"])]);
        assert_eq!(m.rewrite("total sales"), "total deal items");
    }

    #[test]
    fn containment_is_tested_against_the_original_question() {
        let m = mapping(&[("a", &["b"]), ("b", &["c"])]);
        // "b" was not in the original so the second entry never fires.
        assert_eq!(m.rewrite("a"), "b");
    }

    #[test]
    fn opener_injected_when_no_domain_term_survives() {
        let m = mapping(&[("zzz", &["publishers"])]);
        assert_eq!(m.rewrite("how many are left?"), "How many users are left?");
        assert_eq!(m.rewrite("List them."), "List all campaigns them.");
        assert_eq!(m.rewrite("What are they?"), "What are all the they?");
    }

    #[test]
    fn opener_detection_is_case_insensitive_but_rewrite_is_literal() {
        let m = mapping(&[("zzz", &["publishers"])]);
        // "how many" detected, literal lowercase find does not match "How many".
        assert_eq!(m.rewrite("How many are left?"), "How many are left?");
    }

    #[test]
    fn only_first_matching_opener_applies() {
        let m = mapping(&[("zzz", &["publishers"])]);
        assert_eq!(
            m.rewrite("how many? List What are"),
            "How many users? List What are"
        );
    }

    #[test]
    fn repeated_generic_keeps_position_and_takes_last_candidates() {
        let m = mapping(&[("x", &["one"]), ("y", &["two"]), ("x", &["three"])]);
        assert_eq!(m.len(), 2);
        assert_eq!(m.candidates("X").expect("x"), &["three".to_string()]);
    }

    #[test]
    fn rejects_entries_without_candidates() {
        let err = VocabularyMapping::new(
            vec![TermEntry {
                generic: "x".into(),
                domain: vec![" ".into()],
            }],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CorpusError::Configuration(_)));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let m = mapping(&[("a.b", &["ok"])]);
        assert_eq!(m.rewrite("a.b axb"), "ok axb");
    }
}
