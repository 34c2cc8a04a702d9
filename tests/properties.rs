use proptest::prelude::*;
use serde_json::{json, Value};

use bi_intent_corpus::convert::CorpusConverter;
use bi_intent_corpus::corpus::TrainingExample;
use bi_intent_corpus::normalize::SchemaNormalizer;
use bi_intent_corpus::progress::ConsoleProgress;
use bi_intent_corpus::vocabulary::VocabularyMapping;

fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Count".to_string()),
        Just("Sum".to_string()),
        Just("Max".to_string()),
        Just("Geographic".to_string()),
        Just("Temporal".to_string()),
        Just("students".to_string()),
        Just("schools".to_string()),
        Just("revenue".to_string()),
        "[A-Za-z]{1,8}",
    ]
}

fn step_strategy() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec(name_strategy(), 0..4),
        prop::collection::vec(name_strategy(), 0..4),
        prop::collection::vec(name_strategy(), 0..4),
        any::<bool>(),
    )
        .prop_map(|(measures, dimensions, phrases, with_extra)| {
            let mut step = json!({
                "step_id": "step_1",
                "sub_question": "q",
                "measures": measures.iter().map(|n| json!({"name": n})).collect::<Vec<_>>(),
                "dimensions": dimensions.iter().map(|n| json!({"name": n})).collect::<Vec<_>>(),
                "unmatched_intents": phrases.iter().map(|p| json!({"phrase": p})).collect::<Vec<_>>(),
            });
            if with_extra {
                step["segments"] = json!(["keep"]);
            }
            step
        })
}

fn annotation_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(step_strategy(), 0..4)
        .prop_map(|steps| json!({"intent": "intents_discovery", "discovery_results": steps}))
}

fn len_at(v: &Value, step: usize, key: &str) -> usize {
    v["discovery_results"][step][key]
        .as_array()
        .map(Vec::len)
        .unwrap_or(0)
}

proptest! {
    #[test]
    fn normalizer_is_idempotent(annotation in annotation_strategy()) {
        let n = SchemaNormalizer::builtin();
        let once = n.normalize(&annotation);
        prop_assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn normalizer_preserves_arity(annotation in annotation_strategy()) {
        let n = SchemaNormalizer::builtin();
        let out = n.normalize(&annotation);
        let steps = annotation["discovery_results"].as_array().map(Vec::len).unwrap_or(0);
        prop_assert_eq!(out["discovery_results"].as_array().map(Vec::len).unwrap_or(0), steps);
        for i in 0..steps {
            for key in ["measures", "dimensions", "unmatched_intents"] {
                prop_assert_eq!(len_at(&out, i, key), len_at(&annotation, i, key));
            }
            prop_assert_eq!(&out["discovery_results"][i]["segments"], &annotation["discovery_results"][i]["segments"]);
        }
    }

    #[test]
    fn converter_keeps_positional_correspondence(
        questions in prop::collection::vec("[a-z ]{0,30}", 0..20),
        annotation in annotation_strategy(),
    ) {
        let vocab = VocabularyMapping::builtin();
        let norm = SchemaNormalizer::builtin();
        let conv = CorpusConverter::new(&vocab, &norm);
        let input: Vec<TrainingExample> = questions
            .iter()
            .map(|q| TrainingExample::new(q.clone(), annotation.clone()))
            .collect();
        let out = conv.convert_all(&input, &ConsoleProgress::quiet());
        prop_assert_eq!(out.len(), input.len());
        for (i, ex) in input.iter().enumerate() {
            prop_assert_eq!(&out[i], &conv.convert_example(ex));
            prop_assert_eq!(&out[i].input, &vocab.rewrite(&questions[i]));
        }
    }
}
