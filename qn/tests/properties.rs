//! Property tests for the answer store and question types

use proptest::prelude::*;
use serde_json::{Value, json};

use questionnaire::{AnswerMap, AnswersMap, Engine, Question, QuestionType, Scope};

fn layer_strategy() -> impl Strategy<Value = AnswerMap> {
    prop::collection::btree_map("[a-d]", any::<i32>(), 0..4).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect::<AnswerMap>()
    })
}

// =============================================================================
// Answer Store
// =============================================================================

proptest! {
    #[test]
    fn resolve_returns_highest_layer(
        user in layer_strategy(),
        init in layer_strategy(),
        metadata in layer_strategy(),
        last in layer_strategy(),
        defaults in layer_strategy(),
        key in "[a-d]",
    ) {
        let mut answers = AnswersMap::new()
            .with_init(init.clone())
            .with_metadata(metadata.clone())
            .with_last(last.clone())
            .with_user_defaults(defaults.clone());
        answers.user = user.clone();

        let expected = [&user, &init, &metadata, &last, &defaults]
            .into_iter()
            .find_map(|layer| layer.get(&key).cloned());
        prop_assert_eq!(answers.resolve(&key), expected);
    }

    #[test]
    fn persist_view_never_contains_hidden(
        user in layer_strategy(),
        last in layer_strategy(),
        hidden in prop::collection::vec("[a-d]", 0..4),
    ) {
        let mut answers = AnswersMap::new().with_last(last);
        for (k, v) in user {
            answers.commit(k, v);
        }
        for key in &hidden {
            answers.hide(key.clone());
        }
        let view = answers.persist_view();
        for key in &hidden {
            prop_assert!(!view.contains_key(key));
        }
        prop_assert!(!view.contains_key("now"));
        prop_assert!(!view.contains_key("make_secret"));
    }

    #[test]
    fn combined_is_pure(last in layer_strategy(), init in layer_strategy()) {
        let answers = AnswersMap::new().with_last(last).with_init(init);
        let mut first = answers.combined();
        let mut second = answers.combined();
        for key in ["now", "make_secret"] {
            first.remove(key);
            second.remove(key);
        }
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Cast and redisplay
// =============================================================================

fn roundtrip(question_type: QuestionType, value: &Value, multiline: bool) -> Value {
    let typed = question_type.cast(value).expect("first cast");
    let shown = question_type.redisplay(&typed, multiline);
    let again = question_type.cast(&Value::String(shown)).expect("second cast");
    assert_eq!(typed, again, "{} did not survive redisplay", question_type);
    again
}

proptest! {
    #[test]
    fn int_redisplay_is_idempotent(n in any::<i64>()) {
        roundtrip(QuestionType::Int, &json!(n), false);
    }

    #[test]
    fn float_redisplay_is_idempotent(f in -1.0e12f64..1.0e12) {
        roundtrip(QuestionType::Float, &json!(f), false);
    }

    #[test]
    fn bool_redisplay_is_idempotent(b in any::<bool>()) {
        roundtrip(QuestionType::Bool, &json!(b), false);
    }

    #[test]
    fn str_redisplay_is_idempotent(s in "[a-zA-Z0-9 _-]{0,20}") {
        roundtrip(QuestionType::Str, &json!(s), false);
    }

    #[test]
    fn structured_redisplay_is_idempotent(
        entries in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..5),
        multiline in any::<bool>(),
    ) {
        let value = json!({ "items": entries });
        roundtrip(QuestionType::Json, &value, multiline);
        roundtrip(QuestionType::Yaml, &value, multiline);
    }
}

// =============================================================================
// Question scenarios
// =============================================================================

#[test]
fn absent_default_resolves_to_absent() {
    let engine = Engine::new();
    let answers = AnswersMap::new();
    let scope = Scope::new(&engine, &answers);
    for type_name in ["str", "int", "float", "bool"] {
        let q = Question::from_config("x", &json!({ "type": type_name }), false).expect("valid question");
        assert_eq!(q.effective_default(&scope).expect("default"), None, "{}", type_name);
    }
}

#[test]
fn when_literals_parse_in_any_case() {
    let engine = Engine::new();
    let answers = AnswersMap::new();
    let scope = Scope::new(&engine, &answers);
    let cases = [
        ("true", true),
        ("FALSE", false),
        ("Yes", true),
        ("no", false),
        ("1", true),
        ("0", false),
    ];
    for (literal, expected) in cases {
        let q = Question::from_config("x", &json!({ "when": literal }), false).expect("valid question");
        assert_eq!(q.should_ask(&scope).expect("when"), expected, "{}", literal);
    }
    let maybe = Question::from_config("x", &json!({ "when": "maybe" }), false).expect("valid question");
    assert!(matches!(
        maybe.should_ask(&scope),
        Err(questionnaire::QuestionError::InvalidType { .. })
    ));
}

#[test]
fn single_line_yaml_redisplay_is_flow_style() {
    let value = json!({ "a": [1, 2], "b": "x" });
    let shown = QuestionType::Yaml.redisplay(&value, false);
    assert!(!shown.contains('\n'), "expected one line, got {:?}", shown);
    assert_eq!(QuestionType::Yaml.cast(&Value::String(shown)).expect("cast"), value);
    assert!(QuestionType::Yaml.redisplay(&value, true).contains('\n'));
}
