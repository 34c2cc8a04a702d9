use bi_intent_corpus::vocabulary::VocabularyMapping;

#[test]
fn builtin_vocabulary_rewrites_reference_questions() {
    let vocab = VocabularyMapping::builtin();
    let cases = [
        ("How many departments are there?", "How many publishers are there?"),
        (
            "What is the average age of all employees?",
            "What is the average age of all users?",
        ),
        (
            "Show the names of students with a budget over 100.",
            "Show the names of users with a revenue over 100.",
        ),
        (
            "List the names of the ships in the games.",
            "List the names of the campaigns in the campaigns.",
        ),
        (
            "How many heads of the departments are older than 56 ?",
            "How many heads of the publishers are older than 56 ?",
        ),
        ("List the name of all heads", "List the name of all heads"),
        ("what are the ages?", "what are the ages?"),
    ];
    for (question, expected) in cases {
        assert_eq!(vocab.rewrite(question), expected, "{question}");
    }
}

#[test]
fn rewrite_is_pure() {
    let vocab = VocabularyMapping::builtin();
    let q = "How many employees work in each department?";
    assert_eq!(vocab.rewrite(q), vocab.rewrite(q));
}
