//! Property tests for rule matching and classification

use inbox_agent::rules::matches;
use inbox_agent::sorter::plan;
use inbox_agent::{categorize, is_spam, EmailClassifier, Header, Message, MessagePart, Rule, RuleSet};
use proptest::prelude::*;

fn message(sender: &str, subject: &str, labels: Vec<String>) -> Message {
    Message {
        id: "m".to_string(),
        label_ids: labels,
        payload: Some(MessagePart {
            headers: vec![Header::new("From", sender), Header::new("Subject", subject)],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn needles() -> impl Strategy<Value = Option<Vec<String>>> {
    prop::option::of(prop::collection::vec("[a-zA-Z]{1,3}", 0..3))
}

fn rule() -> impl Strategy<Value = Rule> {
    (
        needles(),
        needles(),
        prop::collection::vec("[A-Z][a-z]{2,6}", 1..3),
    )
        .prop_map(|(subject, sender, labels)| Rule {
            any_subject_contains: subject,
            any_sender_contains: sender,
            assign_labels: labels,
        })
}

fn label_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec!["INBOX", "SPAM", "UNREAD", "spam", "Label_1", "CATEGORY_UPDATES"]),
        0..4,
    )
    .prop_map(|ids| ids.into_iter().map(str::to_string).collect())
}

proptest! {
    #[test]
    fn empty_or_absent_payload_yields_nothing(rules in prop::collection::vec(rule(), 0..5)) {
        let mut rules = rules;
        rules.push(Rule::catch_all(&["All"]));
        let rules = RuleSet::new(rules);

        let mut msg = message("a@b.c", "x", Vec::new());
        msg.payload = None;
        prop_assert!(categorize(&msg, &rules).is_empty());

        msg.payload = Some(MessagePart::default());
        prop_assert!(categorize(&msg, &rules).is_empty());
    }

    #[test]
    fn rules_after_the_first_match_do_not_matter(
        rules in prop::collection::vec(rule(), 1..6),
        extra in prop::collection::vec(rule(), 0..4),
        sender in "[a-zA-Z@. ]{0,20}",
        subject in "[a-zA-Z ]{0,24}",
    ) {
        let msg = message(&sender, &subject, Vec::new());
        let payload = msg.payload.clone().unwrap_or_default();
        let first = rules.iter().position(|r| matches(&payload, r));
        prop_assume!(first.is_some());
        let first = first.unwrap_or_default();

        let baseline = categorize(&msg, &RuleSet::new(rules.clone()));
        prop_assert_eq!(&baseline, &rules[first].assign_labels);

        let mut reordered: Vec<Rule> = rules[..=first].to_vec();
        let mut tail: Vec<Rule> = rules[first + 1..].to_vec();
        tail.reverse();
        reordered.extend(tail);
        reordered.extend(extra);
        reordered.push(Rule::catch_all(&["Fallback"]));

        prop_assert_eq!(categorize(&msg, &RuleSet::new(reordered)), baseline);
    }

    #[test]
    fn catch_all_labels_every_message(
        sender in "[a-zA-Z@. ]{0,20}",
        subject in "[a-zA-Z ]{0,24}",
    ) {
        let rules = RuleSet::new(vec![Rule::catch_all(&["Everything"])]);
        let msg = message(&sender, &subject, Vec::new());
        prop_assert_eq!(categorize(&msg, &rules), vec!["Everything".to_string()]);
    }

    #[test]
    fn is_spam_iff_spam_label_present(labels in label_ids()) {
        let msg = message("a@b.c", "x", labels.clone());
        prop_assert_eq!(is_spam(&msg), labels.iter().any(|l| l == "SPAM"));
    }

    #[test]
    fn spam_never_enters_a_plan(
        labels in label_ids(),
        subject in "[a-zA-Z ]{0,24}",
    ) {
        let mut labels = labels;
        labels.push("SPAM".to_string());
        let classifier = EmailClassifier::new(RuleSet::new(vec![Rule::catch_all(&["All"])]));

        let messages = vec![message("x@y.z", &subject, labels)];
        prop_assert!(plan(&classifier, &messages).is_empty());
    }

    #[test]
    fn subject_matching_ignores_case(
        needle in "[a-z]{1,6}",
        prefix in "[a-z ]{0,8}",
        suffix in "[a-z ]{0,8}",
    ) {
        let rule = Rule {
            any_subject_contains: Some(vec![needle.to_uppercase()]),
            any_sender_contains: None,
            assign_labels: vec!["Hit".to_string()],
        };
        let subject = format!("{}{}{}", prefix, needle, suffix).to_uppercase();
        let msg = message("a@b.c", &subject, Vec::new());
        prop_assert_eq!(categorize(&msg, &RuleSet::new(vec![rule])), vec!["Hit".to_string()]);
    }
}

#[test]
fn empty_rule_set_labels_nothing() {
    let msg = message("billing@shop.example", "Your Invoice #123", Vec::new());
    assert!(categorize(&msg, &RuleSet::default()).is_empty());
}

#[test]
fn invoice_rule_example() {
    let rules = RuleSet::from_yaml_str(
        "rules:\n  - any_subject_contains: [\"invoice\"]\n    assign_labels: [\"Finance\"]\n",
    )
    .unwrap();

    let invoice = message("billing@shop.example", "Your Invoice #123", Vec::new());
    let hello = message("friend@example.com", "Hello", Vec::new());
    assert_eq!(categorize(&invoice, &rules), vec!["Finance"]);
    assert!(categorize(&hello, &rules).is_empty());
}
