//! Rule-based message classification and the spam membership test

use crate::models::Message;
use crate::rules::RuleSet;

/// Gmail's canonical spam label id
pub const SPAM_LABEL_ID: &str = "SPAM";

/// True if the message sits in Gmail's SPAM label
pub fn is_spam(message: &Message) -> bool {
    !message.label_ids.is_empty() && message.has_label(SPAM_LABEL_ID)
}

/// Labels proposed for `message` by the first matching rule.
///
/// A message without a payload (or with an empty one) classifies to no
/// labels, as does a message that no rule matches.
pub fn categorize(message: &Message, rules: &RuleSet) -> Vec<String> {
    match &message.payload {
        Some(payload) if !payload.is_empty() => rules
            .first_match(payload)
            .map(|labels| labels.to_vec())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Classifier bound to one rule set
#[derive(Debug, Clone, Default)]
pub struct EmailClassifier {
    rules: RuleSet,
}

impl EmailClassifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// See [`categorize`]
    pub fn categorize(&self, message: &Message) -> Vec<String> {
        categorize(message, &self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Header, MessagePart};
    use crate::rules::Rule;

    fn message(subject: &str, labels: &[&str]) -> Message {
        Message {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
            payload: Some(MessagePart {
                headers: vec![
                    Header::new("From", "Sender <sender@example.com>"),
                    Header::new("Subject", subject),
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn invoice_rules() -> RuleSet {
        RuleSet::from_yaml_str(
            "rules:\n  - any_subject_contains: [\"invoice\"]\n    assign_labels: [\"Finance\"]\n",
        )
        .unwrap()
    }

    #[test]
    fn test_invoice_scenario() {
        let rules = invoice_rules();
        assert_eq!(categorize(&message("Your Invoice #123", &[]), &rules), vec!["Finance"]);
        assert!(categorize(&message("Hello", &[]), &rules).is_empty());
    }

    #[test]
    fn test_absent_or_empty_payload_yields_nothing() {
        let rules = RuleSet::new(vec![Rule::catch_all(&["All"])]);

        let mut msg = message("x", &[]);
        msg.payload = None;
        assert!(categorize(&msg, &rules).is_empty());

        msg.payload = Some(MessagePart::default());
        assert!(categorize(&msg, &rules).is_empty());
    }

    #[test]
    fn test_empty_rule_set_labels_nothing() {
        assert!(categorize(&message("Your Invoice", &[]), &RuleSet::default()).is_empty());
    }

    #[test]
    fn test_is_spam() {
        assert!(is_spam(&message("x", &["INBOX", "SPAM"])));
        assert!(!is_spam(&message("x", &["INBOX"])));
        assert!(!is_spam(&message("x", &[])));
        // Label ids are exact; Gmail system ids are upper-case
        assert!(!is_spam(&message("x", &["spam"])));
    }

    #[test]
    fn test_classifier_wraps_rules() {
        let classifier = EmailClassifier::new(invoice_rules());
        assert_eq!(classifier.rules().len(), 1);
        assert_eq!(classifier.categorize(&message("invoice", &[])), vec!["Finance"]);
    }
}
