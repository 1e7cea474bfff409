use serde::{Deserialize, Serialize};

/// Bijective mapping between class names and `0..n_classes`.
///
/// Classes are kept sorted so the same label set always produces the same
/// codes, independent of the order the samples were read in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<Vec<_>>();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_unique() {
        let encoder = LabelEncoder::fit(&["sad", "happy", "sad", "angry"]);
        assert_eq!(encoder.classes(), ["angry", "happy", "sad"]);
        assert_eq!(encoder.encode("happy"), Some(1));
    }

    #[test]
    fn every_observed_label_round_trips() {
        let labels = ["neutral", "Positive", "negative", "neutral"];
        let encoder = LabelEncoder::fit(&labels);
        for label in labels {
            let code = encoder.encode(label).unwrap();
            assert_eq!(encoder.decode(code), Some(label));
        }
    }

    #[test]
    fn unknown_values_are_none() {
        let encoder = LabelEncoder::fit(&["a"]);
        assert_eq!(encoder.encode("b"), None);
        assert_eq!(encoder.decode(1), None);
    }
}
