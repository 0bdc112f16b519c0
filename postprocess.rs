use crate::error::{Error, Result};
use crate::models::ClassificationCandidate;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Maps a model class index to an identifier in the nutrient dataset.
pub trait NutrientIdLookup {
    fn nutrient_ref(&self, class_index: usize) -> Option<String>;
}

impl<F> NutrientIdLookup for F
where
    F: Fn(usize) -> Option<String>,
{
    fn nutrient_ref(&self, class_index: usize) -> Option<String> {
        self(class_index)
    }
}

/// Positional ids: class 0 becomes `"001"` with the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialIds {
    pub prefix: String,
    pub width: usize,
    pub first: usize,
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            width: 3,
            first: 1,
        }
    }
}

impl SequentialIds {
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }
}

impl NutrientIdLookup for SequentialIds {
    fn nutrient_ref(&self, class_index: usize) -> Option<String> {
        Some(format!(
            "{}{:0width$}",
            self.prefix,
            class_index + self.first,
            width = self.width
        ))
    }
}

/// Explicit per-class table for datasets without a positional convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTable(HashMap<usize, String>);

impl FromIterator<(usize, String)> for IdTable {
    fn from_iter<I: IntoIterator<Item = (usize, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl NutrientIdLookup for IdTable {
    fn nutrient_ref(&self, class_index: usize) -> Option<String> {
        self.0.get(&class_index).cloned()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl NutrientIdLookup for NoLookup {
    fn nutrient_ref(&self, _class_index: usize) -> Option<String> {
        None
    }
}

pub fn softmax(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let max_val = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut exps = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for v in values {
        let e = (v - max_val).exp();
        exps.push(e);
        sum += e;
    }
    if sum <= 0.0 {
        return vec![0.0; values.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

pub fn postprocess(
    scores: &[f32],
    labels: &[String],
    top_k: usize,
    threshold: f32,
    lookup: &dyn NutrientIdLookup,
) -> Result<Vec<ClassificationCandidate>> {
    if scores.len() != labels.len() {
        return Err(Error::LabelMismatch {
            labels: labels.len(),
            outputs: scores.len(),
        });
    }
    if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
        return Err(Error::Inference(format!(
            "non-finite score {} at class {idx}",
            scores[idx]
        )));
    }

    let probs = softmax(scores);
    let mut ranked: Vec<usize> = (0..probs.len()).collect();
    ranked.sort_by(|&a, &b| {
        probs[b]
            .partial_cmp(&probs[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    Ok(ranked
        .into_iter()
        .take_while(|&idx| probs[idx] >= threshold)
        .take(top_k)
        .map(|idx| ClassificationCandidate {
            label: labels[idx].clone(),
            confidence: round_confidence(probs[idx]),
            nutrient_ref: lookup.nutrient_ref(idx),
        })
        .collect())
}

fn round_confidence(prob: f32) -> f32 {
    (prob * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, -4.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_is_shift_invariant_and_overflow_safe() {
        let base = softmax(&[0.5, 1.5, -2.0]);
        let shifted = softmax(&[1000.5, 1001.5, 998.0]);
        for (a, b) in base.iter().zip(shifted.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(shifted.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn ranks_by_probability_with_index_tiebreak() {
        let names = labels(&["rice", "curry", "naan", "dal"]);
        let out = postprocess(&[1.0, 3.0, 1.0, 3.0], &names, 4, 0.0, &NoLookup).unwrap();
        let order: Vec<&str> = out.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, vec!["curry", "dal", "rice", "naan"]);
    }

    #[test]
    fn respects_top_k_and_threshold() {
        let names = labels(&["a", "b", "c", "d", "e"]);
        let scores = [5.0, 4.0, 0.0, -1.0, -2.0];
        let out = postprocess(&scores, &names, 3, 0.1, &NoLookup).unwrap();
        assert!(out.len() <= 3);
        assert!(out.iter().all(|c| c.confidence >= 0.1));
        assert_eq!(out.len(), 2);

        let none = postprocess(&scores, &names, 3, 0.99, &NoLookup).unwrap();
        assert!(none.is_empty());

        let zero_k = postprocess(&scores, &names, 0, 0.0, &NoLookup).unwrap();
        assert!(zero_k.is_empty());
    }

    #[test]
    fn threshold_uses_unrounded_probability() {
        // Two equal logits give exactly 0.5 each; three give 1/3 -> rounds to 0.33.
        let names = labels(&["x", "y", "z"]);
        let out = postprocess(&[0.0, 0.0, 0.0], &names, 3, 0.333, &NoLookup).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.confidence == 0.33));

        let out = postprocess(&[0.0, 0.0, 0.0], &names, 3, 0.334, &NoLookup).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn sequential_ids_are_zero_padded() {
        let names = labels(&["apple", "banana"]);
        let out = postprocess(&[0.0, 1.0], &names, 2, 0.0, &SequentialIds::default()).unwrap();
        assert_eq!(out[0].nutrient_ref.as_deref(), Some("002"));
        assert_eq!(out[1].nutrient_ref.as_deref(), Some("001"));
    }

    #[test]
    fn table_and_closure_lookups_are_injectable() {
        let names = labels(&["apple", "banana"]);
        let table: IdTable = [(1, "fdc-173944".to_string())].into_iter().collect();
        let out = postprocess(&[0.0, 1.0], &names, 2, 0.0, &table).unwrap();
        assert_eq!(out[0].nutrient_ref.as_deref(), Some("fdc-173944"));
        assert_eq!(out[1].nutrient_ref, None);

        let closure = |idx: usize| Some(format!("food-{idx}"));
        let out = postprocess(&[2.0, 1.0], &names, 1, 0.0, &closure).unwrap();
        assert_eq!(out[0].nutrient_ref.as_deref(), Some("food-0"));
    }

    #[test]
    fn rejects_mismatched_and_non_finite_scores() {
        let names = labels(&["apple"]);
        assert!(matches!(
            postprocess(&[0.0, 1.0], &names, 1, 0.0, &NoLookup),
            Err(Error::LabelMismatch { labels: 1, outputs: 2 })
        ));
        assert!(matches!(
            postprocess(&[f32::NAN], &names, 1, 0.0, &NoLookup),
            Err(Error::Inference(_))
        ));
    }

    #[test]
    fn confidence_is_rounded_to_two_decimals() {
        let names = labels(&["soup", "salad"]);
        let out = postprocess(&[2.0, 0.0], &names, 2, 0.0, &NoLookup).unwrap();
        // softmax -> 0.8808, 0.1192
        assert_eq!(out[0].confidence, 0.88);
        assert_eq!(out[1].confidence, 0.12);
    }
}
