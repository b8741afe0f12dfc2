//! Prediction result returned by the grading service.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};
use crate::grade::{CLASS_NAMES, DrGrade, NUM_GRADES};

/// Outcome of grading one fundus image.
///
/// Serializes to the `/predict` response body:
/// `{class, class_name, confidence, probabilities, class_names}`.
///
/// # Example
///
/// ```
/// use retina_types::Prediction;
///
/// let prediction = Prediction::from_probabilities(&[0.7, 0.1, 0.1, 0.05, 0.05])?;
/// assert_eq!(prediction.class_index, 0);
/// assert_eq!(prediction.class_name, "No DR");
/// assert!((prediction.confidence - 0.7).abs() < 1e-6);
/// # Ok::<(), retina_types::TypesError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index of the most probable grade.
    #[serde(rename = "class")]
    pub class_index: usize,

    /// Label of the most probable grade.
    pub class_name: String,

    /// Probability of the predicted grade.
    pub confidence: f32,

    /// Softmax distribution over all grades.
    pub probabilities: Vec<f32>,

    /// Labels for every grade, in class-index order.
    pub class_names: Vec<String>,
}

impl Prediction {
    /// Builds a prediction from a softmax distribution.
    ///
    /// The predicted class is the first index holding the maximum value.
    ///
    /// # Errors
    ///
    /// - [`TypesError::ProbabilityCount`] if the slice is not [`NUM_GRADES`] long
    /// - [`TypesError::InvalidProbability`] if any entry is negative or not finite
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self> {
        if probabilities.len() != NUM_GRADES {
            return Err(TypesError::probability_count(
                NUM_GRADES,
                probabilities.len(),
            ));
        }

        if let Some((index, &value)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0)
        {
            return Err(TypesError::invalid_probability(index, value));
        }

        let (class_index, confidence) = argmax(probabilities);

        Ok(Self {
            class_index,
            class_name: CLASS_NAMES[class_index].to_string(),
            confidence,
            probabilities: probabilities.to_vec(),
            class_names: CLASS_NAMES.iter().map(ToString::to_string).collect(),
        })
    }

    /// The predicted grade.
    #[must_use]
    pub fn grade(&self) -> DrGrade {
        DrGrade::ALL[self.class_index.min(NUM_GRADES - 1)]
    }

    /// Sum of the probability vector.
    #[must_use]
    pub fn probability_mass(&self) -> f32 {
        self.probabilities.iter().sum()
    }

    /// Returns `true` if the probabilities sum to 1 within `tolerance`.
    #[must_use]
    pub fn is_normalized(&self, tolerance: f32) -> bool {
        (self.probability_mass() - 1.0).abs() <= tolerance
    }
}

/// First index of the maximum value; ties resolve to the lowest index.
fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 { (i, v) } else { best }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn prediction_picks_argmax() {
        let p = Prediction::from_probabilities(&[0.05, 0.1, 0.15, 0.6, 0.1]).unwrap();
        assert_eq!(p.class_index, 3);
        assert_eq!(p.grade(), DrGrade::Severe);
        assert_eq!(p.class_name, p.class_names[p.class_index]);
        assert_relative_eq!(p.confidence, 0.6);
    }

    #[test]
    fn prediction_ties_resolve_to_first() {
        let p = Prediction::from_probabilities(&[0.3, 0.3, 0.2, 0.1, 0.1]).unwrap();
        assert_eq!(p.class_index, 0);
    }

    #[test]
    fn prediction_rejects_wrong_length() {
        let err = Prediction::from_probabilities(&[0.5, 0.5]).unwrap_err();
        assert_eq!(err, TypesError::probability_count(5, 2));
    }

    #[test]
    fn prediction_rejects_negative_or_nan() {
        let err = Prediction::from_probabilities(&[0.5, -0.1, 0.2, 0.2, 0.2]).unwrap_err();
        assert!(matches!(err, TypesError::InvalidProbability { index: 1, .. }));

        let err = Prediction::from_probabilities(&[0.5, 0.1, f32::NAN, 0.2, 0.2]).unwrap_err();
        assert!(matches!(err, TypesError::InvalidProbability { index: 2, .. }));
    }

    #[test]
    fn prediction_normalization() {
        let p = Prediction::from_probabilities(&[0.2, 0.2, 0.2, 0.2, 0.2]).unwrap();
        assert!(p.is_normalized(1e-5));

        let q = Prediction::from_probabilities(&[0.5, 0.5, 0.5, 0.0, 0.0]).unwrap();
        assert!(!q.is_normalized(1e-5));
    }

    #[test]
    fn prediction_json_shape() {
        let p = Prediction::from_probabilities(&[0.1, 0.1, 0.6, 0.1, 0.1]).unwrap();
        let json = serde_json::to_value(&p).unwrap();

        assert_eq!(json["class"], 2);
        assert_eq!(json["class_name"], "Moderate");
        assert_eq!(json["probabilities"].as_array().map(Vec::len), Some(5));
        assert_eq!(json["class_names"][4], "Proliferative");
        assert!(json.get("class_index").is_none());
    }
}
