//! Diabetic-retinopathy severity grades.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Number of severity grades the classifier predicts.
pub const NUM_GRADES: usize = 5;

/// Display names, indexed by class id.
pub const CLASS_NAMES: [&str; NUM_GRADES] =
    ["No DR", "Mild", "Moderate", "Severe", "Proliferative"];

/// Ordinal diabetic-retinopathy severity grade.
///
/// The discriminant is the class index the model emits.
///
/// # Example
///
/// ```
/// use retina_types::DrGrade;
///
/// let grade = DrGrade::from_index(3)?;
/// assert_eq!(grade, DrGrade::Severe);
/// assert_eq!(grade.name(), "Severe");
/// assert!(grade > DrGrade::Moderate);
/// # Ok::<(), retina_types::TypesError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DrGrade {
    /// No apparent retinopathy.
    NoDr = 0,
    /// Mild non-proliferative retinopathy.
    Mild = 1,
    /// Moderate non-proliferative retinopathy.
    Moderate = 2,
    /// Severe non-proliferative retinopathy.
    Severe = 3,
    /// Proliferative retinopathy.
    Proliferative = 4,
}

impl DrGrade {
    /// All grades in class-index order.
    pub const ALL: [Self; NUM_GRADES] = [
        Self::NoDr,
        Self::Mild,
        Self::Moderate,
        Self::Severe,
        Self::Proliferative,
    ];

    /// Looks up a grade by class index.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidClassIndex`] when `index >= NUM_GRADES`.
    pub fn from_index(index: usize) -> Result<Self, TypesError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(TypesError::invalid_class_index(index, NUM_GRADES))
    }

    /// Class index of this grade.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label.
    #[must_use]
    pub const fn name(self) -> &'static str {
        CLASS_NAMES[self as usize]
    }
}

impl std::fmt::Display for DrGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DrGrade {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|grade| grade.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypesError::UnknownLabel(s.to_string()))
    }
}
