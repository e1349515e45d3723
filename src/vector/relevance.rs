use serde::{Deserialize, Serialize};

pub const DEFAULT_STEEPNESS: f32 = 8.0;
pub const DEFAULT_MIDPOINT: f32 = 0.5;

/// Maps a squared-L2 distance between unit vectors (range `[0, 4]`) to a
/// relevance score in `[0, 1]`, higher meaning more relevant.
///
/// The function is stored in each persisted index manifest, so an index is
/// only ever queried with the function it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelevanceFn {
    /// `1 / (1 + exp(steepness * (d - midpoint)))`
    Logistic { steepness: f32, midpoint: f32 },
    /// `1 - sqrt(d) / sqrt(2)`, linear in euclidean distance
    UnitEuclidean,
}

impl Default for RelevanceFn {
    #[inline]
    fn default() -> Self {
        Self::Logistic {
            steepness: DEFAULT_STEEPNESS,
            midpoint: DEFAULT_MIDPOINT,
        }
    }
}

impl RelevanceFn {
    /// Score a squared distance
    #[inline]
    pub fn score(&self, squared_distance: f32) -> f32 {
        let d = squared_distance.max(0.0);
        let raw = match *self {
            Self::Logistic {
                steepness,
                midpoint,
            } => 1.0 / (1.0 + (steepness * (d - midpoint)).exp()),
            Self::UnitEuclidean => 1.0 - d.sqrt() / std::f32::consts::SQRT_2,
        };

        if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
    }

    /// Short human-readable description
    #[inline]
    pub fn describe(&self) -> String {
        match self {
            Self::Logistic {
                steepness,
                midpoint,
            } => format!("logistic(k={steepness}, m={midpoint})"),
            Self::UnitEuclidean => "unit-euclidean".to_string(),
        }
    }

    /// Reject parameters that would not produce a decreasing score
    #[inline]
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Logistic {
                steepness,
                midpoint,
            } => {
                if !steepness.is_finite() || steepness <= 0.0 {
                    return Err(format!("steepness must be positive, got {steepness}"));
                }
                if !midpoint.is_finite() || !(0.0..=4.0).contains(&midpoint) {
                    return Err(format!("midpoint must be within [0, 4], got {midpoint}"));
                }
                Ok(())
            }
            Self::UnitEuclidean => Ok(()),
        }
    }
}
