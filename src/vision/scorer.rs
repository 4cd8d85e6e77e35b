use crate::config::ScorerConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SubScores {
    pub geometric: f32,
    pub color: f32,
    pub uniformity: f32,
    pub temporal: f32,
}

impl SubScores {
    pub fn weakest(&self) -> f32 {
        self.geometric
            .min(self.color)
            .min(self.uniformity)
            .min(self.temporal)
    }
}

/// Weighted confidence in 0..1. Any sub-score under the floor zeroes the
/// result regardless of the others.
pub fn score(scores: &SubScores, config: &ScorerConfig) -> f32 {
    if scores.weakest() < config.min_component_score {
        return 0.0;
    }
    let weighted = scores.geometric * config.geometric_weight
        + scores.color * config.color_weight
        + scores.uniformity * config.uniformity_weight
        + scores.temporal * config.temporal_weight;
    weighted.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weighted_sum_of_strong_scores() {
        let s = SubScores {
            geometric: 1.0,
            color: 0.8,
            uniformity: 0.9,
            temporal: 1.0,
        };
        assert_relative_eq!(score(&s, &ScorerConfig::default()), 0.925, epsilon = 1e-6);
    }

    #[test]
    fn one_weak_link_zeroes_confidence() {
        let s = SubScores {
            geometric: 1.0,
            color: 1.0,
            uniformity: 0.59,
            temporal: 1.0,
        };
        assert_eq!(score(&s, &ScorerConfig::default()), 0.0);
    }

    #[test]
    fn floor_is_inclusive() {
        let s = SubScores {
            geometric: 0.6,
            color: 0.6,
            uniformity: 0.6,
            temporal: 0.6,
        };
        assert_relative_eq!(score(&s, &ScorerConfig::default()), 0.6, epsilon = 1e-6);
    }
}
