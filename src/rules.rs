//! Generic rule-based scorer.
//!
//! A [`RulePolicy`] is an ordered table of independent checks. Each check
//! reads one row `R` plus dataset facts `F` (and the reasons already
//! collected for the same row) and either contributes nothing or one weighted
//! [`Hit`]. The policy sums the weights, clamps to [`MAX_SCORE`], falls back to
//! a fixed reason when nothing fired, and classifies the result into a tier.

use log::trace;

use crate::models::RiskLevel;

pub const MAX_SCORE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub weight: u32,
    pub reason: String,
}

impl Hit {
    pub fn new(weight: u32, reason: impl Into<String>) -> Self {
        Self {
            weight,
            reason: reason.into(),
        }
    }
}

pub type Check<R, F> = fn(&R, &F, &[String]) -> Option<Hit>;

pub struct Rule<R, F> {
    pub name: &'static str,
    pub check: Check<R, F>,
}

/// Strictly-greater-than cutoffs for the High and Medium tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCutoffs {
    pub high_above: u32,
    pub medium_above: u32,
}

impl TierCutoffs {
    pub fn classify(&self, score: u32) -> RiskLevel {
        if score > self.high_above {
            RiskLevel::High
        } else if score > self.medium_above {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

pub struct RulePolicy<R: 'static, F: 'static> {
    pub name: &'static str,
    pub rules: &'static [Rule<R, F>],
    pub cutoffs: TierCutoffs,
    pub fallback_reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub score: u32,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

impl<R: 'static, F: 'static> RulePolicy<R, F> {
    pub fn assess(&self, row: &R, facts: &F) -> Assessment {
        let mut total = 0u32;
        let mut reasons = Vec::new();

        for rule in self.rules {
            if let Some(hit) = (rule.check)(row, facts, &reasons) {
                trace!("{}: {} fired (+{})", self.name, rule.name, hit.weight);
                total = total.saturating_add(hit.weight);
                reasons.push(hit.reason);
            }
        }

        let score = total.min(MAX_SCORE);
        if reasons.is_empty() {
            reasons.push(self.fallback_reason.to_string());
        }

        Assessment {
            score,
            level: self.cutoffs.classify(score),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(row: &u32, _: &(), _: &[String]) -> Option<Hit> {
        (*row >= 10).then(|| Hit::new(60, "big"))
    }

    fn odd(row: &u32, _: &(), _: &[String]) -> Option<Hit> {
        (*row % 2 == 1).then(|| Hit::new(50, "odd"))
    }

    fn piled_up(_: &u32, _: &(), reasons: &[String]) -> Option<Hit> {
        (reasons.len() >= 2).then(|| Hit::new(5, "piled up"))
    }

    const SAMPLE: RulePolicy<u32, ()> = RulePolicy {
        name: "sample",
        rules: &[
            Rule {
                name: "big",
                check: big,
            },
            Rule {
                name: "odd",
                check: odd,
            },
            Rule {
                name: "piled_up",
                check: piled_up,
            },
        ],
        cutoffs: TierCutoffs {
            high_above: 75,
            medium_above: 50,
        },
        fallback_reason: "nothing to see",
    };

    #[test]
    fn clamps_and_keeps_rule_order() {
        let assessment = SAMPLE.assess(&11, &());
        assert_eq!(assessment.score, MAX_SCORE);
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.reasons, vec!["big", "odd", "piled up"]);
    }

    #[test]
    fn falls_back_when_no_rule_fires() {
        let assessment = SAMPLE.assess(&2, &());
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.reasons, vec!["nothing to see"]);
    }

    #[test]
    fn composite_sees_only_earlier_reasons() {
        let assessment = SAMPLE.assess(&12, &());
        assert_eq!(assessment.score, 60);
        assert_eq!(assessment.level, RiskLevel::Medium);
        assert_eq!(assessment.reasons, vec!["big"]);
    }

    #[test]
    fn cutoffs_are_strict_and_monotonic() {
        let cutoffs = TierCutoffs {
            high_above: 75,
            medium_above: 45,
        };
        assert_eq!(cutoffs.classify(45), RiskLevel::Low);
        assert_eq!(cutoffs.classify(46), RiskLevel::Medium);
        assert_eq!(cutoffs.classify(75), RiskLevel::Medium);
        assert_eq!(cutoffs.classify(76), RiskLevel::High);
        for score in 0..MAX_SCORE {
            assert!(cutoffs.classify(score) <= cutoffs.classify(score + 1));
        }
    }
}
