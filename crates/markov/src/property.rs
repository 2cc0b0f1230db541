#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PropertyError {
    #[error("Cannot parse property '{0}', expected for example P<0.5 [F \"target\"] or R{{\"cost\"}}<=3 [F \"done\"]")]
    InvalidSyntax(String),

    #[error("Unsupported path formula '{0}', expected F \"label\" or \"label\" U \"label\"")]
    UnsupportedPath(String),

    #[error("Expected rewards only support eventually formulas, found '{0}'")]
    UnsupportedRewardPath(String),

    #[error("Invalid threshold {0}")]
    InvalidThreshold(String),
}

/// The comparison operator of a bounded property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparison {
    /// Returns the comparison that holds exactly when this one does not.
    pub fn negate(self) -> Self {
        match self {
            Comparison::Less => Comparison::GreaterEqual,
            Comparison::LessEqual => Comparison::Greater,
            Comparison::Greater => Comparison::LessEqual,
            Comparison::GreaterEqual => Comparison::Less,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Less => write!(f, "<"),
            Comparison::LessEqual => write!(f, "<="),
            Comparison::Greater => write!(f, ">"),
            Comparison::GreaterEqual => write!(f, ">="),
        }
    }
}

/// The bound `<comparison> threshold` on the value of a formula.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bound {
    pub comparison: Comparison,
    pub threshold: f64,
}

impl Bound {
    pub fn new(comparison: Comparison, threshold: f64) -> Self {
        Self { comparison, threshold }
    }

    /// Returns true iff the given value satisfies the bound. Infinite values
    /// compare as expected, so an infinite expected reward violates every
    /// upper bound.
    pub fn is_satisfied(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::Less => value < self.threshold,
            Comparison::LessEqual => value <= self.threshold,
            Comparison::Greater => value > self.threshold,
            Comparison::GreaterEqual => value >= self.threshold,
        }
    }

    /// Returns true iff this is an upper bound on the value, in which case the
    /// property is a safety property: revealing more of the chain can only
    /// increase the value.
    pub fn is_upper(&self) -> bool {
        matches!(self.comparison, Comparison::Less | Comparison::LessEqual)
    }

    /// Returns the bound that holds exactly when this one does not.
    pub fn negate(&self) -> Self {
        Self::new(self.comparison.negate(), self.threshold)
    }
}

/// The path formulas of the supported properties.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Formula {
    /// The probability of `constraint U target`, or `F target` when there is no constraint.
    Probability { constraint: Option<String>, target: String },

    /// The expected reward accumulated until reaching the target.
    Reward { reward_model: String, target: String },
}

impl Formula {
    /// Returns the label of the target states.
    pub fn target(&self) -> &str {
        match self {
            Formula::Probability { target, .. } => target,
            Formula::Reward { target, .. } => target,
        }
    }

    /// Returns the same formula with the target replaced by the given label.
    pub fn with_target(&self, label: &str) -> Formula {
        match self {
            Formula::Probability { constraint, .. } => Formula::Probability {
                constraint: constraint.clone(),
                target: label.to_string(),
            },
            Formula::Reward { reward_model, .. } => Formula::Reward {
                reward_model: reward_model.clone(),
                target: label.to_string(),
            },
        }
    }
}

/// A bounded reachability probability or expected reward property.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub formula: Formula,
    pub bound: Bound,
}

impl Property {
    pub fn new(formula: Formula, bound: Bound) -> Self {
        Self { formula, bound }
    }

    /// Creates the property `P <comparison> threshold [F target]`.
    pub fn reachability(target: &str, comparison: Comparison, threshold: f64) -> Self {
        Self::new(
            Formula::Probability {
                constraint: None,
                target: target.to_string(),
            },
            Bound::new(comparison, threshold),
        )
    }

    /// Creates the property `R{reward_model} <comparison> threshold [F target]`.
    pub fn expected_reward(reward_model: &str, target: &str, comparison: Comparison, threshold: f64) -> Self {
        Self::new(
            Formula::Reward {
                reward_model: reward_model.to_string(),
                target: target.to_string(),
            },
            Bound::new(comparison, threshold),
        )
    }

    /// Returns true iff the formula is an expected reward.
    pub fn is_reward(&self) -> bool {
        matches!(self.formula, Formula::Reward { .. })
    }

    /// Returns true iff the property bounds the value from above.
    pub fn is_safety(&self) -> bool {
        self.bound.is_upper()
    }

    /// Returns the property with the target replaced by the given label.
    pub fn with_target(&self, label: &str) -> Property {
        Property::new(self.formula.with_target(label), self.bound)
    }

    /// Returns the property that holds exactly when this one does not.
    pub fn negate(&self) -> Property {
        Property::new(self.formula.clone(), self.bound.negate())
    }

    /// Parses a property, see [Property::from_str].
    pub fn parse(text: &str) -> Result<Property, PropertyError> {
        text.parse()
    }
}

impl FromStr for Property {
    type Err = PropertyError;

    /// Parses properties of the forms `P<0.5 [F "target"]`,
    /// `P>=0.9 ["safe" U "goal"]` and `R{"cost"}<=3 [F "done"]`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let property_regex = Regex::new(r#"^\s*(P|R\{\s*"([^"]+)"\s*\})\s*(<=|>=|<|>)\s*([^\s\[]+)\s*\[\s*(.*?)\s*\]\s*$"#)
            .expect("Regex compilation should not fail");
        let eventually_regex = Regex::new(r#"^F\s+"([^"]+)"$"#).expect("Regex compilation should not fail");
        let until_regex = Regex::new(r#"^"([^"]+)"\s+U\s+"([^"]+)"$"#).expect("Regex compilation should not fail");

        let captures = property_regex
            .captures(text)
            .ok_or_else(|| PropertyError::InvalidSyntax(text.to_string()))?;

        let comparison = match &captures[3] {
            "<" => Comparison::Less,
            "<=" => Comparison::LessEqual,
            ">" => Comparison::Greater,
            _ => Comparison::GreaterEqual,
        };

        let threshold_txt = &captures[4];
        let threshold: f64 = threshold_txt
            .parse()
            .map_err(|_| PropertyError::InvalidThreshold(threshold_txt.to_string()))?;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(PropertyError::InvalidThreshold(threshold_txt.to_string()));
        }

        let path = &captures[5];
        let bound = Bound::new(comparison, threshold);
        if let Some(reward_model) = captures.get(2) {
            let (_, [target]) = eventually_regex
                .captures(path)
                .ok_or_else(|| PropertyError::UnsupportedRewardPath(path.to_string()))?
                .extract();

            Ok(Property::new(
                Formula::Reward {
                    reward_model: reward_model.as_str().to_string(),
                    target: target.to_string(),
                },
                bound,
            ))
        } else {
            if threshold > 1.0 {
                return Err(PropertyError::InvalidThreshold(threshold_txt.to_string()));
            }

            let formula = if let Some(eventually) = eventually_regex.captures(path) {
                Formula::Probability {
                    constraint: None,
                    target: eventually[1].to_string(),
                }
            } else if let Some(until) = until_regex.captures(path) {
                Formula::Probability {
                    constraint: Some(until[1].to_string()),
                    target: until[2].to_string(),
                }
            } else {
                return Err(PropertyError::UnsupportedPath(path.to_string()));
            };

            Ok(Property::new(formula, bound))
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.formula {
            Formula::Probability { constraint, target } => {
                write!(f, "P{}{} [", self.bound.comparison, self.bound.threshold)?;
                match constraint {
                    Some(constraint) => write!(f, "\"{constraint}\" U \"{target}\"]"),
                    None => write!(f, "F \"{target}\"]"),
                }
            }
            Formula::Reward { reward_model, target } => write!(
                f,
                "R{{\"{reward_model}\"}}{}{} [F \"{target}\"]",
                self.bound.comparison, self.bound.threshold
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        assert_eq!(
            Property::parse(r#"P<0.5 [F "target"]"#).unwrap(),
            Property::reachability("target", Comparison::Less, 0.5)
        );

        assert_eq!(
            Property::parse(r#"  P>=0.9 [ "safe" U "goal" ] "#).unwrap(),
            Property::new(
                Formula::Probability {
                    constraint: Some("safe".to_string()),
                    target: "goal".to_string()
                },
                Bound::new(Comparison::GreaterEqual, 0.9)
            )
        );

        assert_eq!(
            Property::parse(r#"R{"cost"}<=3 [F "done"]"#).unwrap(),
            Property::expected_reward("cost", "done", Comparison::LessEqual, 3.0)
        );
    }

    #[test]
    fn test_parse_invalid_properties() {
        assert!(matches!(
            Property::parse("P<0.5 F target"),
            Err(PropertyError::InvalidSyntax(_))
        ));
        assert!(matches!(
            Property::parse(r#"P<1.5 [F "target"]"#),
            Err(PropertyError::InvalidThreshold(_))
        ));
        assert!(matches!(
            Property::parse(r#"P<0.5 [G "target"]"#),
            Err(PropertyError::UnsupportedPath(_))
        ));
        assert!(matches!(
            Property::parse(r#"R{"cost"}<3 ["a" U "b"]"#),
            Err(PropertyError::UnsupportedRewardPath(_))
        ));
    }

    #[test]
    fn test_property_display_parses_back() {
        for text in [
            r#"P<0.5 [F "target"]"#,
            r#"P>=0.9 ["safe" U "goal"]"#,
            r#"R{"cost"}>2.5 [F "done"]"#,
        ] {
            let property = Property::parse(text).unwrap();
            assert_eq!(property.to_string(), text);
        }
    }

    #[test]
    fn test_bound_negation() {
        let property = Property::reachability("target", Comparison::Less, 0.5);
        assert!(property.is_safety());
        assert!(!property.negate().is_safety());

        for value in [0.0, 0.25, 0.5, 0.75, 1.0, f64::INFINITY] {
            assert_ne!(
                property.bound.is_satisfied(value),
                property.negate().bound.is_satisfied(value)
            );
        }

        assert!(!Bound::new(Comparison::LessEqual, 3.0).is_satisfied(f64::INFINITY));
    }
}
