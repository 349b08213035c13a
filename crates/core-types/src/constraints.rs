use serde::{Deserialize, Serialize};

/// One declarative linear restriction on a weight vector.
///
/// Tickers are resolved against the asset universe when the set is compiled
/// into matrices, so the same constraint list can be reused across windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// `w_i >= 0` for every asset.
    LongOnly,
    /// `w_i <= limit` for every asset.
    MaxWeight { limit: f64 },
    /// `w_i >= limit` for every asset.
    MinWeight { limit: f64 },
    /// `lower <= w_ticker <= upper`. Either side may be omitted.
    AssetBounds {
        ticker: String,
        #[serde(default)]
        lower: Option<f64>,
        #[serde(default)]
        upper: Option<f64>,
    },
    /// `Σ_{i in group} w_i <= limit`
    GroupMax { tickers: Vec<String>, limit: f64 },
    /// `Σ_{i in group} w_i >= limit`
    GroupMin { tickers: Vec<String>, limit: f64 },
    /// `Σ coefficient_i w_i <= bound`, coefficients keyed by ticker (missing means 0).
    LinearInequality {
        coefficients: Vec<(String, f64)>,
        bound: f64,
    },
    /// `Σ coefficient_i w_i = target`
    LinearEquality {
        coefficients: Vec<(String, f64)>,
        target: f64,
    },
    /// `μᵀw >= target`; needs expected returns.
    MinExpectedReturn { target: f64 },
}

impl Constraint {
    pub fn needs_expected_returns(&self) -> bool {
        matches!(self, Constraint::MinExpectedReturn { .. })
    }
}

fn default_fully_invested() -> bool {
    true
}

/// An ordered list of constraints plus the budget rule.
///
/// `fully_invested` adds the implicit `Σw = 1`; turning it off allows a cash
/// residual or leverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default = "default_fully_invested")]
    pub fully_invested: bool,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            constraints: Vec::new(),
            fully_invested: true,
        }
    }
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual long-only, fully invested set.
    pub fn long_only() -> Self {
        Self::new().with(Constraint::LongOnly)
    }

    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn allow_cash(mut self) -> Self {
        self.fully_invested = false;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn needs_expected_returns(&self) -> bool {
        self.constraints.iter().any(Constraint::needs_expected_returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_fully_invested() {
        let set = ConstraintSet::default();
        assert!(set.fully_invested);
        assert!(set.is_empty());
        assert!(!set.needs_expected_returns());
    }

    #[test]
    fn builder_keeps_declaration_order() {
        let set = ConstraintSet::long_only()
            .with(Constraint::MaxWeight { limit: 0.4 })
            .with(Constraint::MinExpectedReturn { target: 0.01 });
        let kinds: Vec<_> = set.iter().collect();
        assert_eq!(kinds[0], &Constraint::LongOnly);
        assert_eq!(kinds[1], &Constraint::MaxWeight { limit: 0.4 });
        assert!(set.needs_expected_returns());
    }
}
