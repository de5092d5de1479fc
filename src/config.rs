//! Tracker configuration.
//!
//! Thresholds for the identity resolver, comparator weights, scoring weights
//! and priority bands, and graph traversal limits. Loaded from YAML with every
//! field optional, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrackerError};
use crate::models::ScoreWeights;

/// Tolerance for "weights sum to 1.0"
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Priority levels run from 1 to this value
pub const MAX_PRIORITY_BANDS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub resolver: ResolverConfig,
    pub comparator: ComparatorWeights,
    pub scoring: ScoringConfig,
    pub graph: GraphConfig,
}

/// Identity resolver thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum similarity to link a record to an existing actor (τ_merge).
    pub merge_threshold: f64,

    /// Required lead of the best match over the runner-up (δ).
    ///
    /// A runner-up within this margin makes the decision ambiguous and the
    /// record goes to manual review.
    pub ambiguity_margin: f64,

    /// Maximum candidate actors scored per record.
    pub candidate_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.85,
            ambiguity_margin: 0.05,
            candidate_limit: 50,
        }
    }
}

/// Weights for the default name/attribute comparator.
///
/// Signals missing on either side drop out and the remaining weights are
/// renormalized, so an unknown nationality neither helps nor hurts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorWeights {
    pub name: f64,
    pub nationality: f64,
    pub organization: f64,
    pub temporal: f64,
}

impl Default for ComparatorWeights {
    fn default() -> Self {
        Self {
            name: 0.70,
            nationality: 0.15,
            organization: 0.10,
            temporal: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,

    /// Descending score thresholds; score >= thresholds[i] gets priority i + 1,
    /// anything below the last gets the lowest priority.
    pub priority_thresholds: Vec<f64>,

    /// Verified-evidence count at which the count factor reaches 0.5.
    pub evidence_half_saturation: f64,

    /// Centrality at which the centrality component reaches 0.5.
    pub centrality_half_saturation: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            priority_thresholds: vec![0.85, 0.65, 0.45, 0.25],
            evidence_half_saturation: 3.0,
            centrality_half_saturation: 10.0,
        }
    }
}

impl ScoringConfig {
    /// Map a score onto a priority band (1 = highest).
    pub fn priority_level(&self, score: f64) -> u8 {
        let band = self
            .priority_thresholds
            .iter()
            .position(|threshold| score >= *threshold)
            .unwrap_or(self.priority_thresholds.len());
        (band + 1) as u8
    }

    pub fn lowest_priority(&self) -> u8 {
        (self.priority_thresholds.len() + 1) as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Optional hard cap on traversal steps; the node count always bounds it.
    pub max_traversal_steps: Option<usize>,
}

impl TrackerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `TNR_*` environment overrides on top of the loaded values.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("TNR_MERGE_THRESHOLD") {
            self.resolver.merge_threshold = parse_f64("TNR_MERGE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("TNR_AMBIGUITY_MARGIN") {
            self.resolver.ambiguity_margin = parse_f64("TNR_AMBIGUITY_MARGIN", &v)?;
        }
        if let Some(v) = lookup("TNR_SCORE_WEIGHTS") {
            let parts = v
                .split(',')
                .map(|p| parse_f64("TNR_SCORE_WEIGHTS", p.trim()))
                .collect::<Result<Vec<_>>>()?;
            let [e, c, s] = parts[..] else {
                return Err(TrackerError::Config(format!(
                    "TNR_SCORE_WEIGHTS expects three comma-separated values, got '{}'",
                    v
                )));
            };
            self.scoring.weights = ScoreWeights::new(e, c, s);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.resolver;
        unit("resolver.merge_threshold", r.merge_threshold)?;
        unit("resolver.ambiguity_margin", r.ambiguity_margin)?;
        if r.candidate_limit == 0 {
            return Err(TrackerError::Config(
                "resolver.candidate_limit must be positive".into(),
            ));
        }

        let c = &self.comparator;
        for (name, w) in [
            ("comparator.name", c.name),
            ("comparator.nationality", c.nationality),
            ("comparator.organization", c.organization),
            ("comparator.temporal", c.temporal),
        ] {
            unit(name, w)?;
        }
        if c.name <= 0.0 {
            return Err(TrackerError::Config(
                "comparator.name weight must be positive".into(),
            ));
        }

        let s = &self.scoring;
        for (name, w) in [
            ("scoring.weights.evidence", s.weights.evidence),
            ("scoring.weights.centrality", s.weights.centrality),
            ("scoring.weights.severity", s.weights.severity),
        ] {
            unit(name, w)?;
        }
        if (s.weights.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(TrackerError::Config(format!(
                "scoring weights must sum to 1.0, got {}",
                s.weights.sum()
            )));
        }
        if s.priority_thresholds.is_empty() || s.priority_thresholds.len() > MAX_PRIORITY_BANDS - 1 {
            return Err(TrackerError::Config(format!(
                "scoring.priority_thresholds needs between 1 and {} values",
                MAX_PRIORITY_BANDS - 1
            )));
        }
        let in_open_unit = s.priority_thresholds.iter().all(|t| *t > 0.0 && *t < 1.0);
        let descending = s.priority_thresholds.windows(2).all(|w| w[0] > w[1]);
        if !in_open_unit || !descending {
            return Err(TrackerError::Config(format!(
                "scoring.priority_thresholds must be strictly descending within (0, 1): {:?}",
                s.priority_thresholds
            )));
        }
        if s.evidence_half_saturation <= 0.0 || s.centrality_half_saturation <= 0.0 {
            return Err(TrackerError::Config(
                "scoring saturation constants must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn merge_threshold(mut self, threshold: f64) -> Self {
        self.resolver.merge_threshold = threshold;
        self
    }

    pub fn ambiguity_margin(mut self, margin: f64) -> Self {
        self.resolver.ambiguity_margin = margin;
        self
    }

    pub fn score_weights(mut self, weights: ScoreWeights) -> Self {
        self.scoring.weights = weights;
        self
    }
}

fn unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrackerError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| TrackerError::Config(format!("{} is not a number: '{}'", key, value)))
}
