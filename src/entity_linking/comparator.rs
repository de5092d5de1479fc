//! Pluggable name/attribute comparison
//!
//! The resolver only relies on the `NameComparator` contract: two match
//! profiles in, a similarity in [0, 1] out. Tuning match quality means
//! swapping the comparator, never touching the resolver.

use chrono::NaiveDate;
use strsim::jaro_winkler;

use super::normalize::{normalize_name, normalize_nationality, tokenize};
use crate::config::ComparatorWeights;
use crate::models::{Actor, NameFields, RawRecord};

/// The attributes a comparator may look at
#[derive(Debug, Clone, Default)]
pub struct MatchProfile {
    pub names: NameFields,
    pub nationality: Option<String>,
    pub organization: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl MatchProfile {
    pub fn from_record(record: &RawRecord) -> Self {
        Self {
            names: record.names.clone(),
            nationality: record.nationality.clone(),
            organization: record.organization.clone(),
            date_of_birth: record.date_of_birth,
        }
    }

    pub fn from_actor(actor: &Actor) -> Self {
        Self {
            names: actor.name_fields(),
            nationality: actor.nationality.clone(),
            organization: actor.organization.clone(),
            date_of_birth: actor.date_of_birth,
        }
    }

    /// Distinct normalized tokens across every name field, for candidate blocking
    pub fn blocking_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.names.all().flat_map(tokenize).collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }
}

/// Similarity strategy used by the identity resolver
pub trait NameComparator: Send + Sync {
    /// Similarity in [0, 1]; must be deterministic and symmetric
    fn compare(&self, left: &MatchProfile, right: &MatchProfile) -> f64;

    /// Short identifier recorded in logs
    fn name(&self) -> &'static str;
}

/// Token-based, diacritic/case-insensitive comparator weighted by
/// nationality, organization and birth-date agreement
#[derive(Debug, Clone, Default)]
pub struct WeightedNameComparator {
    weights: ComparatorWeights,
}

impl WeightedNameComparator {
    pub fn new(weights: ComparatorWeights) -> Self {
        Self { weights }
    }

    /// Best pairwise similarity across all name fields of both sides.
    ///
    /// Scripts never cross-match (Hangul vs Latin scores ~0), so pairing every
    /// field against every field is what makes this multilingual-aware.
    pub fn name_similarity(left: &NameFields, right: &NameFields) -> f64 {
        let mut best: f64 = 0.0;
        for l in left.all() {
            for r in right.all() {
                best = best.max(token_similarity(l, r));
                if best >= 1.0 {
                    return 1.0;
                }
            }
        }
        best
    }
}

impl NameComparator for WeightedNameComparator {
    fn compare(&self, left: &MatchProfile, right: &MatchProfile) -> f64 {
        let name = Self::name_similarity(&left.names, &right.names);

        let mut weighted = self.weights.name * name;
        let mut total = self.weights.name;

        let nationality = match (
            left.nationality.as_deref().and_then(normalize_nationality),
            right.nationality.as_deref().and_then(normalize_nationality),
        ) {
            (Some(a), Some(b)) => Some(if a == b { 1.0 } else { 0.0 }),
            _ => None,
        };
        if let Some(agreement) = nationality {
            weighted += self.weights.nationality * agreement;
            total += self.weights.nationality;
        }

        if let (Some(a), Some(b)) = (left.organization.as_deref(), right.organization.as_deref())
        {
            weighted += self.weights.organization * organization_similarity(a, b);
            total += self.weights.organization;
        }

        if let (Some(a), Some(b)) = (left.date_of_birth, right.date_of_birth) {
            weighted += self.weights.temporal * temporal_proximity(a, b);
            total += self.weights.temporal;
        }

        if total <= 0.0 {
            return 0.0;
        }
        (weighted / total).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "weighted_token"
    }
}

/// Symmetric token similarity of two names.
///
/// Identical token sets (any order) score 1.0; otherwise each token is
/// matched to its best Jaro-Winkler partner on the other side and the two
/// directional averages are averaged. A run-together spelling ("Jongun")
/// is caught by also comparing the space-free forms.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let mut ta = tokenize(a);
    let mut tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    ta.sort();
    tb.sort();
    if ta == tb {
        return 1.0;
    }

    let directional = |from: &[String], to: &[String]| -> f64 {
        let sum: f64 = from
            .iter()
            .map(|t| {
                to.iter()
                    .map(|u| jaro_winkler(t, u))
                    .fold(0.0_f64, f64::max)
            })
            .sum();
        sum / from.len() as f64
    };
    let tokens = (directional(&ta, &tb) + directional(&tb, &ta)) / 2.0;

    let compact_a: String = normalize_name(a, false).split_whitespace().collect();
    let compact_b: String = normalize_name(b, false).split_whitespace().collect();
    let compact = if compact_a == compact_b {
        1.0
    } else {
        jaro_winkler(&compact_a, &compact_b) * 0.95
    };

    tokens.max(compact).clamp(0.0, 1.0)
}

fn organization_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a, true);
    let nb = normalize_name(b, true);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    token_similarity(&na, &nb)
}

/// 1.0 for the same date, decaying linearly to 0.0 over five years
fn temporal_proximity(a: NaiveDate, b: NaiveDate) -> f64 {
    let days = (a - b).num_days().abs() as f64;
    (1.0 - days / (5.0 * 365.25)).max(0.0)
}
