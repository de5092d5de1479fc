//! Entity linking: text normalization and the pluggable name comparator
//!
//! Normalization folds case, diacritics, punctuation and full-width forms so
//! that "Kim Jong-un" and "KIM JONG UN" tokenize identically. The comparator
//! turns two normalized profiles into a similarity in [0, 1].

pub mod comparator;
pub mod normalize;

pub use comparator::{token_similarity, MatchProfile, NameComparator, WeightedNameComparator};
pub use normalize::{normalize_name, normalize_nationality, tokenize};
