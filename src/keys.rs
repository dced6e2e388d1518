//! Key-candidate resolution
//!
//! Picks the column subset of a property bag that best identifies a row.
//! Candidates are tried in catalog order (primary with sequence first,
//! unique without sequence last) and the first one whose columns are all
//! *present* wins. Null values count as present.

use indexmap::IndexMap;
use crate::catalog::KeyCandidate;
use crate::value::Value;

/// Separator between column values in a rendered key
pub const KEY_SEPARATOR: &str = ":";

/// Key-candidate resolver for one table in one store
#[derive(Debug, Clone, Copy)]
pub struct KeyResolver<'a> {
    candidates: &'a [KeyCandidate],
}

impl<'a> KeyResolver<'a> {
    pub fn new(candidates: &'a [KeyCandidate]) -> Self {
        Self { candidates }
    }

    /// First candidate fully covered by `properties`
    pub fn candidate(&self, properties: &IndexMap<String, Value>) -> Option<&'a KeyCandidate> {
        self.candidates
            .iter()
            .find(|c| c.columns.iter().all(|column| properties.contains_key(column)))
    }

    /// The identifying subset of `properties`, empty when no candidate is covered
    pub fn resolve(&self, properties: &IndexMap<String, Value>) -> IndexMap<String, Value> {
        match self.candidate(properties) {
            Some(candidate) => candidate
                .columns
                .iter()
                .filter_map(|c| properties.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
            None => IndexMap::new(),
        }
    }

    /// Like [`resolve`](Self::resolve) but falls back to every property
    pub fn resolve_or_all(&self, properties: &IndexMap<String, Value>) -> IndexMap<String, Value> {
        let key = self.resolve(properties);
        if key.is_empty() {
            properties.clone()
        } else {
            key
        }
    }

    /// Render the resolved key as a string, e.g. `"3"` or `"7:2"`
    pub fn key_string(&self, properties: &IndexMap<String, Value>) -> Option<String> {
        let key = self.resolve(properties);
        if key.is_empty() {
            return None;
        }
        Some(key.values().map(ToString::to_string).collect::<Vec<_>>().join(KEY_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CandidateKind;

    fn candidates() -> Vec<KeyCandidate> {
        vec![
            KeyCandidate { kind: CandidateKind::PrimaryWithSequence, columns: vec!["id".into()] },
            KeyCandidate { kind: CandidateKind::Sequence, columns: vec!["serial".into()] },
            KeyCandidate { kind: CandidateKind::Unique, columns: vec!["club".into(), "member".into()] },
            KeyCandidate { kind: CandidateKind::Unique, columns: vec!["email".into()] },
        ]
    }

    fn props(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_first_covered_candidate_wins() {
        let candidates = candidates();
        let resolver = KeyResolver::new(&candidates);

        let all = props(&[("email", "a@b".into()), ("serial", 7.into()), ("id", 1.into())]);
        assert_eq!(resolver.resolve(&all), props(&[("id", 1.into())]));

        let no_id = props(&[("email", "a@b".into()), ("serial", 7.into())]);
        assert_eq!(resolver.resolve(&no_id), props(&[("serial", 7.into())]));

        // Ties go to the first declared candidate
        let both_unique = props(&[("email", "a@b".into()), ("member", 2.into()), ("club", 1.into())]);
        assert_eq!(resolver.resolve(&both_unique), props(&[("club", 1.into()), ("member", 2.into())]));
    }

    #[test]
    fn test_presence_not_nullness() {
        let candidates = candidates();
        let resolver = KeyResolver::new(&candidates);

        let null_id = props(&[("id", Value::Null), ("serial", 7.into())]);
        assert_eq!(resolver.resolve(&null_id), props(&[("id", Value::Null)]));
    }

    #[test]
    fn test_no_candidate() {
        let candidates = candidates();
        let resolver = KeyResolver::new(&candidates);

        let partial = props(&[("club", 1.into()), ("name", "x".into())]);
        assert!(resolver.resolve(&partial).is_empty());
        assert_eq!(resolver.resolve_or_all(&partial), partial);
        assert_eq!(resolver.key_string(&partial), None);

        let empty: [KeyCandidate; 0] = [];
        assert!(KeyResolver::new(&empty).resolve(&partial).is_empty());
    }

    #[test]
    fn test_key_string() {
        let candidates = candidates();
        let resolver = KeyResolver::new(&candidates);
        let pair = props(&[("member", 2.into()), ("club", 1.into())]);
        assert_eq!(resolver.key_string(&pair), Some("1:2".to_string()));
    }
}
