/*!
 * Tags
 * Immutable, interned, composable label sets
 *
 * Atoms are interned in one process-wide context, so a label allocates once
 * for the process lifetime and set operations compare pointers before text.
 * Sets are canonical: atoms sorted, deduplicated, joined with `|` in the
 * text form.
 */

use ahash::RandomState;
use dashmap::DashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Separator reserved in atom labels
pub const TAG_SEPARATOR: char = '|';

fn context() -> &'static DashSet<Arc<str>, RandomState> {
    static CONTEXT: OnceLock<DashSet<Arc<str>, RandomState>> = OnceLock::new();
    CONTEXT.get_or_init(|| DashSet::with_hasher(RandomState::new()))
}

/// Intern one atomic label
///
/// Trims surrounding whitespace. Two concurrent interns of the same label
/// converge on one allocation.
fn intern(label: &str) -> Option<Arc<str>> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let atoms = context();
    if let Some(existing) = atoms.get(label) {
        return Some(Arc::clone(existing.key()));
    }
    let fresh: Arc<str> = Arc::from(label);
    atoms.insert(Arc::clone(&fresh));
    // A racing insert may have won; the set entry is the canonical one.
    atoms.get(label).map(|entry| Arc::clone(entry.key()))
}

#[inline]
fn same_atom(a: &Arc<str>, b: &Arc<str>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

/// Immutable set of interned atomic labels
///
/// Cloning is one `Arc` bump; union/intersection build new sets; overlap and
/// membership tests walk the sorted atoms without allocating.
#[derive(Debug, Clone)]
pub struct TagSet {
    atoms: Arc<[Arc<str>]>,
}

impl TagSet {
    /// The empty set
    pub fn empty() -> Self {
        static EMPTY: OnceLock<TagSet> = OnceLock::new();
        EMPTY
            .get_or_init(|| Self {
                atoms: Arc::from(Vec::new()),
            })
            .clone()
    }

    /// Build a set from raw labels (trimmed, deduplicated, sorted)
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut atoms: Vec<Arc<str>> = labels
            .into_iter()
            .filter_map(|label| intern(label.as_ref()))
            .collect();
        atoms.sort_unstable_by(|a, b| a.as_ref().cmp(b.as_ref()));
        atoms.dedup_by(|a, b| same_atom(a, b));
        if atoms.is_empty() {
            Self::empty()
        } else {
            Self {
                atoms: Arc::from(atoms),
            }
        }
    }

    /// Parse the canonical `A|B|C` form
    pub fn parse(text: &str) -> Self {
        Self::from_labels(text.split(TAG_SEPARATOR))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Iterate atoms in canonical order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|atom| atom.as_ref())
    }

    /// Membership test for one atomic label
    pub fn contains(&self, label: &str) -> bool {
        let label = label.trim();
        self.atoms
            .binary_search_by(|atom| atom.as_ref().cmp(label))
            .is_ok()
    }

    /// Whether the two sets share at least one atom
    pub fn overlaps(&self, other: &TagSet) -> bool {
        let (a, b) = (&self.atoms, &other.atoms);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if same_atom(&a[i], &b[j]) {
                return true;
            }
            match a[i].as_ref().cmp(b[j].as_ref()) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Set union (sorted merge)
    pub fn union(&self, other: &TagSet) -> TagSet {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() || self == other {
            return self.clone();
        }
        let (a, b) = (&self.atoms, &other.atoms);
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].as_ref().cmp(b[j].as_ref()) {
                std::cmp::Ordering::Less => {
                    merged.push(Arc::clone(&a[i]));
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(Arc::clone(&b[j]));
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(Arc::clone(&a[i]));
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend(a[i..].iter().cloned());
        merged.extend(b[j..].iter().cloned());
        TagSet {
            atoms: Arc::from(merged),
        }
    }

    /// Set intersection (sorted walk)
    pub fn intersect(&self, other: &TagSet) -> TagSet {
        if self.is_empty() || other.is_empty() {
            return Self::empty();
        }
        let (a, b) = (&self.atoms, &other.atoms);
        let mut shared = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].as_ref().cmp(b[j].as_ref()) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared.push(Arc::clone(&a[i]));
                    i += 1;
                    j += 1;
                }
            }
        }
        if shared.is_empty() {
            Self::empty()
        } else {
            TagSet {
                atoms: Arc::from(shared),
            }
        }
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.atoms, &other.atoms) {
            return true;
        }
        self.atoms.len() == other.atoms.len()
            && self
                .atoms
                .iter()
                .zip(other.atoms.iter())
                .all(|(a, b)| same_atom(a, b))
    }
}

impl Eq for TagSet {}

impl Hash for TagSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for atom in self.atoms.iter() {
            atom.as_ref().hash(state);
        }
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(atom)?;
        }
        Ok(())
    }
}

impl FromStr for TagSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for TagSet {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_canonical() {
        let tags = TagSet::parse("c|a|b|a| |");
        assert_eq!(tags.to_string(), "a|b|c");
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_equality_by_canonical_form() {
        assert_eq!(TagSet::parse("b|a"), TagSet::parse("a|b"));
        assert_ne!(TagSet::parse("a"), TagSet::parse("a|b"));
    }

    #[test]
    fn test_interning_shares_atoms() {
        let first = TagSet::parse("net:Security");
        let second = TagSet::parse("net:Security");
        let (a, b) = (first.atoms.first(), second.atoms.first());
        assert!(matches!((a, b), (Some(x), Some(y)) if Arc::ptr_eq(x, y)));
    }

    #[test]
    fn test_union() {
        let merged = TagSet::parse("a|c").union(&TagSet::parse("b|c"));
        assert_eq!(merged.to_string(), "a|b|c");
    }

    #[test]
    fn test_intersect() {
        let shared = TagSet::parse("a|b|c").intersect(&TagSet::parse("b|c|d"));
        assert_eq!(shared.to_string(), "b|c");
        assert!(TagSet::parse("a").intersect(&TagSet::parse("b")).is_empty());
    }

    #[test]
    fn test_overlaps() {
        assert!(TagSet::parse("a|b").overlaps(&TagSet::parse("b|z")));
        assert!(!TagSet::parse("a|b").overlaps(&TagSet::parse("x|z")));
        assert!(!TagSet::empty().overlaps(&TagSet::parse("a")));
    }

    #[test]
    fn test_contains() {
        let tags = TagSet::parse("alpha|beta");
        assert!(tags.contains("beta"));
        assert!(tags.contains(" beta "));
        assert!(!tags.contains("gamma"));
    }

    #[test]
    fn test_empty_set_is_shared() {
        assert!(TagSet::parse(" | ").is_empty());
        assert_eq!(TagSet::empty(), TagSet::parse(""));
    }

    #[test]
    fn test_serde_round_trip() {
        let tags = TagSet::parse("m:Topic|internal");
        let json = serde_json::to_string(&tags).unwrap();
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);
    }
}
