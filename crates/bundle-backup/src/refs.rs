use std::collections::BTreeMap;

/// Refs that describe working state rather than repository content.
/// They are never compared.
const PSEUDO_REFS: &[&str] = &[
    "HEAD",
    "FETCH_HEAD",
    "ORIG_HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
];

/// Suffix git uses for the peeled object of an annotated tag.
const PEELED_SUFFIX: &str = "^{}";

/// Ref name to commit SHA, with pseudo-refs and peeled tags excluded.
///
/// Two values are equal iff they hold exactly the same ref names, each
/// mapped to the same SHA.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitRefs(BTreeMap<String, String>);

/// How two sets of refs differ. Only used for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefsDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl RefsDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl GitRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `<sha> <ref>` lines as printed by `git bundle list-heads`
    /// (space separated) or `git ls-remote` (tab separated).
    ///
    /// Blank and malformed lines are skipped.
    pub fn parse(output: &str) -> Self {
        let mut refs = Self::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((sha, name)) = line.split_once(char::is_whitespace) {
                refs.insert(name.trim(), sha.trim());
            }
        }

        refs
    }

    /// Insert a ref unless it is a pseudo-ref or a peeled tag entry.
    pub fn insert(&mut self, name: impl Into<String>, sha: impl Into<String>) {
        let name = name.into();
        if is_excluded(&name) {
            return;
        }
        self.0.insert(name, sha.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Describe what changed going from `self` to `other`.
    pub fn delta(&self, other: &GitRefs) -> RefsDelta {
        let mut delta = RefsDelta::default();

        for (name, sha) in &other.0 {
            match self.0.get(name) {
                None => delta.added.push(name.clone()),
                Some(old) if old != sha => delta.changed.push(name.clone()),
                Some(_) => {}
            }
        }

        delta.removed = self
            .0
            .keys()
            .filter(|name| !other.0.contains_key(*name))
            .cloned()
            .collect();

        delta
    }
}

fn is_excluded(name: &str) -> bool {
    PSEUDO_REFS.contains(&name) || name.ends_with(PEELED_SUFFIX)
}

impl<N: Into<String>, S: Into<String>> FromIterator<(N, S)> for GitRefs {
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        let mut refs = Self::new();
        for (name, sha) in iter {
            refs.insert(name, sha);
        }
        refs
    }
}
