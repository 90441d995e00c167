//! Qualified names with wildcard matching.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Local name that matches any local name.
pub const ANY_LOCAL_NAME: &str = "*";

/// An XML-style namespace: a URI plus an optional preferred alias.
///
/// Two namespaces are equal when their URIs are equal; the alias is only a
/// hint for serializers.
#[derive(Clone)]
pub struct Namespace {
    alias: Option<Arc<str>>,
    uri: Arc<str>,
}

impl Namespace {
    pub fn new(alias: impl Into<Arc<str>>, uri: impl Into<Arc<str>>) -> Self {
        Self {
            alias: Some(alias.into()),
            uri: uri.into(),
        }
    }

    /// A namespace with no preferred alias.
    pub fn unaliased(uri: impl Into<Arc<str>>) -> Self {
        Self {
            alias: None,
            uri: uri.into(),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Namespace {}

impl Hash for Namespace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

impl PartialOrd for Namespace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Namespace {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri.cmp(&other.uri)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}={}", alias, self.uri),
            None => write!(f, "{}", self.uri),
        }
    }
}

// Variant order is the sort order: unqualified first, then the wildcard,
// then concrete namespaces by URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum NsPart {
    Unqualified,
    Any,
    Uri(Namespace),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum LocalPart {
    Any,
    Name(Arc<str>),
}

/// An immutable qualified name.
///
/// Equality, hashing and ordering are strict; wildcards only take part in
/// [`QName::matches`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    ns: NsPart,
    local: LocalPart,
}

impl QName {
    /// A name in the given namespace. A local name of `*` is a wildcard.
    pub fn new(ns: Namespace, local: impl AsRef<str>) -> Self {
        Self {
            ns: NsPart::Uri(ns),
            local: LocalPart::from_str(local.as_ref()),
        }
    }

    /// A name without a namespace.
    pub fn local(local: impl AsRef<str>) -> Self {
        Self {
            ns: NsPart::Unqualified,
            local: LocalPart::from_str(local.as_ref()),
        }
    }

    /// A name matching `local` in any namespace.
    pub fn any_namespace(local: impl AsRef<str>) -> Self {
        Self {
            ns: NsPart::Any,
            local: LocalPart::from_str(local.as_ref()),
        }
    }

    /// A name matching every local name in `ns`.
    pub fn any_local(ns: Namespace) -> Self {
        Self {
            ns: NsPart::Uri(ns),
            local: LocalPart::Any,
        }
    }

    /// A name matching everything.
    pub fn any() -> Self {
        Self {
            ns: NsPart::Any,
            local: LocalPart::Any,
        }
    }

    /// The concrete namespace, if this name has one.
    pub fn namespace(&self) -> Option<&Namespace> {
        match &self.ns {
            NsPart::Uri(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn local_name(&self) -> &str {
        match &self.local {
            LocalPart::Any => ANY_LOCAL_NAME,
            LocalPart::Name(name) => name,
        }
    }

    pub fn matches_any_namespace(&self) -> bool {
        self.ns == NsPart::Any
    }

    pub fn matches_any_local_name(&self) -> bool {
        self.local == LocalPart::Any
    }

    /// True if this name contains a wildcard component.
    pub fn is_wildcard(&self) -> bool {
        self.matches_any_namespace() || self.matches_any_local_name()
    }

    /// One-sided wildcard match: wildcards on `self` match anything on
    /// `other`, but not the reverse.
    pub fn matches(&self, other: &QName) -> bool {
        let ns_ok = self.matches_any_namespace() || self.ns == other.ns;
        let local_ok = self.matches_any_local_name() || self.local == other.local;
        ns_ok && local_ok
    }

    /// A copy of this name carrying `ns`, keeping the local name.
    pub fn with_namespace(&self, ns: Namespace) -> Self {
        Self {
            ns: NsPart::Uri(ns),
            local: self.local.clone(),
        }
    }
}

impl LocalPart {
    fn from_str(local: &str) -> Self {
        if local == ANY_LOCAL_NAME {
            LocalPart::Any
        } else {
            LocalPart::Name(Arc::from(local))
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            NsPart::Unqualified => write!(f, "{}", self.local_name()),
            NsPart::Any => write!(f, "*:{}", self.local_name()),
            NsPart::Uri(ns) => match ns.alias() {
                Some(alias) => write!(f, "{}:{}", alias, self.local_name()),
                None => write!(f, "{{{}}}{}", ns.uri(), self.local_name()),
            },
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom() -> Namespace {
        Namespace::new("atom", "http://www.w3.org/2005/Atom")
    }

    #[test]
    fn test_matches_is_one_sided() {
        let wildcard = QName::any_namespace("id");
        let concrete = QName::new(atom(), "id");
        assert!(wildcard.matches(&concrete));
        assert!(!concrete.matches(&wildcard));
    }

    #[test]
    fn test_any_matches_everything() {
        let any = QName::any();
        assert!(any.matches(&QName::local("x")));
        assert!(any.matches(&QName::new(atom(), "entry")));
        assert!(any.matches(&QName::any_local(atom())));
    }

    #[test]
    fn test_namespace_equality_ignores_alias() {
        let a = QName::new(Namespace::new("a", "urn:x"), "n");
        let b = QName::new(Namespace::new("b", "urn:x"), "n");
        assert_eq!(a, b);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_unqualified_does_not_match_qualified() {
        assert!(!QName::local("id").matches(&QName::new(atom(), "id")));
        assert!(QName::local("id").matches(&QName::local("id")));
    }

    #[test]
    fn test_any_local_in_namespace() {
        let all_atom = QName::any_local(atom());
        assert!(all_atom.matches(&QName::new(atom(), "link")));
        assert!(!all_atom.matches(&QName::local("link")));
    }

    #[test]
    fn test_ordering() {
        let mut names = vec![
            QName::new(atom(), "b"),
            QName::local("z"),
            QName::new(atom(), "a"),
            QName::any_namespace("a"),
            QName::any_local(atom()),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, vec!["z", "*:a", "atom:*", "atom:a", "atom:b"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(QName::new(atom(), "entry").to_string(), "atom:entry");
        assert_eq!(
            QName::new(Namespace::unaliased("urn:y"), "v").to_string(),
            "{urn:y}v"
        );
    }
}
