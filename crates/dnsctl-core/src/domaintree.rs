// # DomainTree
//
// A trie over DNS labels, walked right to left (TLD nearest the root). Used to
// match existing records against `unmanaged` patterns, which may be exact
// names or leading-`*` wildcards.

use std::collections::HashMap;

use crate::normalize::label;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    leaf: bool,
    wildcard: bool,
}

/// Set of names and wildcard patterns
#[derive(Debug, Default)]
pub struct DomainTree {
    root: Node,
}

impl DomainTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name` relative to `domain`.
    ///
    /// `name` may be `@`, a short label, an absolute name with a trailing dot,
    /// or any of those with a leading `*.`.
    pub fn add(&mut self, domain: &str, name: &str) {
        let fqdn = label::name_to_fqdn(name.trim(), domain);
        let (wildcard, fqdn) = match fqdn.strip_prefix("*.") {
            Some(rest) => (true, rest.to_string()),
            None if fqdn == "*" => (true, String::new()),
            None => (false, fqdn),
        };

        let mut node = &mut self.root;
        for part in labels(&fqdn) {
            node = node.children.entry(part.to_string()).or_default();
        }
        if wildcard {
            node.wildcard = true;
        } else {
            node.leaf = true;
        }
    }

    /// Whether `fqdn` was added or is covered by a wildcard.
    pub fn get(&self, fqdn: &str) -> bool {
        let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
        let mut node = &self.root;
        let mut under_wildcard = node.wildcard;
        for part in labels(&fqdn) {
            match node.children.get(part) {
                Some(child) => {
                    node = child;
                    if node.wildcard {
                        under_wildcard = true;
                    }
                }
                None => return under_wildcard,
            }
        }
        node.leaf || node.wildcard || under_wildcard
    }

    /// Whether nothing was added
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && !self.root.wildcard
    }
}

fn labels(fqdn: &str) -> impl Iterator<Item = &str> {
    fqdn.rsplit('.').filter(|part| !part.is_empty())
}
