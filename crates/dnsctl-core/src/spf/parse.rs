// # SPF parsing
//
// Parses a `v=spf1` record into its parts, resolving `include:` and
// `redirect=` targets through an `SpfResolver` so that the DNS lookup cost
// of the whole tree is known.

use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::spf::resolver::SpfResolver;

/// RFC 7208 limit on DNS-querying terms
pub const MAX_LOOKUPS: usize = 10;

// Guards against include cycles.
const MAX_DEPTH: usize = 10;

/// A parsed SPF record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfRecord {
    /// Terms after `v=spf1`, in order, up to and including any `all`
    pub parts: Vec<SpfPart>,
}

/// One term of an SPF record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfPart {
    /// The term as written
    pub text: String,
    /// What kind of term it is
    pub kind: SpfPartKind,
}

/// Classification of an SPF term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpfPartKind {
    /// `all` with any qualifier
    All,
    /// `ip4:` or `ip6:`
    Ip,
    /// `include:domain`
    Include {
        /// Target domain
        domain: String,
        /// The target's record
        record: Box<SpfRecord>,
    },
    /// `redirect=domain`
    Redirect {
        /// Target domain
        domain: String,
        /// The target's record
        record: Box<SpfRecord>,
    },
    /// `a`, `mx`, `ptr`, `exists:`; one lookup, never flattened
    Lookup,
    /// Any other `key=value` modifier
    Modifier,
}

impl SpfPart {
    /// DNS lookups this term costs, including nested records
    pub fn lookups(&self) -> usize {
        match &self.kind {
            SpfPartKind::All | SpfPartKind::Ip | SpfPartKind::Modifier => 0,
            SpfPartKind::Lookup => 1,
            SpfPartKind::Include { record, .. } | SpfPartKind::Redirect { record, .. } => {
                1 + record.lookups()
            }
        }
    }
}

impl SpfRecord {
    /// Total DNS lookups needed to evaluate this record
    pub fn lookups(&self) -> usize {
        self.parts.iter().map(SpfPart::lookups).sum()
    }

    /// Render as `v=spf1 term term ...`
    pub fn to_text(&self) -> String {
        let mut text = String::from("v=spf1");
        for part in &self.parts {
            text.push(' ');
            text.push_str(&part.text);
        }
        text
    }
}

/// Whether `text` is an SPF record
pub fn is_spf(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower == "v=spf1" || lower.starts_with("v=spf1 ")
}

/// Parse `text`, resolving includes through `resolver`.
pub async fn parse(text: &str, resolver: &dyn SpfResolver) -> Result<SpfRecord> {
    parse_nested(text.to_string(), resolver, Vec::new()).await
}

fn parse_nested<'a>(
    text: String,
    resolver: &'a dyn SpfResolver,
    chain: Vec<String>,
) -> BoxFuture<'a, Result<SpfRecord>> {
    Box::pin(async move {
        if !is_spf(&text) {
            return Err(Error::spf(format!("not an SPF record: {text:?}")));
        }
        let mut parts = Vec::new();
        for token in text.split_whitespace().skip(1) {
            let lower = token.to_ascii_lowercase();
            let term = lower.trim_start_matches(['+', '-', '~', '?']);

            let kind = if term == "all" {
                parts.push(SpfPart {
                    text: token.to_string(),
                    kind: SpfPartKind::All,
                });
                break;
            } else if term.starts_with("ip4:") || term.starts_with("ip6:") {
                SpfPartKind::Ip
            } else if let Some(domain) = term.strip_prefix("include:") {
                let record = resolve_child(domain, resolver, &chain).await?;
                SpfPartKind::Include {
                    domain: domain.to_string(),
                    record: Box::new(record),
                }
            } else if let Some(domain) = term.strip_prefix("redirect=") {
                let record = resolve_child(domain, resolver, &chain).await?;
                SpfPartKind::Redirect {
                    domain: domain.to_string(),
                    record: Box::new(record),
                }
            } else if is_lookup_mechanism(term) {
                SpfPartKind::Lookup
            } else if term.contains('=') {
                SpfPartKind::Modifier
            } else {
                return Err(Error::UnsupportedMechanism(token.to_string()));
            };
            parts.push(SpfPart {
                text: token.to_string(),
                kind,
            });
        }
        Ok(SpfRecord { parts })
    })
}

fn is_lookup_mechanism(term: &str) -> bool {
    ["a", "mx", "ptr"].iter().any(|m| {
        term == *m
            || term
                .strip_prefix(m)
                .is_some_and(|rest| rest.starts_with(':') || rest.starts_with('/'))
    }) || term.starts_with("exists:")
}

async fn resolve_child(
    domain: &str,
    resolver: &dyn SpfResolver,
    chain: &[String],
) -> Result<SpfRecord> {
    if chain.len() >= MAX_DEPTH || chain.iter().any(|d| d == domain) {
        return Err(Error::spf(format!(
            "include loop or depth limit reached at {domain} (via {})",
            chain.join(" -> ")
        )));
    }
    let answers = resolver.get_txt(domain).await?;
    let mut spf = answers.into_iter().filter(|t| is_spf(t));
    let text = spf
        .next()
        .ok_or_else(|| Error::spf(format!("no SPF record at {domain}")))?;
    if spf.next().is_some() {
        return Err(Error::spf(format!("multiple SPF records at {domain}")));
    }
    let mut next = chain.to_vec();
    next.push(domain.to_string());
    parse_nested(text, resolver, next).await
}
