//! Citation extraction from wiki page source.
//!
//! Three forms are recognised, in this order:
//!
//! | Form | Pattern | Kept when |
//! |------|---------|-----------|
//! | `<ref>` tag | `<ref ...>text</ref>` | stripped text longer than 10 chars |
//! | cite template | `{{cite ...}}` | always |
//! | external link | `[https://url title]` | title longer than 5 chars |

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identifiers::WikiPageUrl;

/// Minimum length (exclusive) of a `<ref>` body worth keeping.
const MIN_REF_LEN: usize = 10;
/// Minimum length (exclusive) of an external link title worth keeping.
const MIN_LINK_TITLE_LEN: usize = 5;

/// Which markup form a citation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// `<ref>...</ref>`
    RefTag,
    /// `{{cite ...}}`
    CiteTemplate,
    /// `[url title]`
    ExternalLink,
}

impl CitationKind {
    /// The tag written into generated `note` fields.
    pub fn as_str(self) -> &'static str {
        match self {
            CitationKind::RefTag => "ref_tag",
            CitationKind::CiteTemplate => "cite_template",
            CitationKind::ExternalLink => "external_link",
        }
    }
}

/// A citation found on a wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiCitation {
    /// Markup form.
    pub kind: CitationKind,
    /// Citation text (cleaned for ref tags, the whole template for cite templates,
    /// the link title for external links).
    pub content: String,
    /// Page the citation was found on.
    pub source_url: WikiPageUrl,
}

fn ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Self-closing `<ref name="x" />` re-uses an earlier ref and has no body.
    RE.get_or_init(|| {
        Regex::new(r"(?is)<ref(?:\s[^>]*[^/>])?\s*>(.*?)</ref\s*>").expect("valid regex")
    })
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn cite_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\{\{cite\s+[^}]+\}\}").expect("valid regex"))
}

fn link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[https?://[^\s\]]+\s+([^\]]+)\]").expect("valid regex"))
}

fn param_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\|\s*([^=|}\n]+?)\s*=\s*([^|}\n]*)").expect("valid regex"))
}

/// Extracts every citation from a page's source text.
pub fn extract_citations(content: &str, source_url: &WikiPageUrl) -> Vec<WikiCitation> {
    let mut citations = Vec::new();
    let cite = |kind, content: String| WikiCitation {
        kind,
        content,
        source_url: source_url.clone(),
    };

    for caps in ref_pattern().captures_iter(content) {
        let body = tag_pattern().replace_all(&caps[1], "");
        let body = body.trim();
        if body.chars().count() > MIN_REF_LEN {
            citations.push(cite(CitationKind::RefTag, body.to_string()));
        }
    }

    for m in cite_pattern().find_iter(content) {
        citations.push(cite(CitationKind::CiteTemplate, m.as_str().trim().to_string()));
    }

    for caps in link_pattern().captures_iter(content) {
        let title = caps[1].trim();
        if title.chars().count() > MIN_LINK_TITLE_LEN {
            citations.push(cite(CitationKind::ExternalLink, title.to_string()));
        }
    }

    citations
}

/// Reads a named parameter (`| name = value`) from a cite template.
///
/// Parameter names match case-insensitively; the value runs to the next `|`,
/// `}` or newline and is trimmed. Returns `None` for missing or empty values.
pub fn template_param(template: &str, name: &str) -> Option<String> {
    param_pattern()
        .captures_iter(template)
        .filter(|caps| caps[1].trim().eq_ignore_ascii_case(name))
        .map(|caps| caps[2].trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> WikiPageUrl {
        WikiPageUrl::new("https://en.wikiversity.org/wiki/Example").unwrap()
    }

    #[test]
    fn extracts_ref_tags_and_strips_markup() {
        let src = r#"Claim.<ref name="a">Smith, J. <i>On Things</i>, 2020.</ref>
Other.<REF>
  multi-line reference body
</REF>"#;
        let found = extract_citations(src, &page());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, CitationKind::RefTag);
        assert_eq!(found[0].content, "Smith, J. On Things, 2020.");
        assert_eq!(found[1].content, "multi-line reference body");
    }

    #[test]
    fn short_refs_and_self_closing_refs_are_skipped() {
        let src = r#"A<ref>tiny</ref> B<ref name="x" /> C<ref name="y">A long enough body</ref>"#;
        let found = extract_citations(src, &page());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "A long enough body");
    }

    #[test]
    fn extracts_cite_templates_whole() {
        let src = "See {{Cite journal | title = Deep Things | author = Doe | year = 2019 }} here.";
        let found = extract_citations(src, &page());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CitationKind::CiteTemplate);
        assert!(found[0].content.starts_with("{{Cite journal"));
        assert!(found[0].content.ends_with("}}"));
    }

    #[test]
    fn extracts_titled_external_links() {
        let src = "[https://a.org/p A Paper Title] and [https://x.org ok] and [https://b.org]";
        let found = extract_citations(src, &page());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CitationKind::ExternalLink);
        assert_eq!(found[0].content, "A Paper Title");
    }

    #[test]
    fn template_params_are_read_by_name() {
        let t = "{{cite book | Title = The Book |booktitle=Other| author=Roe\n| year = }}";
        assert_eq!(template_param(t, "title").as_deref(), Some("The Book"));
        assert_eq!(template_param(t, "author").as_deref(), Some("Roe"));
        assert_eq!(template_param(t, "year"), None);
        assert_eq!(template_param(t, "journal"), None);
    }

    #[test]
    fn repeated_template_params_use_the_first_non_empty_value() {
        let t = "{{cite web |title= |url=https://example.org |TITLE = Second try}}";
        assert_eq!(template_param(t, "title").as_deref(), Some("Second try"));
        assert_eq!(template_param(t, "url").as_deref(), Some("https://example.org"));
    }
}
