/// Link integrity checks over the mirrored documents.
///
/// Internal links come in two addressing conventions for the same document set: the
/// long form rooted at `/docs/en/` and the short form `/en/` used by part of the
/// content. A link resolves when its target, stripped of surrounding slashes, is a
/// catalogued path, or when an [`AliasRule`] rewrites it into one. Broken links are
/// drift, tolerated below a ceiling; a near-zero link count means extraction broke.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use mirror_common::canonical::normalize;
use mirror_common::error::CommonError;
use mirror_common::manifest::PathsManifest;

use crate::config::Thresholds;
use crate::model::{CheckReport, Drift};

pub const INTERNAL_LINKS: &str = "internal_links";
pub const FRAGMENT_FORMAT: &str = "fragment_format";
pub const LINK_TEXT: &str = "link_text";
pub const DESCRIPTIVE_LINK_TEXT: &str = "descriptive_link_text";

/// Link texts that say nothing about the target.
const GENERIC_LINK_TEXT: &[&str] = &["here", "click", "click here", "link", "this", "this link", "read more"];

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[((?:[^\[\]\n]|\n[^\[\]\n])*)\]\(\s*<?([^)\s>]*)>?[^)\n]*\)").expect("valid regex"));
static FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[a-z0-9-]+$").expect("valid regex"));

/// A markdown link found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub target: String,
    /// 1-based line number.
    pub line: usize,
    pub image: bool,
}

impl Link {
    /// Target without its fragment and query.
    pub fn path(&self) -> &str {
        let end = self.target.find(['#', '?']).unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// Fragment including the leading `#`, if the target has one.
    pub fn fragment(&self) -> Option<&str> {
        self.target.find('#').map(|pos| &self.target[pos..])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkKind {
    /// Rooted at one of the internal documentation prefixes.
    Internal,
    /// Points into the same document (`#section`).
    Fragment,
    /// `./page`, `../page` or a bare relative name.
    Relative,
    /// Has a URI scheme (`https:`, `mailto:`) or is protocol-relative.
    External,
    /// Rooted elsewhere on the site, or empty.
    Other,
}

/// Rewrites one addressing convention into another, e.g. `en/x` into `docs/en/x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRule {
    pub from_prefix: String,
    pub to_prefix: String,
}

impl AliasRule {
    pub fn new(from_prefix: &str, to_prefix: &str) -> Self {
        Self {
            from_prefix: from_prefix.to_string(),
            to_prefix: to_prefix.to_string(),
        }
    }

    fn apply(&self, normalized: &str) -> Option<String> {
        normalized
            .strip_prefix(&self.from_prefix)
            .map(|rest| format!("{}{rest}", self.to_prefix))
    }
}

/// Which targets count as internal and how the addressing conventions relate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRules {
    /// Rooted prefixes of internal link targets.
    pub internal_prefixes: Vec<String>,
    pub aliases: Vec<AliasRule>,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self {
            internal_prefixes: vec!["/docs/en/".to_string(), "/en/".to_string()],
            aliases: vec![AliasRule::new("en/", "docs/en/")],
        }
    }
}

impl LinkRules {
    pub fn classify(&self, target: &str) -> LinkKind {
        if target.is_empty() {
            return LinkKind::Other;
        }
        if target.starts_with('#') {
            return LinkKind::Fragment;
        }
        if target.starts_with("//") || has_uri_scheme(target) {
            return LinkKind::External;
        }
        if self.internal_prefixes.iter().any(|p| target.starts_with(p.as_str())) {
            return LinkKind::Internal;
        }
        if target.starts_with('/') {
            return LinkKind::Other;
        }
        LinkKind::Relative
    }

    /// Whether an internal link path names a catalogued page, directly or through an alias.
    pub fn resolves(&self, link_path: &str, catalogue: &HashSet<&str>) -> bool {
        let normalized = normalize(link_path);
        if catalogue.contains(normalized) {
            return true;
        }
        self.aliases
            .iter()
            .filter_map(|rule| rule.apply(normalized))
            .any(|aliased| catalogue.contains(aliased.as_str()))
    }
}

/// `scheme:` per RFC 3986: a letter followed by letters, digits, `+`, `.` or `-`.
fn has_uri_scheme(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// Extract markdown links, skipping fenced code blocks. Link text may wrap onto
/// following lines but not across a blank line; it is reported with its whitespace
/// collapsed and the line the link starts on.
pub fn extract_links(content: &str) -> Vec<Link> {
    let mut visible = String::with_capacity(content.len());
    let mut fence: Option<&str> = None;
    for line in content.lines() {
        let trimmed = line.trim_start();
        let marker = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m));
        let keep = match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                false
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                false
            }
            (Some(_), _) => false,
            (None, None) => true,
        };
        if keep {
            visible.push_str(line);
        }
        visible.push('\n');
    }

    let mut links = Vec::new();
    let (mut scanned, mut line) = (0usize, 1usize);
    for caps in LINK_RE.captures_iter(&visible) {
        let start = caps.get(0).map_or(scanned, |m| m.start());
        line += visible[scanned..start].matches('\n').count();
        scanned = start;
        links.push(Link {
            image: !caps[1].is_empty(),
            text: caps[2].split_whitespace().collect::<Vec<_>>().join(" "),
            target: caps[3].to_string(),
            line,
        });
    }
    links
}

/// Links of every mirrored document, extracted once and shared by the link checks.
#[derive(Debug, Clone, Default)]
pub struct LinkCorpus {
    documents: BTreeMap<String, Vec<Link>>,
}

impl LinkCorpus {
    pub fn from_documents<I, N, C>(documents: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: AsRef<str>,
    {
        Self {
            documents: documents
                .into_iter()
                .map(|(name, content)| (name.into(), extract_links(content.as_ref())))
                .collect(),
        }
    }

    /// Read and scan each named document in `docs_dir`. Unreadable files are skipped
    /// with a warning; they are the docs-manifest checks' concern.
    pub fn load(docs_dir: &Path, filenames: &BTreeSet<String>) -> Self {
        let mut documents = BTreeMap::new();
        for name in filenames {
            let path = docs_dir.join(name);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    documents.insert(name.clone(), extract_links(&String::from_utf8_lossy(&bytes)));
                }
                Err(e) => warn!(error = %CommonError::io(&path, e), "skipping unreadable document"),
            }
        }
        let corpus = Self { documents };
        info!(documents = corpus.documents.len(), links = corpus.link_count(), "extracted links");
        corpus
    }

    pub fn link_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    pub fn links(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.documents
            .iter()
            .flat_map(|(name, links)| links.iter().map(move |link| (name.as_str(), link)))
    }

    pub fn kind_counts(&self, rules: &LinkRules) -> BTreeMap<LinkKind, usize> {
        let mut counts = BTreeMap::new();
        for (_, link) in self.links() {
            *counts.entry(rules.classify(&link.target)).or_insert(0) += 1;
        }
        counts
    }
}

/// Resolve every internal link against the catalogue. Links without text are left to
/// the link-text check and do not count here.
pub fn check_internal_links(
    corpus: &LinkCorpus,
    rules: &LinkRules,
    manifest: &PathsManifest,
    thresholds: &Thresholds,
) -> CheckReport {
    debug!(kinds = ?corpus.kind_counts(rules), "link classification");
    let catalogue = manifest.normalized_paths();

    let mut total = 0usize;
    let mut broken = Vec::new();
    for (file, link) in corpus.links() {
        if rules.classify(&link.target) != LinkKind::Internal || link.text.trim().is_empty() {
            continue;
        }
        total += 1;
        if !rules.resolves(link.path(), &catalogue) {
            broken.push(format!("[{file}:{}] '{}' -> {}", link.line, link.text, link.target));
        }
    }

    let drift = Drift::new(total, broken.len());
    if total < thresholds.min_internal_links {
        return CheckReport::fail(
            INTERNAL_LINKS,
            format!(
                "expected {}+ internal links in docs, found {total}; link extraction may be broken",
                thresholds.min_internal_links
            ),
        )
        .with_drift(drift);
    }

    let summary = format!(
        "{} of {total} internal links ({:.1}%) don't resolve to manifest paths",
        drift.offending,
        drift.percentage()
    );
    let report = if drift.offending == 0 {
        CheckReport::pass(INTERNAL_LINKS, summary)
    } else if drift.within(thresholds.broken_link_ceiling_pct) {
        CheckReport::warn(INTERNAL_LINKS, summary)
    } else {
        CheckReport::fail(
            INTERNAL_LINKS,
            format!("{summary}, ceiling is {}%", thresholds.broken_link_ceiling_pct),
        )
    };
    report.with_drift(drift).with_samples(broken)
}

/// Fragments must be lowercase slugs: `#getting-started`, not `#`, `##x` or `#Some Text`.
pub fn is_valid_fragment(fragment: &str) -> bool {
    FRAGMENT_RE.is_match(fragment)
}

/// Informational: malformed fragments are reported but do not fail the run. Only
/// fragments into the mirrored docs are checked; other sites choose their own anchors.
pub fn check_fragments(corpus: &LinkCorpus, rules: &LinkRules) -> CheckReport {
    let mut checked = 0usize;
    let mut malformed = Vec::new();
    for (file, link) in corpus.links() {
        let Some(fragment) = link.fragment() else {
            continue;
        };
        let kind = rules.classify(&link.target);
        if !matches!(kind, LinkKind::Internal | LinkKind::Fragment | LinkKind::Relative) {
            continue;
        }
        checked += 1;
        if !is_valid_fragment(fragment) {
            malformed.push(format!("[{file}:{}] {}", link.line, link.target));
        }
    }

    let drift = Drift::new(checked, malformed.len());
    if malformed.is_empty() {
        return CheckReport::pass(FRAGMENT_FORMAT, format!("{checked} fragments well-formed")).with_drift(drift);
    }
    CheckReport::warn(
        FRAGMENT_FORMAT,
        format!("{} of {checked} fragments are not lowercase slugs", malformed.len()),
    )
    .with_drift(drift)
    .with_samples(malformed)
}

/// Informational: links other than images should carry text.
pub fn check_link_text(corpus: &LinkCorpus) -> CheckReport {
    let empty: Vec<String> = corpus
        .links()
        .filter(|(_, link)| !link.image && link.text.trim().is_empty())
        .map(|(file, link)| format!("[{file}:{}] -> {}", link.line, link.target))
        .collect();
    let total = corpus.links().filter(|(_, link)| !link.image).count();

    let drift = Drift::new(total, empty.len());
    if empty.is_empty() {
        return CheckReport::pass(LINK_TEXT, format!("all {total} links have text")).with_drift(drift);
    }
    CheckReport::warn(LINK_TEXT, format!("{} of {total} links have empty text", empty.len()))
        .with_drift(drift)
        .with_samples(empty)
}

/// At least `min_descriptive_text_pct` of link texts must say where they lead.
pub fn check_descriptive_text(corpus: &LinkCorpus, thresholds: &Thresholds) -> CheckReport {
    let texts: Vec<(&str, &Link)> = corpus
        .links()
        .filter(|(_, link)| !link.image && !link.text.trim().is_empty())
        .collect();
    if texts.is_empty() {
        return CheckReport::pass(DESCRIPTIVE_LINK_TEXT, "no link texts to assess");
    }

    let generic: Vec<String> = texts
        .iter()
        .filter(|(_, link)| is_generic(&link.text))
        .map(|(file, link)| format!("[{file}:{}] '{}'", link.line, link.text))
        .collect();
    let descriptive = texts.len() - generic.len();
    let drift = Drift::new(texts.len(), generic.len());

    let share = descriptive as f64 * 100.0 / texts.len() as f64;
    let summary = format!("{descriptive} of {} link texts ({share:.1}%) are descriptive", texts.len());
    let report = if descriptive as f64 * 100.0 >= thresholds.min_descriptive_text_pct * texts.len() as f64 {
        CheckReport::pass(DESCRIPTIVE_LINK_TEXT, summary)
    } else {
        CheckReport::fail(
            DESCRIPTIVE_LINK_TEXT,
            format!("{summary}, expected at least {}%", thresholds.min_descriptive_text_pct),
        )
    };
    report.with_drift(drift).with_samples(generic)
}

fn is_generic(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    GENERIC_LINK_TEXT.contains(&text.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    fn catalogue_manifest(paths: &[&str]) -> PathsManifest {
        PathsManifest::from_categories(
            [("docs".to_string(), paths.iter().map(|p| p.to_string()).collect())]
                .into_iter()
                .collect(),
        )
    }

    fn low_floor() -> Thresholds {
        Thresholds {
            min_internal_links: 1,
            ..Thresholds::default()
        }
    }

    #[test]
    fn test_extract_links() {
        let content = "See [Hooks](/en/hooks#events) and ![diagram](/docs/en/img.png).\n\
                       Also [the API](https://example.com \"title\") and [](#top).";
        let links = extract_links(content);
        assert_eq!(links.len(), 4);
        assert_eq!(links[0].text, "Hooks");
        assert_eq!(links[0].path(), "/en/hooks");
        assert_eq!(links[0].fragment(), Some("#events"));
        assert!(links[1].image);
        assert_eq!(links[2].target, "https://example.com");
        assert_eq!(links[3].line, 2);
        assert_eq!(links[3].text, "");
    }

    #[test]
    fn test_extract_links_skips_code_fences() {
        let content = "[a](/en/a)\n```md\n[b](/en/b)\n~~~\n[c](/en/c)\n```\n[d](/en/d)";
        let targets: Vec<String> = extract_links(content).into_iter().map(|l| l.target).collect();
        assert_eq!(targets, vec!["/en/a", "/en/d"]);
    }

    #[test]
    fn test_classify() {
        let rules = LinkRules::default();
        assert_eq!(rules.classify("/docs/en/foo"), LinkKind::Internal);
        assert_eq!(rules.classify("/en/foo"), LinkKind::Internal);
        assert_eq!(rules.classify("#section"), LinkKind::Fragment);
        assert_eq!(rules.classify("https://www.anthropic.com"), LinkKind::External);
        assert_eq!(rules.classify("http://example.com"), LinkKind::External);
        assert_eq!(rules.classify("mailto:test@example.com"), LinkKind::External);
        assert_eq!(rules.classify("//cdn.example.com/x"), LinkKind::External);
        assert_eq!(rules.classify("./sibling-page"), LinkKind::Relative);
        assert_eq!(rules.classify("../parent-page"), LinkKind::Relative);
        assert_eq!(rules.classify("/pricing"), LinkKind::Other);
        assert_eq!(rules.classify(""), LinkKind::Other);
    }

    #[test]
    fn test_short_form_alias_resolves() {
        let manifest = catalogue_manifest(&["docs/en/foo"]);
        let corpus = LinkCorpus::from_documents([("a.md", "[x](/en/foo)")]);
        let report = check_internal_links(&corpus, &LinkRules::default(), &manifest, &low_floor());
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.total, Some(1));
        assert_eq!(report.offending, Some(0));
    }

    #[test]
    fn test_long_form_missing_is_broken() {
        let manifest = catalogue_manifest(&["/docs/en/foo"]);
        let corpus = LinkCorpus::from_documents([("a.md", "[x](/docs/en/bar)\n[y](/docs/en/foo/)")]);
        let report = check_internal_links(&corpus, &LinkRules::default(), &manifest, &low_floor());
        assert_eq!(report.offending, Some(1));
        assert_eq!(report.samples, vec!["[a.md:1] 'x' -> /docs/en/bar"]);
        assert_eq!(report.outcome, Outcome::Fail, "1 of 2 is above the 30% ceiling");
    }

    #[test]
    fn test_third_convention_is_one_more_rule() {
        let manifest = catalogue_manifest(&["/docs/en/foo"]);
        let mut rules = LinkRules::default();
        rules.internal_prefixes.push("/docs/claude-code/".to_string());
        rules.aliases.push(AliasRule::new("docs/claude-code/", "docs/en/"));
        let corpus = LinkCorpus::from_documents([("a.md", "[x](/docs/claude-code/foo)")]);
        let report = check_internal_links(&corpus, &rules, &manifest, &low_floor());
        assert_eq!(report.outcome, Outcome::Pass);
    }

    /// 1,000 internal links with a given number of unresolved targets.
    fn corpus_with_broken(broken: usize) -> (LinkCorpus, PathsManifest) {
        let mut content = String::new();
        for i in 0..1000 {
            if i < broken {
                content.push_str(&format!("[Missing page {i}](/docs/en/missing-{i})\n"));
            } else {
                content.push_str(&format!("[Page {i}](/en/page-{i})\n"));
            }
        }
        let paths: Vec<String> = (0..1000).map(|i| format!("/docs/en/page-{i}")).collect();
        let manifest = PathsManifest::from_categories([("docs".to_string(), paths)].into_iter().collect());
        (LinkCorpus::from_documents([("big.md", content)]), manifest)
    }

    #[test]
    fn test_scenario_d_broken_link_ceiling() {
        let rules = LinkRules::default();
        let thresholds = Thresholds::default();

        let (corpus, manifest) = corpus_with_broken(250);
        let report = check_internal_links(&corpus, &rules, &manifest, &thresholds);
        assert_eq!(report.total, Some(1000));
        assert_eq!(report.percentage, Some(25.0));
        assert!(!report.is_failure(), "{}", report.message);

        let (corpus, manifest) = corpus_with_broken(310);
        let report = check_internal_links(&corpus, &rules, &manifest, &thresholds);
        assert_eq!(report.percentage, Some(31.0));
        assert!(report.is_failure());
        assert_eq!(report.samples.len(), 10);
    }

    #[test]
    fn test_link_floor_fails_independently() {
        let manifest = catalogue_manifest(&["/docs/en/foo"]);
        let corpus = LinkCorpus::from_documents([("a.md", "[x](/docs/en/foo)")]);
        let report = check_internal_links(&corpus, &LinkRules::default(), &manifest, &Thresholds::default());
        assert_eq!(report.outcome, Outcome::Fail);
        assert!(report.message.contains("link extraction may be broken"));
    }

    #[test]
    fn test_fragment_format() {
        for valid in ["#section-name", "#overview", "#getting-started"] {
            assert!(is_valid_fragment(valid), "{valid}");
        }
        for invalid in ["#", "##double", "#spaces in fragment", "#Upper", "#snake_case"] {
            assert!(!is_valid_fragment(invalid), "{invalid}");
        }

        let corpus = LinkCorpus::from_documents([(
            "a.md",
            "[a](#ok-one) [b](/en/x#Bad_One) [c](/en/y) [d](./sibling#Also_Bad)\n\
             [source](https://github.com/org/repo/blob/main/lib.rs#L10)",
        )]);
        let report = check_fragments(&corpus, &LinkRules::default());
        assert_eq!(report.outcome, Outcome::Warn);
        assert_eq!(report.total, Some(3), "external anchors are not checked");
        assert_eq!(
            report.samples,
            vec!["[a.md:1] /en/x#Bad_One", "[a.md:1] ./sibling#Also_Bad"]
        );

        let external_only = LinkCorpus::from_documents([("a.md", "[gh](https://github.com/x#L10)")]);
        assert_eq!(check_fragments(&external_only, &LinkRules::default()).outcome, Outcome::Pass);
    }

    #[test]
    fn test_wrapped_link_text_is_extracted() {
        let content = "Intro line.\nSee [the long\n  hooks guide](/en/hooks) and [b](/en/b).\n\n[dangling\n\nnot](/en/c)";
        let links = extract_links(content);
        let summary: Vec<(&str, &str, usize)> =
            links.iter().map(|l| (l.text.as_str(), l.target.as_str(), l.line)).collect();
        assert_eq!(
            summary,
            vec![("the long hooks guide", "/en/hooks", 2), ("b", "/en/b", 3)],
            "text never spans a blank line"
        );
    }

    #[test]
    fn test_empty_text_links_are_not_counted_as_internal() {
        let manifest = catalogue_manifest(&["/docs/en/foo"]);
        let corpus = LinkCorpus::from_documents([("a.md", "[x](/docs/en/foo) [](/docs/en/missing)")]);
        let report = check_internal_links(&corpus, &LinkRules::default(), &manifest, &low_floor());
        assert_eq!(report.total, Some(1));
        assert_eq!(report.outcome, Outcome::Pass);
    }

    #[test]
    fn test_link_text() {
        let corpus = LinkCorpus::from_documents([("a.md", "[Hooks](/en/hooks) ![](/img.png)")]);
        assert_eq!(check_link_text(&corpus).outcome, Outcome::Pass);

        let corpus = LinkCorpus::from_documents([("a.md", "[ ](/en/hooks)")]);
        let report = check_link_text(&corpus);
        assert_eq!(report.outcome, Outcome::Warn);
        assert_eq!(report.samples, vec!["[a.md:1] -> /en/hooks"]);
    }

    #[test]
    fn test_descriptive_text_threshold() {
        let thresholds = Thresholds::default();
        let mostly_good = LinkCorpus::from_documents([(
            "a.md",
            "[Hooks guide](/en/hooks) [here](/en/a) [Settings](/en/settings) [Click](/en/b)",
        )]);
        let report = check_descriptive_text(&mostly_good, &thresholds);
        assert_eq!(report.outcome, Outcome::Pass, "exactly 50% passes");
        assert_eq!(report.offending, Some(2));

        let mostly_generic =
            LinkCorpus::from_documents([("a.md", "[here](/en/a) [this](/en/b) [Setup](/en/c)")]);
        assert_eq!(check_descriptive_text(&mostly_generic, &thresholds).outcome, Outcome::Fail);

        assert_eq!(
            check_descriptive_text(&LinkCorpus::default(), &thresholds).outcome,
            Outcome::Pass
        );
    }

    #[test]
    fn test_corpus_load_reads_named_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "[x](/en/a)\n[y](https://example.com)").unwrap();
        let names: BTreeSet<String> = ["a.md".to_string(), "gone.md".to_string()].into_iter().collect();
        let corpus = LinkCorpus::load(dir.path(), &names);
        assert_eq!(corpus.link_count(), 2);
        let kinds = corpus.kind_counts(&LinkRules::default());
        assert_eq!(kinds[&LinkKind::Internal], 1);
        assert_eq!(kinds[&LinkKind::External], 1);
    }
}
