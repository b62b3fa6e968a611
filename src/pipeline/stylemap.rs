//! Style-mapping rules: which HTML element a DOCX structure becomes.
//!
//! Rules use the textual `selector => target` form familiar from mammoth:
//!
//! ```text
//! p[style-name='Heading 1'] => h1:fresh
//! r[style-name='Strong']    => strong
//! table                     => table.w-full.border-collapse.my-4
//! p[style-name='Caption']   => p.caption > em:fresh
//! r[style-name='Hyperlink'] =>
//! ```
//!
//! A map is an ordered list; the first rule whose selector matches wins.
//! An empty target means "no wrapper element".

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use thiserror::Error;

/// Rules that always apply, in priority order.
pub const EXPLICIT_RULES: &[&str] = &[
    "p[style-name='Heading 1'] => h1:fresh",
    "p[style-name='Heading 2'] => h2:fresh",
    "p[style-name='Heading 3'] => h3:fresh",
    "p[style-name='Heading 4'] => h4:fresh",
    "p[style-name='Heading 5'] => h5:fresh",
    "p[style-name='Heading 6'] => h6:fresh",
    "p[style-name='Title'] => h1.title:fresh",
    "p[style-name='Subtitle'] => h2.subtitle:fresh",
    "table => table.w-full.border-collapse.my-4",
    "tr => tr",
    "td => td.p-2.border",
    "th => th.p-2.border.font-bold",
    "r[style-name='Strong'] => strong",
    "r[style-name='Emphasis'] => em",
    "r[style-name='Underline'] => u",
    "chart => div.chart-container.relative",
];

/// Fallback rules appended when `include_default_style_map` is on.
pub const DEFAULT_RULES: &[&str] = &[
    "p.Heading1 => h1:fresh",
    "p.Heading2 => h2:fresh",
    "p.Heading3 => h3:fresh",
    "p.Heading4 => h4:fresh",
    "p.Heading5 => h5:fresh",
    "p.Heading6 => h6:fresh",
    "p[style-name='Normal'] => p:fresh",
    "p[style-name='Body Text'] => p:fresh",
    "p[style-name='List Paragraph'] => p:fresh",
    "p[style-name='footnote text'] => p:fresh",
    "p[style-name='endnote text'] => p:fresh",
    "r[style-name='Hyperlink'] =>",
    "r[style-name='Default Paragraph Font'] =>",
    "r[style-name='footnote reference'] =>",
    "r[style-name='endnote reference'] =>",
];

static RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<sel>\S.*?)\s*=>\s*(?P<target>.*?)\s*$").unwrap());

static STYLED_SELECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<el>[pr])(?:\[style-name='(?P<name>[^']*)'\]|\.(?P<id>[A-Za-z0-9_-]+))?$")
        .unwrap()
});

static TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<tag>[a-z][a-z0-9]*)(?P<classes>(?:\.[A-Za-z0-9_-]+)*)(?P<fresh>:fresh)?$")
        .unwrap()
});

/// Why a rule string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleRuleError {
    #[error("expected `selector => target`")]
    MissingArrow,
    #[error("unsupported selector '{0}'")]
    BadSelector(String),
    #[error("unsupported target element '{0}'")]
    BadTarget(String),
}

/// How a paragraph or run style is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleMatcher {
    /// `p` / `r` with no qualifier.
    Any,
    /// `[style-name='…']`, compared against the display name ignoring
    /// ASCII case (Word stores built-in names such as `heading 1` in lower
    /// case).
    Name(String),
    /// `.StyleId`, compared against the style identifier.
    Id(String),
}

impl StyleMatcher {
    fn matches(&self, name: Option<&str>, id: Option<&str>) -> bool {
        match self {
            StyleMatcher::Any => true,
            StyleMatcher::Name(n) => name.is_some_and(|name| name.eq_ignore_ascii_case(n)),
            StyleMatcher::Id(i) => id == Some(i.as_str()),
        }
    }
}

/// The left-hand side of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Paragraph(StyleMatcher),
    Run(StyleMatcher),
    Table,
    Row,
    Cell,
    HeaderCell,
    Chart,
}

/// One element of a rule's target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetElement {
    pub tag: String,
    pub classes: Vec<String>,
    pub fresh: bool,
}

impl TargetElement {
    /// `<tag class="a b">` plus any extra attributes already formatted as
    /// ` name="value"` pairs.
    pub fn open_tag(&self, extra_attrs: &str) -> String {
        let mut s = format!("<{}", self.tag);
        if !self.classes.is_empty() {
            let _ = write!(s, " class=\"{}\"", self.classes.join(" "));
        }
        s.push_str(extra_attrs);
        s.push('>');
        s
    }

    pub fn close_tag(&self) -> String {
        format!("</{}>", self.tag)
    }

    /// Heading level for `h1`..`h6`.
    pub fn heading_level(&self) -> Option<u8> {
        let rest = self.tag.strip_prefix('h')?;
        match rest.parse::<u8>() {
            Ok(n @ 1..=6) => Some(n),
            _ => None,
        }
    }
}

/// A parsed `selector => target` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: Selector,
    /// Outermost element first. Empty means "no wrapper".
    pub path: Vec<TargetElement>,
}

impl StyleRule {
    pub fn parse(text: &str) -> Result<Self, StyleRuleError> {
        let caps = RULE_RE.captures(text).ok_or(StyleRuleError::MissingArrow)?;
        let selector = parse_selector(&caps["sel"])?;
        let target = caps["target"].trim();
        let path = if target.is_empty() {
            Vec::new()
        } else {
            target
                .split('>')
                .map(|part| parse_target_element(part.trim()))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self { selector, path })
    }

    /// Innermost element of the path (the one that receives content).
    pub fn leaf(&self) -> Option<&TargetElement> {
        self.path.last()
    }
}

fn parse_selector(sel: &str) -> Result<Selector, StyleRuleError> {
    match sel {
        "table" => return Ok(Selector::Table),
        "tr" => return Ok(Selector::Row),
        "td" => return Ok(Selector::Cell),
        "th" => return Ok(Selector::HeaderCell),
        "chart" => return Ok(Selector::Chart),
        _ => {}
    }
    let caps = STYLED_SELECTOR_RE
        .captures(sel)
        .ok_or_else(|| StyleRuleError::BadSelector(sel.to_string()))?;
    let matcher = if let Some(name) = caps.name("name") {
        StyleMatcher::Name(name.as_str().to_string())
    } else if let Some(id) = caps.name("id") {
        StyleMatcher::Id(id.as_str().to_string())
    } else {
        StyleMatcher::Any
    };
    Ok(match &caps["el"] {
        "p" => Selector::Paragraph(matcher),
        _ => Selector::Run(matcher),
    })
}

fn parse_target_element(part: &str) -> Result<TargetElement, StyleRuleError> {
    let caps = TARGET_RE
        .captures(part)
        .ok_or_else(|| StyleRuleError::BadTarget(part.to_string()))?;
    let classes = caps["classes"]
        .split('.')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    Ok(TargetElement {
        tag: caps["tag"].to_string(),
        classes,
        fresh: caps.name("fresh").is_some(),
    })
}

/// An ordered list of rules.
#[derive(Debug, Clone)]
pub struct StyleMap {
    rules: Vec<StyleRule>,
}

impl StyleMap {
    /// Caller rules first, then [`EXPLICIT_RULES`], then optionally
    /// [`DEFAULT_RULES`].
    pub fn new(extra: &[String], include_defaults: bool) -> Result<Self, StyleRuleError> {
        let mut rules = Vec::new();
        for text in extra {
            rules.push(StyleRule::parse(text)?);
        }
        for text in EXPLICIT_RULES {
            rules.push(StyleRule::parse(text)?);
        }
        if include_defaults {
            for text in DEFAULT_RULES {
                rules.push(StyleRule::parse(text)?);
            }
        }
        Ok(Self { rules })
    }

    /// The built-in map: explicit plus default rules.
    pub fn standard() -> Self {
        Self::new(&[], true).expect("built-in style rules are valid")
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn paragraph(&self, name: Option<&str>, id: Option<&str>) -> Option<&StyleRule> {
        self.rules.iter().find(|r| match &r.selector {
            Selector::Paragraph(StyleMatcher::Any) => false,
            Selector::Paragraph(m) => m.matches(name, id),
            _ => false,
        })
    }

    pub fn run(&self, name: Option<&str>, id: Option<&str>) -> Option<&StyleRule> {
        self.rules.iter().find(|r| match &r.selector {
            Selector::Run(StyleMatcher::Any) => false,
            Selector::Run(m) => m.matches(name, id),
            _ => false,
        })
    }

    /// Rule for one of the structural selectors (`table`, `tr`, `td`, `th`, `chart`).
    pub fn structural(&self, selector: &Selector) -> Option<&StyleRule> {
        self.rules.iter().find(|r| &r.selector == selector)
    }
}

impl Default for StyleMap {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heading_rule() {
        let rule = StyleRule::parse("p[style-name='Heading 1'] => h1:fresh").unwrap();
        assert_eq!(
            rule.selector,
            Selector::Paragraph(StyleMatcher::Name("Heading 1".into()))
        );
        let leaf = rule.leaf().unwrap();
        assert_eq!(leaf.tag, "h1");
        assert!(leaf.fresh);
        assert_eq!(leaf.heading_level(), Some(1));
    }

    #[test]
    fn parses_classes_and_nested_paths() {
        let rule = StyleRule::parse("p[style-name='Caption'] => div.figure > p.caption:fresh")
            .unwrap();
        assert_eq!(rule.path.len(), 2);
        assert_eq!(rule.path[0].open_tag(""), "<div class=\"figure\">");
        assert_eq!(rule.path[1].classes, vec!["caption".to_string()]);

        let table = StyleRule::parse("table => table.w-full.border-collapse.my-4").unwrap();
        assert_eq!(
            table.leaf().unwrap().open_tag(""),
            "<table class=\"w-full border-collapse my-4\">"
        );
    }

    #[test]
    fn empty_target_means_no_wrapper() {
        let rule = StyleRule::parse("r[style-name='Hyperlink'] =>").unwrap();
        assert!(rule.path.is_empty());
        assert!(rule.leaf().is_none());
    }

    #[test]
    fn rejects_malformed_rules() {
        assert_eq!(
            StyleRule::parse("h1:fresh").unwrap_err(),
            StyleRuleError::MissingArrow
        );
        assert!(matches!(
            StyleRule::parse("x[style-name='A'] => p").unwrap_err(),
            StyleRuleError::BadSelector(_)
        ));
        assert!(matches!(
            StyleRule::parse("p => 1bad").unwrap_err(),
            StyleRuleError::BadTarget(_)
        ));
    }

    #[test]
    fn first_matching_rule_wins() {
        let map = StyleMap::new(&["p[style-name='Heading 1'] => h2.demoted:fresh".into()], true)
            .unwrap();
        let rule = map.paragraph(Some("Heading 1"), Some("Heading1")).unwrap();
        assert_eq!(rule.leaf().unwrap().tag, "h2");
    }

    #[test]
    fn style_id_fallback_needs_defaults() {
        let with = StyleMap::new(&[], true).unwrap();
        assert!(with.paragraph(None, Some("Heading3")).is_some());

        let without = StyleMap::new(&[], false).unwrap();
        assert!(without.paragraph(None, Some("Heading3")).is_none());
        assert!(without.paragraph(Some("Title"), None).is_some());
    }

    #[test]
    fn style_names_match_ignoring_case() {
        let map = StyleMap::new(&[], false).unwrap();
        let rule = map.paragraph(Some("heading 2"), Some("Heading2")).unwrap();
        assert_eq!(rule.leaf().unwrap().heading_level(), Some(2));
        assert!(map.run(Some("STRONG"), None).is_some());
        assert!(map.paragraph(Some("heading 22"), None).is_none());
    }

    #[test]
    fn structural_rules_present() {
        let map = StyleMap::standard();
        let th = map.structural(&Selector::HeaderCell).unwrap();
        assert_eq!(th.leaf().unwrap().classes, vec!["p-2", "border", "font-bold"]);
        let chart = map.structural(&Selector::Chart).unwrap();
        assert_eq!(chart.leaf().unwrap().tag, "div");
    }

    #[test]
    fn run_rules() {
        let map = StyleMap::standard();
        assert_eq!(
            map.run(Some("Strong"), None).unwrap().leaf().unwrap().tag,
            "strong"
        );
        assert!(map.run(Some("Hyperlink"), None).unwrap().path.is_empty());
        assert!(map.run(Some("Fancy Run"), None).is_none());
    }
}
