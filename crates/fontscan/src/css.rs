//! CSS font extraction
//!
//! Stylesheets are parsed with lightningcss in error-recovery mode, so one
//! bad rule or declaration is skipped (and reported) without losing the
//! rest of the block. Only the parts that matter for fonts are read:
//! `@font-face` descriptors, `font-family` and `font` declarations, and
//! `@import` targets. Group rules (`@media`, `@supports`, `@layer`,
//! `@container`) and nested style rules are descended into.

use crate::error::ParseError;
use crate::types::{CssBlock, FontRule, RuleKind};
use lightningcss::declaration::DeclarationBlock;
use lightningcss::error::{Error as LcssError, ParserError};
use lightningcss::printer::PrinterOptions;
use lightningcss::properties::Property;
use lightningcss::rules::font_face::{FontFaceProperty, FontFaceRule, Source};
use lightningcss::rules::style::StyleRule;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;
use regex::Regex;
use std::sync::{Arc, LazyLock, RwLock};
use tracing::debug;
use url::Url;

/// Selector recorded for declarations found in `style=""` attributes
pub const INLINE_STYLE_SELECTOR: &str = "[inline style]";

/// Values of `font-family` that name no font
const CSS_WIDE_KEYWORDS: &[&str] = &["inherit", "initial", "unset", "revert", "revert-layer"];

/// Absolute-size and relative-size keywords allowed in the `font` shorthand
const SIZE_KEYWORDS: &[&str] = &[
    "xx-small", "x-small", "small", "medium", "large", "x-large", "xx-large", "xxx-large",
    "larger", "smaller",
];

static LENGTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d*\.?\d+)(px|em|rem|%|pt|pc|in|cm|mm|q|ex|ch|vw|vh|vmin|vmax|lh)(/\S*)?$")
        .expect("Failed to compile length regex - this is a bug")
});

/// Recoverable errors lightningcss collects while parsing
type Warnings<'i> = Arc<RwLock<Vec<LcssError<ParserError<'i>>>>>;

/// Rules and errors found in one block
#[derive(Debug, Default)]
pub struct CssFindings {
    pub rules: Vec<FontRule>,
    pub errors: Vec<ParseError>,
}

/// Extract every font rule from a CSS block
///
/// `page_url` resolves relative `src` URLs of inline blocks; external and
/// imported blocks resolve against their own location.
pub fn extract_rules(block: &CssBlock, page_url: &Url) -> CssFindings {
    let base = Url::parse(&block.location).unwrap_or_else(|_| page_url.clone());
    let mut extractor = Extractor {
        origin: block.describe(),
        base,
        findings: CssFindings::default(),
    };

    let warnings = Warnings::default();
    match StyleSheet::parse(&block.content, parser_options(&warnings)) {
        Ok(sheet) => {
            extractor.record_warnings(&warnings);
            extractor.rules(&sheet.rules);
        }
        Err(error) => {
            extractor.record_warnings(&warnings);
            let error = syntax_error(&extractor.origin, &error);
            extractor.findings.errors.push(error);
        }
    }
    extractor.findings
}

/// Extract font rules from the value of a `style=""` attribute
pub fn extract_inline_style(style: &str) -> Vec<FontRule> {
    let warnings = Warnings::default();
    match StyleAttribute::parse(style, parser_options(&warnings)) {
        Ok(attribute) => {
            declaration_rules(&attribute.declarations, INLINE_STYLE_SELECTOR, "style attribute")
        }
        Err(error) => {
            debug!(error = %error, "Unparsable style attribute");
            Vec::new()
        }
    }
}

/// Find `@import` targets, resolved against `base`
pub fn find_imports(css: &str, base: &Url) -> Vec<Url> {
    let warnings = Warnings::default();
    let Ok(sheet) = StyleSheet::parse(css, parser_options(&warnings)) else {
        return Vec::new();
    };
    sheet
        .rules
        .0
        .iter()
        .filter_map(|rule| match rule {
            CssRule::Import(import) => base.join(import.url.trim()).ok(),
            _ => None,
        })
        .collect()
}

/// Quick check that a body looks like CSS at all
pub fn looks_like_css(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["@", "{", "font-family"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Split a `font-family` value into individual family names
///
/// Commas inside quotes do not split. Names are normalized; CSS-wide
/// keywords and `var()` references are dropped.
pub fn split_font_stack(value: &str) -> Vec<String> {
    let mut families = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in value.chars() {
        match (quote, c) {
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, ',') => {
                families.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    families.push(current);

    families
        .iter()
        .map(|family| normalize_family(family))
        .filter(|family| {
            !family.is_empty()
                && !family.to_lowercase().starts_with("var(")
                && !CSS_WIDE_KEYWORDS.contains(&family.to_lowercase().as_str())
        })
        .collect()
}

/// Trim whitespace, strip surrounding quotes and collapse inner whitespace
pub fn normalize_family(name: &str) -> String {
    let trimmed = name.trim();
    let unquoted = trimmed
        .strip_prefix(['"', '\''])
        .map(|rest| rest.strip_suffix(['"', '\'']).unwrap_or(rest))
        .unwrap_or(trimmed);
    unquoted.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a weight value: keywords map to their numeric weight
pub fn normalize_weight(value: &str) -> String {
    let value = clean_value(value).to_lowercase();
    match value.as_str() {
        "normal" => "400".to_string(),
        "bold" => "700".to_string(),
        _ => value,
    }
}

/// Infer a font format from the URL's file extension
pub fn format_from_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    let format = if path.ends_with(".woff2") {
        "woff2"
    } else if path.ends_with(".woff") {
        "woff"
    } else if path.ends_with(".ttf") {
        "truetype"
    } else if path.ends_with(".otf") {
        "opentype"
    } else if path.ends_with(".eot") {
        "embedded-opentype"
    } else if path.ends_with(".svg") {
        "svg"
    } else {
        return None;
    };
    Some(format.to_string())
}

fn parser_options<'o, 'i>(warnings: &Warnings<'i>) -> ParserOptions<'o, 'i> {
    ParserOptions {
        error_recovery: true,
        warnings: Some(Arc::clone(warnings)),
        ..ParserOptions::default()
    }
}

fn syntax_error(origin: &str, error: &LcssError<ParserError<'_>>) -> ParseError {
    let (line, column) = error
        .loc
        .as_ref()
        .map(|loc| (loc.line + 1, loc.column))
        .unwrap_or((0, 0));
    ParseError::Syntax {
        origin: origin.to_string(),
        line,
        column,
        message: error.kind.to_string(),
    }
}

/// Serialize any lightningcss value back to CSS text
fn css_string<T: ToCss>(value: &T) -> Option<String> {
    value.to_css_string(PrinterOptions::default()).ok()
}

/// Serialized value of a declaration, without its name
fn value_string(property: &Property<'_>) -> Option<String> {
    property.value_to_css_string(PrinterOptions::default()).ok()
}

struct Extractor {
    origin: String,
    base: Url,
    findings: CssFindings,
}

impl Extractor {
    fn record_warnings(&mut self, warnings: &Warnings<'_>) {
        if let Ok(warnings) = warnings.read() {
            for warning in warnings.iter() {
                debug!(origin = %self.origin, warning = %warning, "Skipped invalid CSS");
                let error = syntax_error(&self.origin, warning);
                self.findings.errors.push(error);
            }
        }
    }

    fn rules(&mut self, rules: &CssRuleList<'_>) {
        for rule in &rules.0 {
            match rule {
                CssRule::FontFace(face) => self.font_face(face),
                CssRule::Style(style) => self.style(style),
                CssRule::Media(media) => self.rules(&media.rules),
                CssRule::Supports(supports) => self.rules(&supports.rules),
                CssRule::LayerBlock(layer) => self.rules(&layer.rules),
                CssRule::Container(container) => self.rules(&container.rules),
                // @keyframes, @page, @font-feature-values, ...
                _ => {}
            }
        }
    }

    fn style(&mut self, style: &StyleRule<'_>) {
        let selector = style
            .selectors
            .0
            .iter()
            .filter_map(css_string)
            .collect::<Vec<_>>()
            .join(", ");
        let rules = declaration_rules(&style.declarations, &selector, &self.origin);
        self.findings.rules.extend(rules);
        self.rules(&style.rules);
    }

    fn font_face(&mut self, face: &FontFaceRule<'_>) {
        let mut family = None;
        let mut source = None;
        let mut weight = None;
        let mut style = None;
        let mut unicode_range = None;

        for property in &face.properties {
            match property {
                FontFaceProperty::FontFamily(name) => {
                    family = css_string(name)
                        .map(|name| normalize_family(&name))
                        .filter(|name| !name.is_empty());
                }
                FontFaceProperty::Source(sources) => source = self.font_source(sources),
                other => {
                    let Some(text) = css_string(other) else {
                        continue;
                    };
                    let Some((name, value)) = text.split_once(':') else {
                        continue;
                    };
                    match name.trim().to_lowercase().as_str() {
                        "font-weight" => weight = Some(normalize_weight(value)),
                        "font-style" => style = Some(clean_value(value).to_lowercase()),
                        "unicode-range" => unicode_range = Some(clean_value(value)),
                        _ => {}
                    }
                }
            }
        }

        let Some(family) = family else {
            self.findings.errors.push(ParseError::MissingFamily {
                origin: self.origin.clone(),
            });
            return;
        };

        let mut rule = FontRule::new(family, RuleKind::FontFace, self.origin.clone());
        if let Some((url, format)) = source {
            if !url.starts_with("data:") {
                rule.source_url = Some(url);
            }
            rule.format = format;
        }
        rule.weight = weight;
        rule.style = style;
        rule.unicode_range = unicode_range;
        self.findings.rules.push(rule);
    }

    /// First `url()` entry of a `src` list: its resolved URL and format
    ///
    /// `local()` entries are skipped. The format comes from the `format()`
    /// hint, or failing that from the file extension.
    fn font_source(&self, sources: &[Source<'_>]) -> Option<(String, Option<String>)> {
        sources.iter().find_map(|source| match source {
            Source::Url(src) => {
                let raw = src.url.url.trim();
                let url = if raw.starts_with("data:") {
                    raw.to_string()
                } else {
                    self.base
                        .join(raw)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| raw.to_string())
                };
                let format = src
                    .format
                    .as_ref()
                    .and_then(|format| css_string(format))
                    .map(|format| normalize_family(&format).to_lowercase())
                    .or_else(|| format_from_extension(&url));
                Some((url, format))
            }
            _ => None,
        })
    }
}

/// Build property-declaration rules from one declaration block
///
/// Later declarations win, as the cascade within one rule would have it.
fn declaration_rules(block: &DeclarationBlock<'_>, selector: &str, origin: &str) -> Vec<FontRule> {
    let mut weight = None;
    let mut style = None;
    let mut families = Vec::new();

    for property in block
        .declarations
        .iter()
        .chain(block.important_declarations.iter())
    {
        if let Property::Font(font) = property {
            families.extend(
                font.family
                    .iter()
                    .filter_map(css_string)
                    .flat_map(|family| split_font_stack(&family)),
            );
            weight = css_string(&font.weight)
                .filter(|w| *w != "normal")
                .map(|w| normalize_weight(&w))
                .or(weight);
            style = css_string(&font.style)
                .filter(|s| *s != "normal")
                .or(style);
            continue;
        }

        let id = property.property_id();
        match id.name() {
            "font-family" => {
                if let Some(value) = value_string(property) {
                    families.extend(split_font_stack(&value));
                }
            }
            "font-weight" => weight = value_string(property).map(|w| normalize_weight(&w)),
            "font-style" => style = value_string(property).map(|s| clean_value(&s).to_lowercase()),
            // Shorthand lightningcss kept unparsed, e.g. because of var()
            "font" => {
                if let Some(value) = value_string(property) {
                    let shorthand = parse_font_shorthand(&value);
                    families.extend(shorthand.families);
                    weight = shorthand.weight.or(weight);
                    style = shorthand.style.or(style);
                }
            }
            _ => {}
        }
    }

    families
        .into_iter()
        .map(|family| FontRule {
            selector: selector.to_string(),
            weight: weight.clone(),
            style: style.clone(),
            ..FontRule::new(family, RuleKind::Declaration, origin)
        })
        .collect()
}

#[derive(Debug, Default, PartialEq)]
struct Shorthand {
    families: Vec<String>,
    weight: Option<String>,
    style: Option<String>,
}

/// Parse `font: [style] [variant] [weight] size[/line-height] family, ...`
fn parse_font_shorthand(value: &str) -> Shorthand {
    let value = clean_value(value);
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let mut shorthand = Shorthand::default();

    let Some(size_at) = tokens.iter().position(|token| {
        LENGTH_RE.is_match(token) || SIZE_KEYWORDS.contains(&token.to_lowercase().as_str())
    }) else {
        // System font keywords (caption, menu, ...) carry no family
        return shorthand;
    };

    for token in &tokens[..size_at] {
        let lower = token.to_lowercase();
        match lower.as_str() {
            "italic" | "oblique" => shorthand.style = Some(lower),
            "bold" | "bolder" | "lighter" => shorthand.weight = Some(normalize_weight(&lower)),
            _ if lower.parse::<u16>().is_ok() => shorthand.weight = Some(lower),
            _ => {}
        }
    }

    let mut rest = &tokens[size_at + 1..];
    // Line height spelled apart from the size: "12px / 1.5" or "12px /1.5"
    match rest.first() {
        Some(&"/") => rest = &rest[rest.len().min(2)..],
        Some(token) if token.starts_with('/') => rest = &rest[1..],
        _ => {}
    }
    shorthand.families = split_font_stack(&rest.join(" "));
    shorthand
}

fn clean_value(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    normalize_family(&collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    fn families(findings: &CssFindings) -> Vec<&str> {
        findings.rules.iter().map(|r| r.family.as_str()).collect()
    }

    #[test]
    fn test_split_font_stack() {
        assert_eq!(split_font_stack("Arial, sans-serif"), vec!["Arial", "sans-serif"]);
        assert_eq!(
            split_font_stack("\"Times New Roman\", Times, serif"),
            vec!["Times New Roman", "Times", "serif"]
        );
        assert_eq!(
            split_font_stack("'Courier New', Courier, monospace"),
            vec!["Courier New", "Courier", "monospace"]
        );
        assert_eq!(split_font_stack("\"Foo, Bar\", serif"), vec!["Foo, Bar", "serif"]);
        assert!(split_font_stack("inherit").is_empty());
        assert_eq!(split_font_stack("var(--brand), Arial"), vec!["Arial"]);
    }

    #[test]
    fn test_normalize_family() {
        assert_eq!(normalize_family("  'Open   Sans' "), "Open Sans");
        assert_eq!(normalize_family("\"Roboto\""), "Roboto");
        assert_eq!(normalize_family("Helvetica Neue"), "Helvetica Neue");
    }

    #[test]
    fn test_font_face_with_src_and_format() {
        let block = CssBlock::inline(
            r#"@font-face {
                font-family: "Roboto";
                src: local("Roboto"), url(r.woff2) format("woff2"), url(r.woff) format("woff");
                font-weight: 400;
                font-style: normal;
                unicode-range: U+0000-00FF;
            }"#,
        );

        let findings = extract_rules(&block, &page());

        assert!(findings.errors.is_empty());
        assert_eq!(findings.rules.len(), 1);
        let rule = &findings.rules[0];
        assert_eq!(rule.family, "Roboto");
        assert_eq!(rule.kind, RuleKind::FontFace);
        assert_eq!(rule.selector, "");
        assert_eq!(rule.weight.as_deref(), Some("400"));
        assert_eq!(rule.style.as_deref(), Some("normal"));
        assert_eq!(rule.format.as_deref(), Some("woff2"));
        assert_eq!(
            rule.source_url.as_deref(),
            Some("https://example.com/blog/r.woff2")
        );
        assert!(rule
            .unicode_range
            .as_deref()
            .is_some_and(|range| range.starts_with("U+")));
    }

    #[test]
    fn test_font_face_src_resolves_against_stylesheet() {
        let block = CssBlock::external(
            "https://cdn.example.net/css/site.css",
            "@font-face { font-family: Brand; src: url('../fonts/brand.ttf'); }",
        );

        let findings = extract_rules(&block, &page());

        let rule = &findings.rules[0];
        assert_eq!(
            rule.source_url.as_deref(),
            Some("https://cdn.example.net/fonts/brand.ttf")
        );
        assert_eq!(rule.format.as_deref(), Some("truetype"));
    }

    #[test]
    fn test_font_face_without_family_is_error() {
        let block = CssBlock::inline("@font-face { src: url(a.woff); } p { font-family: Arial; }");

        let findings = extract_rules(&block, &page());

        assert_eq!(
            findings.errors,
            vec![ParseError::MissingFamily {
                origin: "inline".to_string()
            }]
        );
        assert_eq!(families(&findings), vec!["Arial"]);
    }

    #[test]
    fn test_declarations_one_rule_per_family() {
        let block = CssBlock::inline(
            "body { font-family: Roboto, Arial, sans-serif; font-weight: bold }\n\
             .header { font-family: \"Georgia\", serif; font-style: italic; }",
        );

        let findings = extract_rules(&block, &page());

        assert_eq!(
            families(&findings),
            vec!["Roboto", "Arial", "sans-serif", "Georgia", "serif"]
        );
        assert!(findings.rules[..3].iter().all(|r| r.selector == "body"));
        assert!(findings.rules[..3]
            .iter()
            .all(|r| r.weight.as_deref() == Some("700")));
        assert_eq!(findings.rules[3].selector, ".header");
        assert_eq!(findings.rules[3].style.as_deref(), Some("italic"));
    }

    #[test]
    fn test_media_queries_and_comments() {
        let block = CssBlock::inline(
            "/* body { font-family: Hidden; } */\n\
             @media (max-width: 600px) { h1, h2 { font-family: Lato !important; } }\n\
             @keyframes spin { from { font-family: Nope; } }",
        );

        let findings = extract_rules(&block, &page());

        assert_eq!(families(&findings), vec!["Lato"]);
        assert_eq!(findings.rules[0].selector, "h1, h2");
    }

    #[test]
    fn test_font_shorthand() {
        let block = CssBlock::inline(
            "p { font: italic bold 12px/30px Georgia, serif; }\n\
             small { font: 0.8em \"Open Sans\"; }\n\
             caption { font: caption; }",
        );

        let findings = extract_rules(&block, &page());

        assert_eq!(families(&findings), vec!["Georgia", "serif", "Open Sans"]);
        assert_eq!(findings.rules[0].weight.as_deref(), Some("700"));
        assert_eq!(findings.rules[0].style.as_deref(), Some("italic"));
        assert_eq!(findings.rules[2].weight, None);
    }

    #[test]
    fn test_invalid_rule_is_skipped_and_recorded() {
        let block = CssBlock::inline(
            "!!! { font-family: Nope; }\na { font-family: Arial; }\nb { font-family: Verdana;",
        );

        let findings = extract_rules(&block, &page());

        // The unclosed last block ends at end of input
        assert_eq!(families(&findings), vec!["Arial", "Verdana"]);
        assert!(!findings.errors.is_empty());
        assert!(matches!(
            &findings.errors[0],
            ParseError::Syntax { origin, line: 1, .. } if origin == "inline"
        ));
    }

    #[test]
    fn test_braces_in_strings_do_not_nest() {
        let block =
            CssBlock::inline("a::before { content: \"{\"; font-family: Menlo; } b { font-family: Monaco; }");

        let findings = extract_rules(&block, &page());

        assert!(findings.errors.is_empty());
        assert_eq!(families(&findings), vec!["Menlo", "Monaco"]);
    }

    #[test]
    fn test_comment_markers_in_strings() {
        let block = CssBlock::inline(
            "a::before { content: \"/*\"; } body { font-family: Lato; } b::after { content: \"*/\"; }",
        );

        let findings = extract_rules(&block, &page());

        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
        assert_eq!(families(&findings), vec!["Lato"]);
        assert_eq!(findings.rules[0].selector, "body");
    }

    #[test]
    fn test_nested_style_rules() {
        let block = CssBlock::inline(".card { font-family: Inter; .title { font-family: Lora; } }");

        let findings = extract_rules(&block, &page());

        assert_eq!(families(&findings), vec!["Inter", "Lora"]);
        assert_eq!(findings.rules[0].selector, ".card");
        assert!(findings.rules[1].selector.ends_with(".title"));
    }

    #[test]
    fn test_layer_and_supports_blocks() {
        let block = CssBlock::inline(
            "@layer base { html { font-family: 'IBM Plex Sans'; } }\n\
             @supports (display: grid) { main { font-family: Karla; } }",
        );

        let findings = extract_rules(&block, &page());

        assert_eq!(families(&findings), vec!["IBM Plex Sans", "Karla"]);
    }

    #[test]
    fn test_shorthand_line_height_token() {
        assert_eq!(
            parse_font_shorthand("12px /30px Georgia").families,
            vec!["Georgia"]
        );
        assert_eq!(
            parse_font_shorthand("bold 12px / 1.5 Arial, sans-serif"),
            Shorthand {
                families: vec!["Arial".to_string(), "sans-serif".to_string()],
                weight: Some("700".to_string()),
                style: None,
            }
        );
        assert_eq!(
            parse_font_shorthand("italic 1em/1.2 \"Open Sans\", var(--x)").families,
            vec!["Open Sans"]
        );
    }

    #[test]
    fn test_font_shorthand_with_spaced_line_height() {
        let block = CssBlock::inline("p { font: 12px /30px Georgia; }");

        let findings = extract_rules(&block, &page());

        assert_eq!(families(&findings), vec!["Georgia"]);
    }

    #[test]
    fn test_inline_style_attribute() {
        let rules = extract_inline_style("color: red; font-family: 'Comic Sans MS', cursive; font-weight: 300");

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].family, "Comic Sans MS");
        assert_eq!(rules[0].selector, INLINE_STYLE_SELECTOR);
        assert_eq!(rules[0].weight.as_deref(), Some("300"));
    }

    #[test]
    fn test_find_imports() {
        let css = "@import url(\"base.css\");\n@import 'theme.css' screen;\n\
                   @import url(https://fonts.googleapis.com/css?family=Lato);\n\
                   /* @import 'ignored.css'; */";
        let base = Url::parse("https://example.com/css/main.css").unwrap();

        let imports: Vec<String> = find_imports(css, &base)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            imports,
            vec![
                "https://example.com/css/base.css",
                "https://example.com/css/theme.css",
                "https://fonts.googleapis.com/css?family=Lato",
            ]
        );
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(format_from_extension("a.woff2?v=3").as_deref(), Some("woff2"));
        assert_eq!(format_from_extension("a.WOFF").as_deref(), Some("woff"));
        assert_eq!(format_from_extension("a.eot#iefix").as_deref(), Some("embedded-opentype"));
        assert_eq!(format_from_extension("a.css"), None);
    }

    #[test]
    fn test_looks_like_css() {
        assert!(looks_like_css("body { color: red }"));
        assert!(!looks_like_css("just some text"));
    }
}
