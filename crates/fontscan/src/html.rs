//! HTML inspection
//!
//! Pulls everything font-related out of a page in one synchronous pass:
//! `<style>` contents, stylesheet links, `style=""` attributes and font
//! service markers. The parsed DOM does not outlive [`scan_page`].

use crate::classify::{ClassifierTables, ServiceKind};
use crate::types::{FontRule, RuleKind};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Origin label for rules derived from service markers
const HTML_ORIGIN: &str = "html";

/// `rel` values that point at a host rather than a resource
const HINT_RELS: &[&str] = &["preconnect", "dns-prefetch"];

static STYLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("style").expect("Failed to parse style selector - this is a bug")
});

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("link[href]").expect("Failed to parse link selector - this is a bug")
});

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[src]").expect("Failed to parse script selector - this is a bug")
});

static STYLE_ATTR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[style]").expect("Failed to parse style attribute selector - this is a bug")
});

static BASE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("base[href]").expect("Failed to parse base selector - this is a bug")
});

/// Font-related content of one HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    /// Contents of `<style>` elements, in document order
    pub inline_styles: Vec<String>,
    /// Resolved `<link rel="stylesheet">` targets, deduplicated
    pub stylesheet_links: Vec<Url>,
    /// Values of `style=""` attributes
    pub style_attributes: Vec<String>,
    /// Rules synthesized from font service links and scripts
    pub service_rules: Vec<FontRule>,
}

/// Scan an HTML document
pub fn scan_page(html: &str, page_url: &Url, tables: &ClassifierTables) -> PageScan {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);
    let mut scan = PageScan::default();

    for element in document.select(&STYLE_SELECTOR) {
        let css: String = element.text().collect();
        if !css.trim().is_empty() {
            scan.inline_styles.push(css);
        }
    }

    let mut seen_links = HashSet::new();
    let mut seen_services = HashSet::new();
    for element in document.select(&LINK_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            debug!(href = href, "Skipping unresolvable link");
            continue;
        };
        let rel = element.value().attr("rel").unwrap_or_default();

        if has_rel(rel, "stylesheet") && seen_links.insert(url.clone()) {
            scan.stylesheet_links.push(url.clone());
        }
        if !HINT_RELS.iter().any(|hint| has_rel(rel, hint)) && seen_services.insert(url.clone()) {
            scan.service_rules.extend(service_rules(&url, tables));
        }
    }

    for element in document.select(&SCRIPT_SELECTOR) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        if let Ok(url) = base.join(src.trim()) {
            if seen_services.insert(url.clone()) {
                scan.service_rules.extend(service_rules(&url, tables));
            }
        }
    }

    for element in document.select(&STYLE_ATTR_SELECTOR) {
        if let Some(style) = element.value().attr("style") {
            if !style.trim().is_empty() {
                scan.style_attributes.push(style.to_string());
            }
        }
    }

    debug!(
        url = %page_url,
        inline = scan.inline_styles.len(),
        links = scan.stylesheet_links.len(),
        services = scan.service_rules.len(),
        "Scanned page"
    );
    scan
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE_SELECTOR)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn has_rel(rel: &str, wanted: &str) -> bool {
    rel.split_whitespace()
        .any(|token| token.eq_ignore_ascii_case(wanted))
}

/// Synthetic rules for a URL that matches a known font service
pub fn service_rules(url: &Url, tables: &ClassifierTables) -> Vec<FontRule> {
    let Some(pattern) = tables.provider_for_url(url.as_str()) else {
        return Vec::new();
    };
    let provider = pattern.provider();
    let base = |family: String| {
        FontRule::new(family, RuleKind::Service, HTML_ORIGIN)
            .source_url(url.as_str())
            .provider(provider)
    };

    match pattern.kind() {
        ServiceKind::FamilyQuery => family_query_rules(url)
            .into_iter()
            .flat_map(|(family, variants)| {
                let rule = base(family);
                if variants.is_empty() {
                    vec![rule.style("normal")]
                } else {
                    variants
                        .into_iter()
                        .map(|(weight, style)| {
                            let rule = rule.clone().style(style);
                            match weight {
                                Some(weight) => rule.weight(weight),
                                None => rule,
                            }
                        })
                        .collect()
                }
            })
            .collect(),
        ServiceKind::AdobeKit => {
            vec![base(format!("Adobe Fonts Kit ({})", adobe_kit_id(url)))]
        }
        ServiceKind::IconFont => vec![base(provider.to_string()).format("icon")],
        ServiceKind::Opaque => vec![base(format!("Web Font ({provider})"))],
    }
}

/// A requested variant: optional weight and a style
pub type Variant = (Option<String>, &'static str);

/// Families and variants named by `family=` query parameters
///
/// Handles the css2 form (`Roboto:ital,wght@0,400;1,700`), the v1 form
/// (`Roboto:400,700italic|Open+Sans`) and bare names.
pub fn family_query_rules(url: &Url) -> Vec<(String, Vec<Variant>)> {
    url.query_pairs()
        .filter(|(key, _)| key == "family")
        .flat_map(|(_, value)| {
            value
                .split('|')
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter_map(|entry| {
            let (name, variant_list) = match entry.split_once(':') {
                Some((name, list)) => (name.trim().to_string(), list.trim()),
                None => (entry.trim().to_string(), ""),
            };
            if name.is_empty() {
                return None;
            }
            let variants = if let Some((axes, tuples)) = variant_list.split_once('@') {
                css2_variants(axes, tuples)
            } else {
                v1_variants(variant_list)
            };
            Some((name, variants))
        })
        .collect()
}

fn css2_variants(axes: &str, tuples: &str) -> Vec<Variant> {
    let axes: Vec<&str> = axes.split(',').map(str::trim).collect();
    let wght = axes.iter().position(|axis| *axis == "wght");
    let ital = axes.iter().position(|axis| *axis == "ital");

    tuples
        .split(';')
        .filter(|tuple| !tuple.trim().is_empty())
        .map(|tuple| {
            let values: Vec<&str> = tuple.split(',').map(str::trim).collect();
            let weight = wght
                .and_then(|i| values.get(i))
                .map(|w| w.to_string());
            let italic = ital.and_then(|i| values.get(i)).is_some_and(|v| *v == "1");
            (weight, if italic { "italic" } else { "normal" })
        })
        .collect()
}

fn v1_variants(list: &str) -> Vec<Variant> {
    list.split(',')
        .map(str::trim)
        .filter(|variant| !variant.is_empty())
        .map(|variant| {
            let lower = variant.to_lowercase();
            let digits: String = lower.chars().take_while(char::is_ascii_digit).collect();
            let rest = &lower[digits.len()..];
            let italic = matches!(rest, "i" | "italic");
            let weight = match (digits.is_empty(), rest) {
                (false, _) => Some(digits),
                (true, "bold") => Some("700".to_string()),
                (true, "regular" | "italic" | "i") => Some("400".to_string()),
                _ => None,
            };
            (weight, if italic { "italic" } else { "normal" })
        })
        .collect()
}

fn adobe_kit_id(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.split('.').next())
        .filter(|stem| !stem.is_empty() && stem.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
