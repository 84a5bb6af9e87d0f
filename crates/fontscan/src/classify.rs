//! Font classification and de-duplication
//!
//! Design: every lookup the classifier makes goes through
//! [`ClassifierTables`], which are plain data. The built-in tables cover
//! the common font services and OS fonts; tests and callers can build
//! their own.

use crate::css::normalize_family;
use crate::types::{Font, FontRule, FontType, RuleKind};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

/// Provider reported for `@font-face` fonts served from an unrecognized host
pub const SELF_HOSTED: &str = "Self-hosted";

/// How family names can be recovered from a service URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// `family=` query parameters (Google Fonts API and compatible)
    FamilyQuery,
    /// Adobe Fonts kit; only the kit id is visible
    AdobeKit,
    /// Icon font library
    IconFont,
    /// Family is not derivable from the URL
    Opaque,
}

/// Built-in provider table, checked in order
const DEFAULT_PROVIDERS: &[(&str, &str, ServiceKind)] = &[
    (
        r"(?i)fonts\.googleapis\.com|fonts\.gstatic\.com",
        "Google Fonts",
        ServiceKind::FamilyQuery,
    ),
    (
        r"(?i)use\.typekit\.(net|com)|p\.typekit\.net",
        "Adobe Fonts",
        ServiceKind::AdobeKit,
    ),
    (r"(?i)font-?awesome", "Font Awesome", ServiceKind::IconFont),
    (r"(?i)fonts\.bunny\.net", "Bunny Fonts", ServiceKind::FamilyQuery),
    (r"(?i)cdnjs\.cloudflare\.com.*font", "CDNJS", ServiceKind::Opaque),
    (
        r"(?i)fonts\.com|webtype\.com|typography\.com",
        "Commercial Web Fonts",
        ServiceKind::Opaque,
    ),
];

/// Families that are almost always loaded from a font service
const DEFAULT_SERVICE_FAMILIES: &[(&str, &str)] = &[
    ("roboto", "Google Fonts"),
    ("roboto condensed", "Google Fonts"),
    ("roboto mono", "Google Fonts"),
    ("roboto slab", "Google Fonts"),
    ("open sans", "Google Fonts"),
    ("lato", "Google Fonts"),
    ("montserrat", "Google Fonts"),
    ("oswald", "Google Fonts"),
    ("source sans pro", "Google Fonts"),
    ("source sans 3", "Google Fonts"),
    ("source code pro", "Google Fonts"),
    ("raleway", "Google Fonts"),
    ("pt sans", "Google Fonts"),
    ("pt serif", "Google Fonts"),
    ("merriweather", "Google Fonts"),
    ("poppins", "Google Fonts"),
    ("inter", "Google Fonts"),
    ("nunito", "Google Fonts"),
    ("nunito sans", "Google Fonts"),
    ("playfair display", "Google Fonts"),
    ("work sans", "Google Fonts"),
    ("fira sans", "Google Fonts"),
    ("rubik", "Google Fonts"),
    ("lora", "Google Fonts"),
    ("mukta", "Google Fonts"),
    ("quicksand", "Google Fonts"),
    ("karla", "Google Fonts"),
    ("josefin sans", "Google Fonts"),
    ("dm sans", "Google Fonts"),
    ("manrope", "Google Fonts"),
    ("ibm plex sans", "Google Fonts"),
    ("barlow", "Google Fonts"),
    ("fontawesome", "Font Awesome"),
    ("font awesome 5 free", "Font Awesome"),
    ("font awesome 5 brands", "Font Awesome"),
    ("font awesome 6 free", "Font Awesome"),
    ("font awesome 6 brands", "Font Awesome"),
];

/// Fonts assumed installed on the viewer's device
const DEFAULT_SYSTEM_FONTS: &[&str] = &[
    "arial",
    "helvetica",
    "times",
    "times new roman",
    "courier",
    "courier new",
    "verdana",
    "georgia",
    "palatino",
    "garamond",
    "bookman",
    "comic sans ms",
    "trebuchet ms",
    "arial black",
    "impact",
    "lucida sans unicode",
    "lucida grande",
    "tahoma",
    "lucida console",
    "monaco",
    "bradley hand",
    "brush script mt",
    "luminari",
    "marker felt",
    "papyrus",
    "-apple-system",
    "blinkmacsystemfont",
    "segoe ui",
    "helvetica neue",
    "arial unicode ms",
    "avenir",
    "menlo",
    "consolas",
    "dejavu sans",
    "liberation sans",
    "noto sans",
    "droid sans",
    "cantarell",
    "oxygen",
    "ubuntu",
    "franklin gothic medium",
    "century gothic",
    "calibri",
    "cambria",
    "optima",
    "gill sans",
    "futura",
    "avant garde",
    "sf pro text",
    "sf mono",
    "apple color emoji",
    "segoe ui emoji",
    "segoe ui symbol",
];

/// CSS generic family keywords
const DEFAULT_GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "ui-serif",
    "ui-sans-serif",
    "ui-monospace",
    "ui-rounded",
    "math",
    "emoji",
    "fangsong",
];

static DEFAULT_TABLES: LazyLock<ClassifierTables> = LazyLock::new(|| {
    let mut tables = ClassifierTables::empty();
    for (pattern, provider, kind) in DEFAULT_PROVIDERS {
        tables.providers.push(
            ProviderPattern::new(pattern, *provider, *kind)
                .expect("Failed to compile provider pattern - this is a bug"),
        );
    }
    for (family, provider) in DEFAULT_SERVICE_FAMILIES {
        tables = tables.with_service_family(*family, *provider);
    }
    for name in DEFAULT_SYSTEM_FONTS {
        tables = tables.with_system_font(*name);
    }
    for name in DEFAULT_GENERIC_FAMILIES {
        tables = tables.with_generic_family(*name);
    }
    tables
});

/// Case-folded de-duplication key for a font name
pub fn font_key(name: &str) -> String {
    normalize_family(name).to_lowercase()
}

/// One entry of the provider table: URL pattern and the provider it names
#[derive(Debug, Clone)]
pub struct ProviderPattern {
    pattern: Regex,
    provider: String,
    kind: ServiceKind,
}

impl ProviderPattern {
    /// Compile a provider pattern
    pub fn new(
        pattern: &str,
        provider: impl Into<String>,
        kind: ServiceKind,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            provider: provider.into(),
            kind,
        })
    }

    /// Provider name
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// How families are recovered from URLs of this provider
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Returns true if the URL belongs to this provider
    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// Lookup tables used by the classifier
#[derive(Debug, Clone)]
pub struct ClassifierTables {
    providers: Vec<ProviderPattern>,
    service_families: HashMap<String, String>,
    system_fonts: HashSet<String>,
    generic_families: HashSet<String>,
}

impl Default for ClassifierTables {
    fn default() -> Self {
        DEFAULT_TABLES.clone()
    }
}

impl ClassifierTables {
    /// Tables with no entries
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            service_families: HashMap::new(),
            system_fonts: HashSet::new(),
            generic_families: HashSet::new(),
        }
    }

    /// Append a provider pattern; earlier patterns take priority
    pub fn with_provider(mut self, pattern: ProviderPattern) -> Self {
        self.providers.push(pattern);
        self
    }

    /// Register a family name as belonging to a font service
    pub fn with_service_family(
        mut self,
        family: impl AsRef<str>,
        provider: impl Into<String>,
    ) -> Self {
        self.service_families
            .insert(font_key(family.as_ref()), provider.into());
        self
    }

    /// Register a system font name
    pub fn with_system_font(mut self, name: impl AsRef<str>) -> Self {
        self.system_fonts.insert(font_key(name.as_ref()));
        self
    }

    /// Register a generic family keyword
    pub fn with_generic_family(mut self, name: impl AsRef<str>) -> Self {
        self.generic_families.insert(font_key(name.as_ref()));
        self
    }

    /// First provider pattern matching the URL
    pub fn provider_for_url(&self, url: &str) -> Option<&ProviderPattern> {
        self.providers.iter().find(|p| p.matches(url))
    }

    /// Service that a family name is known to come from
    pub fn service_for_family(&self, key: &str) -> Option<&str> {
        self.service_families.get(key).map(String::as_str)
    }

    pub fn is_system(&self, key: &str) -> bool {
        self.system_fonts.contains(key)
    }

    pub fn is_generic(&self, key: &str) -> bool {
        self.generic_families.contains(key)
    }
}

/// Merges font rules into classified fonts
pub struct Classifier<'t> {
    tables: &'t ClassifierTables,
}

/// Accumulated evidence for one font name
struct Pending {
    font: Font,
    provider: Option<String>,
    has_font_face: bool,
}

impl<'t> Classifier<'t> {
    pub fn new(tables: &'t ClassifierTables) -> Self {
        Self { tables }
    }

    /// Merge rules by normalized name and classify each merged font
    ///
    /// Weights, styles and selectors are unioned; source, format, unicode
    /// range and provider come from the first rule that supplies them.
    /// The type is decided once per name from the merged evidence, so it
    /// does not depend on rule order.
    pub fn classify(&self, rules: impl IntoIterator<Item = FontRule>) -> BTreeMap<String, Font> {
        let mut pending: BTreeMap<String, Pending> = BTreeMap::new();

        for rule in rules {
            let name = normalize_family(&rule.family);
            if name.is_empty() {
                continue;
            }
            let entry = pending.entry(name.to_lowercase()).or_insert_with(|| Pending {
                font: Font::new(name, FontType::Custom),
                provider: None,
                has_font_face: false,
            });
            self.absorb(entry, rule);
        }

        pending
            .into_iter()
            .map(|(key, entry)| {
                let font = self.finish(&key, entry);
                (key, font)
            })
            .collect()
    }

    /// Type and provider for a font name given the merged evidence
    pub fn classify_name(
        &self,
        key: &str,
        provider: Option<&str>,
        has_font_face: bool,
    ) -> (FontType, Option<String>) {
        if self.tables.is_generic(key) {
            (FontType::Generic, None)
        } else if let Some(provider) = provider {
            (FontType::Web, Some(provider.to_string()))
        } else if has_font_face {
            (FontType::Web, Some(SELF_HOSTED.to_string()))
        } else if let Some(provider) = self.tables.service_for_family(key) {
            (FontType::Web, Some(provider.to_string()))
        } else if self.tables.is_system(key) {
            (FontType::System, None)
        } else {
            (FontType::Custom, None)
        }
    }

    fn absorb(&self, entry: &mut Pending, rule: FontRule) {
        let font = &mut entry.font;
        if let Some(weight) = rule.weight {
            font.weights.insert(weight);
        }
        if let Some(style) = rule.style {
            font.styles.insert(style);
        }
        if !rule.selector.is_empty() {
            font.selectors.insert(rule.selector);
        }

        let url_provider = rule
            .source_url
            .as_deref()
            .and_then(|url| self.tables.provider_for_url(url))
            .map(|p| p.provider().to_string());
        if entry.provider.is_none() {
            entry.provider = rule.provider.or(url_provider);
        }

        if font.source.is_none() {
            font.source = rule.source_url;
        }
        if font.format.is_none() {
            font.format = rule.format;
        }
        if font.unicode_range.is_none() {
            font.unicode_range = rule.unicode_range;
        }
        entry.has_font_face |= rule.kind == RuleKind::FontFace;
    }

    fn finish(&self, key: &str, entry: Pending) -> Font {
        let (font_type, provider) =
            self.classify_name(key, entry.provider.as_deref(), entry.has_font_face);
        Font {
            font_type,
            provider,
            ..entry.font
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(family: &str, selector: &str) -> FontRule {
        FontRule::new(family, RuleKind::Declaration, "inline").selector(selector)
    }

    #[test]
    fn test_default_provider_order() {
        let tables = ClassifierTables::default();
        let fa = tables
            .provider_for_url("https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css")
            .unwrap();
        assert_eq!(fa.provider(), "Font Awesome");
        assert_eq!(fa.kind(), ServiceKind::IconFont);

        let google = tables
            .provider_for_url("https://fonts.gstatic.com/s/roboto/v30/a.woff2")
            .unwrap();
        assert_eq!(google.provider(), "Google Fonts");

        assert!(tables.provider_for_url("https://example.com/site.css").is_none());
    }

    #[test]
    fn test_merge_unions_and_first_wins() {
        let tables = ClassifierTables::default();
        let rules = vec![
            declaration("Arial", ".body").weight("400"),
            declaration("arial", ".header").weight("700").style("italic"),
            FontRule::new("'Brand'", RuleKind::FontFace, "inline")
                .source_url("https://example.com/brand.woff2")
                .format("woff2")
                .weight("400"),
            FontRule::new("Brand", RuleKind::FontFace, "inline")
                .source_url("https://example.com/brand-bold.woff")
                .format("woff")
                .weight("700"),
        ];

        let fonts = Classifier::new(&tables).classify(rules);

        assert_eq!(fonts.len(), 2);
        let arial = &fonts["arial"];
        assert_eq!(arial.name, "Arial");
        assert_eq!(arial.font_type, FontType::System);
        assert_eq!(
            arial.weights.iter().cloned().collect::<Vec<_>>(),
            vec!["400", "700"]
        );
        assert!(arial.selectors.contains(".body") && arial.selectors.contains(".header"));
        assert!(arial.styles.contains("italic"));

        let brand = &fonts["brand"];
        assert_eq!(brand.font_type, FontType::Web);
        assert_eq!(brand.provider.as_deref(), Some(SELF_HOSTED));
        assert_eq!(brand.format.as_deref(), Some("woff2"));
        assert_eq!(brand.source.as_deref(), Some("https://example.com/brand.woff2"));
        assert!(brand.selectors.is_empty());
    }

    #[test]
    fn test_classification_priority() {
        let tables = ClassifierTables::default();
        let classifier = Classifier::new(&tables);

        assert_eq!(classifier.classify_name("sans-serif", None, false).0, FontType::Generic);
        assert_eq!(
            classifier.classify_name("roboto", None, false),
            (FontType::Web, Some("Google Fonts".to_string()))
        );
        assert_eq!(
            classifier.classify_name("arial", Some("Adobe Fonts"), false),
            (FontType::Web, Some("Adobe Fonts".to_string()))
        );
        assert_eq!(classifier.classify_name("georgia", None, false).0, FontType::System);
        assert_eq!(classifier.classify_name("acme display", None, false), (FontType::Custom, None));
    }

    #[test]
    fn test_type_independent_of_rule_order() {
        let tables = ClassifierTables::default();
        let face = FontRule::new("Lobster", RuleKind::FontFace, "inline")
            .source_url("https://fonts.gstatic.com/s/lobster.woff2");
        let decl = declaration("Lobster", "h1");

        let forward = Classifier::new(&tables).classify(vec![face.clone(), decl.clone()]);
        let backward = Classifier::new(&tables).classify(vec![decl, face]);

        assert_eq!(forward["lobster"].font_type, FontType::Web);
        assert_eq!(forward["lobster"].font_type, backward["lobster"].font_type);
        assert_eq!(forward["lobster"].provider, backward["lobster"].provider);
        assert_eq!(forward["lobster"].provider.as_deref(), Some("Google Fonts"));
    }

    #[test]
    fn test_custom_tables() {
        let tables = ClassifierTables::empty()
            .with_system_font("Brand Sans")
            .with_provider(
                ProviderPattern::new(r"cdn\.acme\.test", "Acme Fonts", ServiceKind::Opaque).unwrap(),
            );
        let rules = vec![
            declaration("Brand Sans", "body"),
            declaration("Arial", "body"),
            FontRule::new("Acme", RuleKind::FontFace, "inline").source_url("https://cdn.acme.test/a.woff2"),
        ];

        let fonts = Classifier::new(&tables).classify(rules);

        assert_eq!(fonts["brand sans"].font_type, FontType::System);
        // Not in these tables
        assert_eq!(fonts["arial"].font_type, FontType::Custom);
        assert_eq!(fonts["acme"].provider.as_deref(), Some("Acme Fonts"));
    }

    #[test]
    fn test_font_key() {
        assert_eq!(font_key("  \"Open  Sans\" "), "open sans");
        assert_eq!(font_key("Roboto"), font_key("roboto"));
    }
}
