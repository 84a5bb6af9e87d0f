//! Core types for FontScan

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Where a block of CSS text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CssOrigin {
    /// `<style>` element embedded in the page
    Inline,
    /// `<link rel="stylesheet">` target
    External,
    /// Stylesheet reached through `@import`
    Imported,
}

impl std::fmt::Display for CssOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CssOrigin::Inline => write!(f, "inline"),
            CssOrigin::External => write!(f, "external"),
            CssOrigin::Imported => write!(f, "imported"),
        }
    }
}

/// A unit of CSS text plus where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock {
    /// Raw CSS text
    pub content: String,
    /// Kind of source
    pub origin: CssOrigin,
    /// Absolute URL of the stylesheet; empty for inline blocks
    pub location: String,
}

impl CssBlock {
    /// Block taken from a `<style>` element
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: CssOrigin::Inline,
            location: String::new(),
        }
    }

    /// Block fetched from a linked stylesheet
    pub fn external(location: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: CssOrigin::External,
            location: location.into(),
        }
    }

    /// Block fetched through an `@import`
    pub fn imported(location: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: CssOrigin::Imported,
            location: location.into(),
        }
    }

    /// Short label used in diagnostics
    pub fn describe(&self) -> String {
        if self.location.is_empty() {
            self.origin.to_string()
        } else {
            format!("{} {}", self.origin, self.location)
        }
    }

    /// Origin metadata without the CSS text
    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            origin: self.origin,
            location: if self.location.is_empty() {
                None
            } else {
                Some(self.location.clone())
            },
        }
    }
}

/// Origin of an analyzed block, as reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BlockInfo {
    pub origin: CssOrigin,
    pub location: Option<String>,
}

/// How a raw font finding was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `@font-face` rule
    FontFace,
    /// `font-family` or `font` property on a selector
    Declaration,
    /// Font service marker found in the HTML (stylesheet link, kit script)
    Service,
}

/// One raw font finding, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRule {
    pub family: String,
    pub kind: RuleKind,
    /// Selector the declaration applies to; empty for `@font-face`
    pub selector: String,
    pub weight: Option<String>,
    pub style: Option<String>,
    /// First usable `src` URL (`@font-face`) or service URL
    pub source_url: Option<String>,
    pub format: Option<String>,
    pub unicode_range: Option<String>,
    /// Set on service markers, where the provider is known up front
    pub provider: Option<String>,
    /// Description of the block the rule came from
    pub origin: String,
}

impl FontRule {
    /// Create a rule with only the required fields set
    pub fn new(family: impl Into<String>, kind: RuleKind, origin: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            kind,
            selector: String::new(),
            weight: None,
            style: None,
            source_url: None,
            format: None,
            unicode_range: None,
            provider: None,
            origin: origin.into(),
        }
    }

    /// Set the selector
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    /// Set the declared weight
    pub fn weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }

    /// Set the declared style
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Set the source URL
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the file format
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the provider
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Font classification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FontType {
    /// Loaded through `@font-face` or a font service
    Web,
    /// Expected to be installed on the viewer's device
    System,
    /// Declared but neither a known service font nor a system font
    Custom,
    /// Generic family keyword such as `sans-serif`
    Generic,
}

impl FontType {
    /// Report order
    pub const ALL: [FontType; 4] = [
        FontType::Web,
        FontType::System,
        FontType::Custom,
        FontType::Generic,
    ];
}

impl FromStr for FontType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(FontType::Web),
            "system" => Ok(FontType::System),
            "custom" => Ok(FontType::Custom),
            "generic" => Ok(FontType::Generic),
            _ => Err("Invalid font type: must be web, system, custom or generic".to_string()),
        }
    }
}

impl std::fmt::Display for FontType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontType::Web => write!(f, "web"),
            FontType::System => write!(f, "system"),
            FontType::Custom => write!(f, "custom"),
            FontType::Generic => write!(f, "generic"),
        }
    }
}

/// A classified, de-duplicated font
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Font {
    /// Display name (casing of the first declaration)
    pub name: String,
    #[serde(rename = "type")]
    pub font_type: FontType,
    pub provider: Option<String>,
    pub weights: BTreeSet<String>,
    pub styles: BTreeSet<String>,
    pub format: Option<String>,
    pub source: Option<String>,
    pub unicode_range: Option<String>,
    pub selectors: BTreeSet<String>,
}

impl Font {
    /// Empty font record of the given type
    pub fn new(name: impl Into<String>, font_type: FontType) -> Self {
        Self {
            name: name.into(),
            font_type,
            provider: None,
            weights: BTreeSet::new(),
            styles: BTreeSet::new(),
            format: None,
            source: None,
            unicode_range: None,
            selectors: BTreeSet::new(),
        }
    }
}

/// Derived counts over one result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Statistics {
    pub total_fonts: usize,
    pub web_fonts: usize,
    pub system_fonts: usize,
    pub custom_fonts: usize,
    pub generic_fonts: usize,
    pub css_blocks: usize,
    pub errors: usize,
    /// Fonts per provider
    pub providers: BTreeMap<String, usize>,
}

impl Statistics {
    /// Compute statistics for a set of fonts
    pub fn compute<'a>(
        fonts: impl IntoIterator<Item = &'a Font>,
        css_blocks: usize,
        errors: usize,
    ) -> Self {
        let mut stats = Statistics {
            css_blocks,
            errors,
            ..Default::default()
        };
        for font in fonts {
            stats.total_fonts += 1;
            match font.font_type {
                FontType::Web => stats.web_fonts += 1,
                FontType::System => stats.system_fonts += 1,
                FontType::Custom => stats.custom_fonts += 1,
                FontType::Generic => stats.generic_fonts += 1,
            }
            if let Some(provider) = &font.provider {
                *stats.providers.entry(provider.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Count for one font type
    pub fn count(&self, font_type: FontType) -> usize {
        match font_type {
            FontType::Web => self.web_fonts,
            FontType::System => self.system_fonts,
            FontType::Custom => self.custom_fonts,
            FontType::Generic => self.generic_fonts,
        }
    }
}

/// Everything found for one target URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    pub url: String,
    /// Keyed by case-folded font name
    pub fonts: BTreeMap<String, Font>,
    pub css_blocks: Vec<BlockInfo>,
    /// Recoverable fetch and parse failures, in encounter order
    pub errors: Vec<String>,
    pub statistics: Statistics,
}

impl AnalysisResult {
    /// Create an empty result for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Record a recoverable error
    pub fn add_error(&mut self, error: impl ToString) {
        self.errors.push(error.to_string());
    }

    /// Fonts of one type, in name order
    pub fn fonts_of(&self, font_type: FontType) -> impl Iterator<Item = &Font> {
        self.fonts
            .values()
            .filter(move |font| font.font_type == font_type)
    }

    /// Look up a font by name, ignoring case and surrounding quotes
    pub fn font(&self, name: &str) -> Option<&Font> {
        self.fonts.get(&crate::classify::font_key(name))
    }

    /// Recompute statistics from the current fonts, blocks and errors
    pub fn update_statistics(&mut self) {
        self.statistics =
            Statistics::compute(self.fonts.values(), self.css_blocks.len(), self.errors.len());
    }
}
