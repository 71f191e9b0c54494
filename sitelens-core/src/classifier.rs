// Technology stack classification over extracted signals

use crate::signals::Signals;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Frontend,
    Css,
    BuildTools,
    Backend,
    Cms,
    Cdn,
    Infrastructure,
    Analytics,
    Misc,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Category; 9] = [
        Category::Frontend,
        Category::Css,
        Category::BuildTools,
        Category::Backend,
        Category::Cms,
        Category::Cdn,
        Category::Infrastructure,
        Category::Analytics,
        Category::Misc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Frontend => "frontend",
            Category::Css => "css",
            Category::BuildTools => "buildTools",
            Category::Backend => "backend",
            Category::Cms => "cms",
            Category::Cdn => "cdn",
            Category::Infrastructure => "infrastructure",
            Category::Analytics => "analytics",
            Category::Misc => "misc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version of a finding. `Detected` means the pattern matched but no version
/// could be read; it serializes as the string `"detected"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Version {
    Detected,
    Known(String),
}

impl Version {
    pub const DETECTED: &'static str = "detected";

    pub fn is_detected(&self) -> bool {
        matches!(self, Version::Detected)
    }

    pub fn known(&self) -> Option<&str> {
        match self {
            Version::Detected => None,
            Version::Known(v) => Some(v),
        }
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        if value == Self::DETECTED {
            Version::Detected
        } else {
            Version::Known(value)
        }
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        match value {
            Version::Detected => Version::DETECTED.to_string(),
            Version::Known(v) => v,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Detected => f.write_str(Self::DETECTED),
            Version::Known(v) => f.write_str(v),
        }
    }
}

/// One detected technology. Serializes as `{name, version}`; the category is
/// implied by the list the finding sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub category: Category,
    pub name: String,
    pub version: Option<Version>,
}

impl Finding {
    pub fn new(category: Category, name: impl Into<String>, version: Version) -> Self {
        Self {
            category,
            name: name.into(),
            version: Some(version),
        }
    }
}

impl Serialize for Finding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Finding", 2)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("version", &self.version)?;
        state.end()
    }
}

/// Findings per category, each list deduplicated by name and in rule order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnologyFindings {
    pub frontend: Vec<Finding>,
    pub css: Vec<Finding>,
    pub build_tools: Vec<Finding>,
    pub backend: Vec<Finding>,
    pub cms: Vec<Finding>,
    pub cdn: Vec<Finding>,
    pub infrastructure: Vec<Finding>,
    pub analytics: Vec<Finding>,
    pub misc: Vec<Finding>,
}

impl TechnologyFindings {
    pub fn get(&self, category: Category) -> &[Finding] {
        match category {
            Category::Frontend => &self.frontend,
            Category::Css => &self.css,
            Category::BuildTools => &self.build_tools,
            Category::Backend => &self.backend,
            Category::Cms => &self.cms,
            Category::Cdn => &self.cdn,
            Category::Infrastructure => &self.infrastructure,
            Category::Analytics => &self.analytics,
            Category::Misc => &self.misc,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut Vec<Finding> {
        match category {
            Category::Frontend => &mut self.frontend,
            Category::Css => &mut self.css,
            Category::BuildTools => &mut self.build_tools,
            Category::Backend => &mut self.backend,
            Category::Cms => &mut self.cms,
            Category::Cdn => &mut self.cdn,
            Category::Infrastructure => &mut self.infrastructure,
            Category::Analytics => &mut self.analytics,
            Category::Misc => &mut self.misc,
        }
    }

    /// Record a hit. A repeat of a known name only upgrades a `detected`
    /// version to a concrete one.
    pub fn insert(&mut self, finding: Finding) {
        let list = self.get_mut(finding.category);
        match list.iter_mut().find(|f| f.name == finding.name) {
            Some(existing) => {
                let upgrade = matches!(existing.version, None | Some(Version::Detected))
                    && matches!(finding.version, Some(Version::Known(_)));
                if upgrade {
                    debug!(
                        tech = %existing.name,
                        version = ?finding.version,
                        "Upgrading finding version"
                    );
                    existing.version = finding.version;
                }
            }
            None => list.push(finding),
        }
    }

    pub fn find(&self, category: Category, name: &str) -> Option<&Finding> {
        self.get(category).iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        Category::ALL.into_iter().flat_map(|c| self.get(c).iter())
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.get(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a rule looks for evidence.
pub enum Evidence {
    /// Pattern anywhere in the page markup.
    Html(&'static Lazy<Regex>),
    /// Every pattern must match the page markup.
    HtmlAll(&'static [&'static Lazy<Regex>]),
    /// Pattern against one main-document header (lower-case name).
    Header(&'static str, &'static Lazy<Regex>),
    /// Main-document header is present with any value.
    HeaderPresent(&'static str),
    /// Pattern against all main-document headers as `name: value` lines.
    Headers(&'static Lazy<Regex>),
    /// Pattern against any script body or script source URL.
    Script(&'static Lazy<Regex>),
    /// Pattern against request URLs plus markup.
    Network(&'static Lazy<Regex>),
}

/// Where a rule reads a version. The first capture group is the version.
pub enum VersionSource {
    Script(&'static Lazy<Regex>),
    Style(&'static Lazy<Regex>),
    Html(&'static Lazy<Regex>),
    Header(&'static str, &'static Lazy<Regex>),
    /// Major-version guess from Bootstrap-only class names.
    BootstrapHint,
}

pub struct DetectionRule {
    pub id: &'static str,
    pub category: Category,
    pub name: &'static str,
    pub evidence: Evidence,
    /// Tried in order; no hit leaves the version as `detected`.
    pub versions: &'static [VersionSource],
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

// Frontend
static RE_REACT_ROOT: Lazy<Regex> = Lazy::new(|| re(r"data-reactroot"));
static RE_REACT_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)react[-.](\d+\.\d+\.\d+)"));
static RE_VUE_SCOPED: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bdata-v-[a-f0-9]{5,}\b"));
static RE_VUE_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)vue[-.@](\d+\.\d+\.\d+)"));
static RE_NG_VERSION: Lazy<Regex> = Lazy::new(|| re(r#"(?i)\bng-version="([\d.]+)""#));
static RE_ANGULARJS_DIRECTIVE: Lazy<Regex> = Lazy::new(|| re(r"\bng-(?:app|controller)\b"));
static RE_ANGULARJS_SCRIPT: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bangular(?:\.min)?\.js\b"));
static RE_ANGULARJS_VERSION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)angular(?:js)?[/.@ -]v?(1\.\d+\.\d+)"));
static RE_SVELTE: Lazy<Regex> = Lazy::new(|| re(r"\bdata-svelte-h\b"));
static RE_JQUERY_MARKUP: Lazy<Regex> = Lazy::new(|| re(r"\bjQuery\b|\$\("));
static RE_JQUERY_SCRIPT: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bjquery\b"));
static RE_JQUERY_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)jquery[-.@/]v?(\d+\.\d+\.\d+)"));
static RE_NEXT: Lazy<Regex> = Lazy::new(|| re(r"(?i)next/static|__NEXT_DATA__"));
static RE_NUXT: Lazy<Regex> = Lazy::new(|| re(r"(?i)nuxt\.config|__NUXT__"));

// CSS
static RE_CONTAINER: Lazy<Regex> = Lazy::new(|| re(r"\bcontainer\b"));
static RE_ROW: Lazy<Regex> = Lazy::new(|| re(r"\brow\b"));
static BOOTSTRAP_GRID: [&Lazy<Regex>; 2] = [&RE_CONTAINER, &RE_ROW];
static RE_BOOTSTRAP_VERSION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)bootstrap[/.@-]v?(\d+\.\d+\.\d+)"));
static RE_TAILWIND: Lazy<Regex> = Lazy::new(|| {
    re(r#"(?i)class\s*=\s*["'][^"']*(?:\b(?:bg|text|border)-[a-z]+-\d{2,3}\b|\b(?:sm|md|lg|xl|2xl|hover|focus):[a-z])"#)
});

// Build tools
static RE_WEBPACK: Lazy<Regex> = Lazy::new(|| re(r"__webpack_require__|webpackJsonp|webpackChunk"));
static RE_VITE: Lazy<Regex> = Lazy::new(|| re(r"__vite_|import\.meta\.env"));
static RE_PARCEL: Lazy<Regex> = Lazy::new(|| re(r"parcelRequire|parcelHotUpdate"));
static RE_ROLLUP: Lazy<Regex> = Lazy::new(|| re(r"createCommonjsModule|_commonjsHelpers"));

// Backend
static RE_APACHE: Lazy<Regex> = Lazy::new(|| re(r"(?i)apache"));
static RE_APACHE_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)apache/([\d.]+)"));
static RE_NGINX: Lazy<Regex> = Lazy::new(|| re(r"(?i)nginx"));
static RE_NGINX_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)nginx/([\d.]+)"));
static RE_IIS: Lazy<Regex> = Lazy::new(|| re(r"(?i)microsoft-iis"));
static RE_IIS_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)microsoft-iis/([\d.]+)"));
static RE_CLOUDFLARE: Lazy<Regex> = Lazy::new(|| re(r"(?i)cloudflare"));
static RE_PHP: Lazy<Regex> = Lazy::new(|| re(r"(?i)php"));
static RE_PHP_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(?i)php/([\d.]+)"));
static RE_EXPRESS: Lazy<Regex> = Lazy::new(|| re(r"(?i)express"));
static RE_LARAVEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)laravel"));
static RE_PLAIN_VERSION: Lazy<Regex> = Lazy::new(|| re(r"(\d+(?:\.\d+)+)"));

// CMS
static RE_WORDPRESS: Lazy<Regex> = Lazy::new(|| re(r"(?i)/wp-content/|/wp-includes/|/wp-json/"));
static RE_WORDPRESS_VERSION: Lazy<Regex> =
    Lazy::new(|| re(r#"(?i)<meta[^>]+content=["']WordPress (\d+(?:\.\d+)+)"#));
static RE_DRUPAL: Lazy<Regex> = Lazy::new(|| re(r"(?i)Drupal\.settings|drupalSettings"));
static RE_JOOMLA: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)/media/jui/|/components/com_|/modules/mod_|joomla"));
static RE_MAGENTO: Lazy<Regex> = Lazy::new(|| re(r"(?i)/js/mage/|Mage\.Cookies"));
static RE_SHOPIFY: Lazy<Regex> = Lazy::new(|| re(r"(?i)cdn\.shopify\.com"));

// CDN
static RE_CLOUDFRONT: Lazy<Regex> = Lazy::new(|| re(r"(?i)cloudfront"));
static RE_FASTLY: Lazy<Regex> = Lazy::new(|| re(r"(?i)fastly"));
static RE_AKAMAI: Lazy<Regex> = Lazy::new(|| re(r"(?i)akamai"));

// Infrastructure
static RE_AWS: Lazy<Regex> = Lazy::new(|| re(r"(?i)amazonaws\.com|cloudfront\.net"));
static RE_GCP: Lazy<Regex> = Lazy::new(|| re(r"(?i)googleapis\.com|gstatic\.com"));
static RE_AZURE: Lazy<Regex> = Lazy::new(|| re(r"(?i)azureedge\.net|windows\.net"));
static RE_DIGITALOCEAN: Lazy<Regex> = Lazy::new(|| re(r"(?i)digitaloceanspaces\.com"));
static RE_NETLIFY: Lazy<Regex> = Lazy::new(|| re(r"(?i)\.netlify\.app"));
static RE_VERCEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)\.vercel\.app"));

// Analytics
static RE_GA: Lazy<Regex> = Lazy::new(|| re(r"(?i)google-analytics\.com|googletagmanager\.com"));
static RE_FB_PIXEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)facebook\.net/en_US/fbevents\.js"));
static RE_HOTJAR: Lazy<Regex> = Lazy::new(|| re(r"(?i)hotjar\.com"));
static RE_MIXPANEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)mixpanel\.com"));
static RE_AMPLITUDE: Lazy<Regex> = Lazy::new(|| re(r"(?i)amplitude\.com"));
static RE_SEGMENT: Lazy<Regex> = Lazy::new(|| re(r"(?i)cdn\.segment\.com"));

// Misc
static RE_STRIPE: Lazy<Regex> = Lazy::new(|| re(r"(?i)stripe\.com"));
static RE_PAYPAL: Lazy<Regex> = Lazy::new(|| re(r"(?i)paypal\.com"));
static RE_INTERCOM: Lazy<Regex> = Lazy::new(|| re(r"(?i)intercom\.io"));

static RE_OFFCANVAS: Lazy<Regex> = Lazy::new(|| re(r"\boffcanvas\b"));
static RE_CARD_BADGE: Lazy<Regex> = Lazy::new(|| re(r"\bcard\b|\bbadge\b"));

/// The full rule battery, evaluated top to bottom.
pub static RULES: &[DetectionRule] = &[
    // Frontend
    DetectionRule {
        id: "react-root",
        category: Category::Frontend,
        name: "React",
        evidence: Evidence::Html(&RE_REACT_ROOT),
        versions: &[VersionSource::Script(&RE_REACT_VERSION)],
    },
    DetectionRule {
        id: "vue-scoped-attr",
        category: Category::Frontend,
        name: "Vue.js",
        evidence: Evidence::Html(&RE_VUE_SCOPED),
        versions: &[VersionSource::Script(&RE_VUE_VERSION)],
    },
    DetectionRule {
        id: "angular-ng-version",
        category: Category::Frontend,
        name: "Angular",
        evidence: Evidence::Html(&RE_NG_VERSION),
        versions: &[VersionSource::Html(&RE_NG_VERSION)],
    },
    DetectionRule {
        id: "angularjs-directive",
        category: Category::Frontend,
        name: "AngularJS",
        evidence: Evidence::Html(&RE_ANGULARJS_DIRECTIVE),
        versions: &[VersionSource::Script(&RE_ANGULARJS_VERSION)],
    },
    DetectionRule {
        id: "angularjs-script",
        category: Category::Frontend,
        name: "AngularJS",
        evidence: Evidence::Script(&RE_ANGULARJS_SCRIPT),
        versions: &[VersionSource::Script(&RE_ANGULARJS_VERSION)],
    },
    DetectionRule {
        id: "svelte-hash",
        category: Category::Frontend,
        name: "Svelte",
        evidence: Evidence::Html(&RE_SVELTE),
        versions: &[],
    },
    DetectionRule {
        id: "jquery-markup",
        category: Category::Frontend,
        name: "jQuery",
        evidence: Evidence::Html(&RE_JQUERY_MARKUP),
        versions: &[VersionSource::Script(&RE_JQUERY_VERSION)],
    },
    DetectionRule {
        id: "jquery-script",
        category: Category::Frontend,
        name: "jQuery",
        evidence: Evidence::Script(&RE_JQUERY_SCRIPT),
        versions: &[VersionSource::Script(&RE_JQUERY_VERSION)],
    },
    DetectionRule {
        id: "nextjs-data",
        category: Category::Frontend,
        name: "Next.js",
        evidence: Evidence::Html(&RE_NEXT),
        versions: &[],
    },
    DetectionRule {
        id: "nuxt-state",
        category: Category::Frontend,
        name: "Nuxt.js",
        evidence: Evidence::Html(&RE_NUXT),
        versions: &[],
    },
    // CSS
    DetectionRule {
        id: "bootstrap-grid",
        category: Category::Css,
        name: "Bootstrap",
        evidence: Evidence::HtmlAll(&BOOTSTRAP_GRID),
        versions: &[VersionSource::Style(&RE_BOOTSTRAP_VERSION), VersionSource::BootstrapHint],
    },
    DetectionRule {
        id: "tailwind-utilities",
        category: Category::Css,
        name: "Tailwind CSS",
        evidence: Evidence::Html(&RE_TAILWIND),
        versions: &[],
    },
    // Build tools
    DetectionRule {
        id: "webpack-runtime",
        category: Category::BuildTools,
        name: "Webpack",
        evidence: Evidence::Script(&RE_WEBPACK),
        versions: &[],
    },
    DetectionRule {
        id: "vite-runtime",
        category: Category::BuildTools,
        name: "Vite",
        evidence: Evidence::Script(&RE_VITE),
        versions: &[],
    },
    DetectionRule {
        id: "parcel-runtime",
        category: Category::BuildTools,
        name: "Parcel",
        evidence: Evidence::Script(&RE_PARCEL),
        versions: &[],
    },
    DetectionRule {
        id: "rollup-helpers",
        category: Category::BuildTools,
        name: "Rollup",
        evidence: Evidence::Script(&RE_ROLLUP),
        versions: &[],
    },
    // Backend
    DetectionRule {
        id: "server-apache",
        category: Category::Backend,
        name: "Apache",
        evidence: Evidence::Header("server", &RE_APACHE),
        versions: &[VersionSource::Header("server", &RE_APACHE_VERSION)],
    },
    DetectionRule {
        id: "server-nginx",
        category: Category::Backend,
        name: "Nginx",
        evidence: Evidence::Header("server", &RE_NGINX),
        versions: &[VersionSource::Header("server", &RE_NGINX_VERSION)],
    },
    DetectionRule {
        id: "server-iis",
        category: Category::Backend,
        name: "IIS",
        evidence: Evidence::Header("server", &RE_IIS),
        versions: &[VersionSource::Header("server", &RE_IIS_VERSION)],
    },
    DetectionRule {
        id: "server-cloudflare",
        category: Category::Backend,
        name: "Cloudflare (edge)",
        evidence: Evidence::Header("server", &RE_CLOUDFLARE),
        versions: &[],
    },
    DetectionRule {
        id: "powered-by-php",
        category: Category::Backend,
        name: "PHP",
        evidence: Evidence::Header("x-powered-by", &RE_PHP),
        versions: &[VersionSource::Header("x-powered-by", &RE_PHP_VERSION)],
    },
    DetectionRule {
        id: "powered-by-express",
        category: Category::Backend,
        name: "Node.js (Express)",
        evidence: Evidence::Header("x-powered-by", &RE_EXPRESS),
        versions: &[],
    },
    DetectionRule {
        id: "django-version-header",
        category: Category::Backend,
        name: "Python (Django)",
        evidence: Evidence::HeaderPresent("x-django-version"),
        versions: &[VersionSource::Header("x-django-version", &RE_PLAIN_VERSION)],
    },
    DetectionRule {
        id: "rails-header",
        category: Category::Backend,
        name: "Ruby on Rails",
        evidence: Evidence::HeaderPresent("x-rails"),
        versions: &[],
    },
    DetectionRule {
        id: "powered-by-laravel",
        category: Category::Backend,
        name: "Laravel",
        evidence: Evidence::Header("x-powered-by", &RE_LARAVEL),
        versions: &[],
    },
    // CMS
    DetectionRule {
        id: "wordpress-paths",
        category: Category::Cms,
        name: "WordPress",
        evidence: Evidence::Html(&RE_WORDPRESS),
        versions: &[VersionSource::Html(&RE_WORDPRESS_VERSION)],
    },
    DetectionRule {
        id: "drupal-settings",
        category: Category::Cms,
        name: "Drupal",
        evidence: Evidence::Html(&RE_DRUPAL),
        versions: &[],
    },
    DetectionRule {
        id: "joomla-paths",
        category: Category::Cms,
        name: "Joomla",
        evidence: Evidence::Html(&RE_JOOMLA),
        versions: &[],
    },
    DetectionRule {
        id: "magento-scripts",
        category: Category::Cms,
        name: "Magento",
        evidence: Evidence::Html(&RE_MAGENTO),
        versions: &[],
    },
    DetectionRule {
        id: "shopify-cdn",
        category: Category::Cms,
        name: "Shopify",
        evidence: Evidence::Html(&RE_SHOPIFY),
        versions: &[],
    },
    // CDN
    DetectionRule {
        id: "cdn-cloudflare",
        category: Category::Cdn,
        name: "Cloudflare",
        evidence: Evidence::Headers(&RE_CLOUDFLARE),
        versions: &[],
    },
    DetectionRule {
        id: "cdn-cloudfront",
        category: Category::Cdn,
        name: "AWS CloudFront",
        evidence: Evidence::Headers(&RE_CLOUDFRONT),
        versions: &[],
    },
    DetectionRule {
        id: "cdn-fastly",
        category: Category::Cdn,
        name: "Fastly",
        evidence: Evidence::Headers(&RE_FASTLY),
        versions: &[],
    },
    DetectionRule {
        id: "cdn-akamai",
        category: Category::Cdn,
        name: "Akamai",
        evidence: Evidence::Headers(&RE_AKAMAI),
        versions: &[],
    },
    // Infrastructure
    DetectionRule {
        id: "infra-aws",
        category: Category::Infrastructure,
        name: "AWS",
        evidence: Evidence::Network(&RE_AWS),
        versions: &[],
    },
    DetectionRule {
        id: "infra-gcp",
        category: Category::Infrastructure,
        name: "Google Cloud",
        evidence: Evidence::Network(&RE_GCP),
        versions: &[],
    },
    DetectionRule {
        id: "infra-azure",
        category: Category::Infrastructure,
        name: "Azure",
        evidence: Evidence::Network(&RE_AZURE),
        versions: &[],
    },
    DetectionRule {
        id: "infra-digitalocean",
        category: Category::Infrastructure,
        name: "DigitalOcean",
        evidence: Evidence::Network(&RE_DIGITALOCEAN),
        versions: &[],
    },
    DetectionRule {
        id: "infra-netlify",
        category: Category::Infrastructure,
        name: "Netlify",
        evidence: Evidence::Network(&RE_NETLIFY),
        versions: &[],
    },
    DetectionRule {
        id: "infra-vercel",
        category: Category::Infrastructure,
        name: "Vercel",
        evidence: Evidence::Network(&RE_VERCEL),
        versions: &[],
    },
    // Analytics
    DetectionRule {
        id: "google-analytics",
        category: Category::Analytics,
        name: "Google Analytics",
        evidence: Evidence::Html(&RE_GA),
        versions: &[],
    },
    DetectionRule {
        id: "facebook-pixel",
        category: Category::Analytics,
        name: "Facebook Pixel",
        evidence: Evidence::Html(&RE_FB_PIXEL),
        versions: &[],
    },
    DetectionRule {
        id: "hotjar",
        category: Category::Analytics,
        name: "Hotjar",
        evidence: Evidence::Html(&RE_HOTJAR),
        versions: &[],
    },
    DetectionRule {
        id: "mixpanel",
        category: Category::Analytics,
        name: "Mixpanel",
        evidence: Evidence::Html(&RE_MIXPANEL),
        versions: &[],
    },
    DetectionRule {
        id: "amplitude",
        category: Category::Analytics,
        name: "Amplitude",
        evidence: Evidence::Html(&RE_AMPLITUDE),
        versions: &[],
    },
    DetectionRule {
        id: "segment",
        category: Category::Analytics,
        name: "Segment",
        evidence: Evidence::Html(&RE_SEGMENT),
        versions: &[],
    },
    // Misc
    DetectionRule {
        id: "stripe",
        category: Category::Misc,
        name: "Stripe",
        evidence: Evidence::Html(&RE_STRIPE),
        versions: &[],
    },
    DetectionRule {
        id: "paypal",
        category: Category::Misc,
        name: "PayPal",
        evidence: Evidence::Html(&RE_PAYPAL),
        versions: &[],
    },
    DetectionRule {
        id: "intercom",
        category: Category::Misc,
        name: "Intercom",
        evidence: Evidence::Html(&RE_INTERCOM),
        versions: &[],
    },
];

/// Run every rule in order against `signals`.
pub fn detect_all(signals: &Signals) -> TechnologyFindings {
    let mut findings = TechnologyFindings::default();

    debug!(total_rules = RULES.len(), "Applying detection rules");
    for rule in RULES {
        if let Some(version) = evaluate(rule, signals) {
            debug!(rule = rule.id, tech = rule.name, %version, "Rule matched");
            findings.insert(Finding::new(rule.category, rule.name, version));
        }
    }

    info!(count = findings.len(), "Technology classification complete");
    findings
}

/// `Some(version)` when the rule's evidence matched.
pub fn evaluate(rule: &DetectionRule, signals: &Signals) -> Option<Version> {
    if !evidence_matches(&rule.evidence, signals) {
        return None;
    }

    let version = rule
        .versions
        .iter()
        .find_map(|source| extract_version(source, signals))
        .map(Version::Known)
        .unwrap_or(Version::Detected);
    Some(version)
}

fn evidence_matches(evidence: &Evidence, signals: &Signals) -> bool {
    match evidence {
        Evidence::Html(re) => re.is_match(&signals.html),
        Evidence::HtmlAll(patterns) => patterns.iter().all(|re| re.is_match(&signals.html)),
        Evidence::Header(name, re) => signals.header(name).is_some_and(|v| re.is_match(v)),
        Evidence::HeaderPresent(name) => signals.has_header(name),
        Evidence::Headers(re) => re.is_match(&signals.headers_text()),
        Evidence::Script(re) => signals.js_texts().any(|text| re.is_match(text)),
        Evidence::Network(re) => re.is_match(&signals.network_text()),
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_version(source: &VersionSource, signals: &Signals) -> Option<String> {
    match source {
        VersionSource::Script(re) => signals.js_texts().find_map(|text| capture(re, text)),
        VersionSource::Style(re) => signals.css_texts().find_map(|text| capture(re, text)),
        VersionSource::Html(re) => capture(re, &signals.html),
        VersionSource::Header(name, re) => signals.header(name).and_then(|v| capture(re, v)),
        VersionSource::BootstrapHint => bootstrap_major_hint(&signals.html),
    }
}

fn bootstrap_major_hint(html: &str) -> Option<String> {
    if RE_OFFCANVAS.is_match(html) {
        Some("5.x".to_string())
    } else if RE_CARD_BADGE.is_match(html) {
        Some("4.x".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_ids_are_unique() {
        let mut seen = HashSet::new();
        for rule in RULES {
            assert!(seen.insert(rule.id), "duplicate rule id {}", rule.id);
        }
    }

    #[test]
    fn test_rules_grouped_in_category_order() {
        let order: Vec<Category> = RULES.iter().map(|r| r.category).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_all_patterns_compile() {
        for rule in RULES {
            let evidence: Vec<&Lazy<Regex>> = match &rule.evidence {
                Evidence::Html(re)
                | Evidence::Header(_, re)
                | Evidence::Headers(re)
                | Evidence::Script(re)
                | Evidence::Network(re) => vec![*re],
                Evidence::HtmlAll(patterns) => patterns.to_vec(),
                Evidence::HeaderPresent(_) => Vec::new(),
            };
            for re in evidence {
                Lazy::force(re);
            }

            for source in rule.versions {
                let re = match source {
                    VersionSource::Script(re)
                    | VersionSource::Style(re)
                    | VersionSource::Html(re)
                    | VersionSource::Header(_, re) => *re,
                    VersionSource::BootstrapHint => continue,
                };
                assert!(
                    re.captures_len() >= 2,
                    "version pattern of {} has no capture group",
                    rule.id
                );
            }
        }
        Lazy::force(&RE_OFFCANVAS);
        Lazy::force(&RE_CARD_BADGE);
    }

    #[test]
    fn test_version_serializes_as_string() {
        assert_eq!(serde_json::to_string(&Version::Detected).unwrap(), "\"detected\"");
        assert_eq!(
            serde_json::to_string(&Version::Known("3.6.0".into())).unwrap(),
            "\"3.6.0\""
        );
        let parsed: Version = serde_json::from_str("\"detected\"").unwrap();
        assert!(parsed.is_detected());
    }

    #[test]
    fn test_insert_upgrades_detected_only() {
        let mut findings = TechnologyFindings::default();
        findings.insert(Finding::new(Category::Frontend, "jQuery", Version::Detected));
        findings.insert(Finding::new(Category::Frontend, "jQuery", Version::Known("3.6.0".into())));
        findings.insert(Finding::new(Category::Frontend, "jQuery", Version::Known("1.0.0".into())));

        assert_eq!(findings.frontend.len(), 1);
        assert_eq!(findings.frontend[0].version, Some(Version::Known("3.6.0".into())));
    }
}
