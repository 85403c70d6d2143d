use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("empty selector")]
    Empty,
    #[error("unterminated attribute condition in {0:?}")]
    Unterminated(String),
    #[error("invalid attribute condition {0:?}")]
    InvalidCondition(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrCondition {
    /// `[name]`
    Present(String),
    /// `[name=value]`
    Equals(String, String),
    /// `[name*=value]`
    Contains(String, String),
}

impl AttrCondition {
    pub fn matches(&self, attr: impl Fn(&str) -> Option<String>) -> bool {
        match self {
            AttrCondition::Present(name) => attr(name).is_some(),
            AttrCondition::Equals(name, value) => attr(name).map_or(false, |v| v == *value),
            AttrCondition::Contains(name, value) => {
                attr(name).map_or(false, |v| v.contains(value.as_str()))
            }
        }
    }
}

/// A small subset of CSS selectors: a tag name (or `*`) followed by
/// attribute conditions, e.g. `link[rel*=icon][href]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMatcher {
    tag: Option<String>,
    conditions: Vec<AttrCondition>,
}

impl NodeMatcher {
    /// Matcher for `tag` (any element when `None`) with no conditions yet.
    pub fn new(tag: Option<&str>) -> Self {
        Self {
            tag: tag.map(str::to_ascii_lowercase),
            conditions: Vec::new(),
        }
    }

    pub fn present(mut self, name: &str) -> Self {
        self.conditions
            .push(AttrCondition::Present(name.to_ascii_lowercase()));
        self
    }

    pub fn equals(mut self, name: &str, value: &str) -> Self {
        self.conditions
            .push(AttrCondition::Equals(name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn contains(mut self, name: &str, value: &str) -> Self {
        self.conditions
            .push(AttrCondition::Contains(name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn conditions(&self) -> &[AttrCondition] {
        &self.conditions
    }

    /// Checks an element given its local name and an attribute lookup.
    pub fn matches(&self, name: &str, attr: impl Fn(&str) -> Option<String>) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        self.conditions.iter().all(|condition| condition.matches(&attr))
    }
}

impl FromStr for NodeMatcher {
    type Err = RuleError;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(RuleError::Empty);
        }

        let (tag, mut rest) = match selector.find('[') {
            Some(i) => (&selector[..i], &selector[i..]),
            None => (selector, ""),
        };
        let tag = match tag {
            "" | "*" => None,
            tag => Some(tag.to_ascii_lowercase()),
        };

        let mut conditions = Vec::new();
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(RuleError::InvalidCondition(rest.to_string()));
            }
            let body_end = rest
                .find(']')
                .ok_or_else(|| RuleError::Unterminated(selector.to_string()))?;
            conditions.push(parse_condition(&rest[1..body_end])?);
            rest = &rest[body_end + 1..];
        }

        Ok(Self { tag, conditions })
    }
}

fn parse_condition(body: &str) -> Result<AttrCondition, RuleError> {
    let invalid = || RuleError::InvalidCondition(body.to_string());
    let unquote = |v: &str| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();

    let condition = if let Some((name, value)) = body.split_once("*=") {
        AttrCondition::Contains(name.trim().to_ascii_lowercase(), unquote(value))
    } else if let Some((name, value)) = body.split_once('=') {
        AttrCondition::Equals(name.trim().to_ascii_lowercase(), unquote(value))
    } else {
        AttrCondition::Present(body.trim().to_ascii_lowercase())
    };

    let name = match &condition {
        AttrCondition::Present(name)
        | AttrCondition::Equals(name, _)
        | AttrCondition::Contains(name, _) => name,
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(condition)
}

impl fmt::Display for NodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag.as_deref().unwrap_or("*"))?;
        for condition in &self.conditions {
            match condition {
                AttrCondition::Present(name) => write!(f, "[{}]", name)?,
                AttrCondition::Equals(name, value) => write!(f, "[{}={}]", name, value)?,
                AttrCondition::Contains(name, value) => write!(f, "[{}*={}]", name, value)?,
            }
        }
        Ok(())
    }
}

/// Hook run on a freshly materialized resource.
///
/// No built-in rule installs one; it is the place to rewrite references inside
/// fetched content (for instance `url(...)` in stylesheets).
pub trait PostProcessor: Send + Sync {
    fn process(&self, local_path: &Path) -> std::io::Result<()>;
}

/// Which nodes reference a mirrorable resource and where the reference lives.
#[derive(Clone)]
pub struct SelectorRule {
    pub matcher: NodeMatcher,
    pub attribute: String,
    pub default_extension: Option<String>,
    pub post_processor: Option<Arc<dyn PostProcessor>>,
}

impl SelectorRule {
    pub fn new(selector: &str, attribute: &str, default_extension: Option<&str>) -> Result<Self, RuleError> {
        Ok(Self::from_matcher(selector.parse()?, attribute, default_extension))
    }

    pub fn from_matcher(matcher: NodeMatcher, attribute: &str, default_extension: Option<&str>) -> Self {
        Self {
            matcher,
            attribute: attribute.to_ascii_lowercase(),
            default_extension: default_extension.map(str::to_string),
            post_processor: None,
        }
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }
}

impl fmt::Debug for SelectorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorRule")
            .field("matcher", &self.matcher.to_string())
            .field("attribute", &self.attribute)
            .field("default_extension", &self.default_extension)
            .field("post_processor", &self.post_processor.is_some())
            .finish()
    }
}

/// Built-in extraction table, in processing order.
fn default_rules() -> Vec<SelectorRule> {
    let link = || NodeMatcher::new(Some("link"));
    let img = || NodeMatcher::new(Some("img"));
    vec![
        // javascript
        SelectorRule::from_matcher(NodeMatcher::new(Some("script")).present("src"), "src", Some("js")),
        SelectorRule::from_matcher(link().present("href").equals("as", "script"), "href", Some("js")),
        // images
        SelectorRule::from_matcher(img(), "src", None),
        SelectorRule::from_matcher(NodeMatcher::new(Some("image")), "src", None),
        SelectorRule::from_matcher(img().present("data-thumb"), "data-thumb", None),
        SelectorRule::from_matcher(img().present("data-src"), "data-src", None),
        SelectorRule::from_matcher(
            NodeMatcher::new(Some("input")).present("src").equals("type", "image"),
            "src",
            None,
        ),
        // css
        SelectorRule::from_matcher(link().equals("rel", "stylesheet").present("href"), "href", Some("css")),
        // favicons
        SelectorRule::from_matcher(link().contains("rel", "icon").present("href"), "href", None),
        SelectorRule::from_matcher(link().contains("rel", "shortcut").present("href"), "href", None),
    ]
}

/// Ordered collection of rules. Order only affects processing and manifest
/// order; rules never see each other's output.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<SelectorRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn push(&mut self, rule: SelectorRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectorRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
