use std::cell::RefCell;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;

use anyhow::anyhow;
use esg_scheduler::ScrapeError;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use sxd_document::parser;
use sxd_xpath::{Context, Factory, Value, XPath};

lazy_static! {
    static ref XP_FACTORY: Factory = Factory::new();
}

thread_local! {
    // Compiled once per worker thread, XPath is not Sync
    static XPATHS: RefCell<HashMap<String, XPath>> = RefCell::new(HashMap::new());
}

fn build_xpath(xpath: &str) -> anyhow::Result<XPath> {
    XP_FACTORY
        .build(xpath)
        .map_err(|e| anyhow!("Invalid xpath {xpath}: {e}"))?
        .ok_or_else(|| anyhow!("Empty xpath {xpath}"))
}

/// How to find one element on a provider page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Locator {
    /// XPath expression, only usable on well-formed (X)HTML pages
    ByPath(String),
    ByClass(String),
    ById(String),
    ByCssSelector(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByPath(xpath) => write!(f, "xpath {xpath}"),
            Self::ByClass(class) => write!(f, "class {class}"),
            Self::ById(id) => write!(f, "id {id}"),
            Self::ByCssSelector(css) => write!(f, "selector {css}"),
        }
    }
}

impl Locator {
    /// Compiles the locator, so that scraping only fails on page content.
    pub fn compile(&self) -> anyhow::Result<CompiledLocator> {
        let query = match self {
            Self::ByPath(xpath) => {
                build_xpath(xpath)?;
                Query::XPath(xpath.clone())
            }
            Self::ByClass(class) => Query::Css(parse_selector(self, &format!(".{class}"))?),
            Self::ById(id) => Query::Css(parse_selector(self, &format!("#{id}"))?),
            Self::ByCssSelector(css) => Query::Css(parse_selector(self, css)?),
        };
        Ok(CompiledLocator {
            locator: self.clone(),
            query,
        })
    }
}

fn parse_selector(locator: &Locator, css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid {locator}: {e}"))
}

enum Query {
    Css(Selector),
    XPath(String),
}

pub struct CompiledLocator {
    locator: Locator,
    query: Query,
}

impl CompiledLocator {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Text content of the first matching element, or the value of its `attr`
    /// attribute. `attr` is ignored for XPath, which can select attributes itself.
    pub fn extract(&self, page: &Page, attr: Option<&str>) -> Result<String, ScrapeError> {
        let selector = match &self.query {
            Query::Css(selector) => selector,
            Query::XPath(xpath) => return self.evaluate_xpath(xpath, page),
        };

        let elem = page
            .html
            .select(selector)
            .next()
            .ok_or_else(|| ScrapeError::ElementNotFound(self.locator.to_string()))?;
        match attr {
            Some(attr) => elem.value().attr(attr).map(str::to_string).ok_or_else(|| {
                ScrapeError::ElementNotFound(format!("{} @{attr}", self.locator))
            }),
            None => Ok(collapse_whitespace(&elem.text().collect::<String>())),
        }
    }

    fn evaluate_xpath(&self, xpath: &str, page: &Page) -> Result<String, ScrapeError> {
        let package = parser::parse(page.source).map_err(|e| ScrapeError::Parse(e.to_string()))?;
        let document = package.as_document();

        let value = XPATHS.with(|cache| {
            let mut cache = cache.borrow_mut();
            let compiled = match cache.entry(xpath.to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    e.insert(build_xpath(xpath).map_err(|e| ScrapeError::Parse(e.to_string()))?)
                }
            };
            compiled
                .evaluate(&Context::new(), document.root())
                .map_err(|e| ScrapeError::Parse(e.to_string()))
        })?;

        match value {
            Value::Nodeset(nodes) => nodes
                .document_order_first()
                .map(|node| collapse_whitespace(&node.string_value()))
                .ok_or_else(|| ScrapeError::ElementNotFound(self.locator.to_string())),
            other => Ok(other.string()),
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A fetched provider page
pub struct Page<'a> {
    source: &'a str,
    html: Html,
}

impl<'a> Page<'a> {
    pub fn parse(source: &'a str) -> Self {
        Self {
            source,
            html: Html::parse_document(source),
        }
    }
}
