use std::time::Duration;

use anyhow::{bail, Context};
use esg_scheduler::{CompanyRecord, Identity, ResultFields, ScrapeError, SiteDriver};
use serde::{Deserialize, Serialize};

use crate::locator::{CompiledLocator, Locator, Page};
use crate::normalize::clean_company_name;
use crate::session::HttpSession;

const QUERY_PLACEHOLDER: &str = "{query}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,

    /// Search page URL, `{query}` is replaced by the url-encoded company query
    pub search_url: String,

    #[serde(default)]
    pub query: QuerySource,

    /// Normalize company names before searching
    #[serde(default)]
    pub clean_query: bool,

    pub fields: Vec<FieldSpec>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Which part of a company is typed into the provider's search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuerySource {
    Key,
    #[default]
    Name,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub locator: Locator,

    /// Read this attribute instead of the element text
    #[serde(default)]
    pub attr: Option<String>,

    /// Left out of the record instead of failing the company when absent
    #[serde(default)]
    pub optional: bool,
}

struct Field {
    spec: FieldSpec,
    locator: CompiledLocator,
}

/// Scrapes one search page per company and extracts the configured fields.
pub struct ProviderDriver {
    name: String,
    search_url: String,
    query: QuerySource,
    clean_query: bool,
    timeout: Duration,
    fields: Vec<Field>,
}

impl ProviderDriver {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        if !config.search_url.contains(QUERY_PLACEHOLDER) {
            bail!(
                "Provider {}: searchUrl {} has no {QUERY_PLACEHOLDER} placeholder",
                config.name,
                config.search_url
            );
        }
        if config.fields.is_empty() {
            bail!("Provider {}: no fields configured", config.name);
        }

        let fields = config
            .fields
            .into_iter()
            .map(|spec| {
                let locator = spec
                    .locator
                    .compile()
                    .with_context(|| format!("Provider {}: field {}", config.name, spec.name))?;
                Ok(Field { spec, locator })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name,
            search_url: config.search_url,
            query: config.query,
            clean_query: config.clean_query,
            timeout: Duration::from_secs(config.timeout_secs),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn search_url(&self, company: &CompanyRecord) -> String {
        let query = match self.query {
            QuerySource::Key => company.key(),
            QuerySource::Name => company.name(),
        };
        let query = if self.clean_query {
            clean_company_name(query)
        } else {
            query.to_string()
        };
        self.search_url
            .replace(QUERY_PLACEHOLDER, &urlencoding::encode(&query))
    }

    /// Extracts every configured field from an already fetched page.
    pub fn extract(&self, page: &Page) -> Result<ResultFields, ScrapeError> {
        let mut fields = ResultFields::new();
        for field in &self.fields {
            match field.locator.extract(page, field.spec.attr.as_deref()) {
                Ok(value) => fields.push(&field.spec.name, value),
                Err(ScrapeError::ElementNotFound(what)) if field.spec.optional => {
                    log::debug!("{}: optional field {} absent ({what})", self.name, field.spec.name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(fields)
    }
}

impl SiteDriver for ProviderDriver {
    type Session = HttpSession;

    fn open_session(&self, identity: &Identity) -> anyhow::Result<HttpSession> {
        HttpSession::open(identity, self.timeout)
    }

    fn scrape(
        &self,
        company: &CompanyRecord,
        session: &mut HttpSession,
    ) -> anyhow::Result<ResultFields> {
        let url = self.search_url(company);
        log::debug!("{}: fetching {url} as {}", self.name, session.identity());
        let source = session.fetch(&url)?;
        let page = Page::parse(&source);
        Ok(self.extract(&page)?)
    }
}
