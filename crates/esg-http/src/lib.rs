mod locator;
mod normalize;
mod provider;
mod session;

pub use locator::{CompiledLocator, Locator, Page};
pub use normalize::clean_company_name;
pub use provider::{FieldSpec, ProviderConfig, ProviderDriver, QuerySource};
pub use session::HttpSession;

pub use anyhow;
