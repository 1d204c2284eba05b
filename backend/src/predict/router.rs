use shared::Tier;
use std::collections::HashMap;
use std::fmt;

use crate::config::settings::GatewayConfig;
use crate::error::ValidationError;

/// Category key as declared in the routing table (trimmed, lowercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(String);

impl Category {
    pub fn parse(raw: &str) -> Self {
        Category(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub tier: Tier,
    /// URL path segment for the primary tier, endpoint resource path for the fallback tier.
    pub identifier: String,
}

impl BackendTarget {
    pub fn primary(path: impl Into<String>) -> Self {
        Self {
            tier: Tier::Primary,
            identifier: path.into(),
        }
    }

    pub fn fallback(resource: impl Into<String>) -> Self {
        Self {
            tier: Tier::Fallback,
            identifier: resource.into(),
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub primary: BackendTarget,
    pub fallback: Option<BackendTarget>,
}

/// Read-only category table built once at startup.
#[derive(Debug, Clone)]
pub struct VeinTypeRouter {
    table: HashMap<Category, Route>,
    default_category: Category,
}

impl VeinTypeRouter {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let table = config
            .routes
            .iter()
            .filter_map(|(name, route)| {
                let primary = route.path.as_deref().map(BackendTarget::primary);
                let fallback = route.resource.as_deref().map(BackendTarget::fallback);
                let route = match (primary, fallback) {
                    (Some(primary), fallback) => Route { primary, fallback },
                    (None, Some(managed)) => Route {
                        primary: managed,
                        fallback: None,
                    },
                    (None, None) => return None,
                };
                Some((Category::parse(name), route))
            })
            .collect();

        Self {
            table,
            default_category: Category::parse(&config.default_category),
        }
    }

    /// A missing or blank category falls back to the configured default.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(Category, &Route), ValidationError> {
        let category = match requested.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => Category::parse(raw),
            None => {
                log::debug!("No category supplied, using default '{}'", self.default_category);
                self.default_category.clone()
            }
        };

        match self.table.get(&category) {
            Some(route) => Ok((category, route)),
            None => Err(ValidationError::new(format!("unknown category: {}", category))),
        }
    }

    pub fn default_category(&self) -> &Category {
        &self.default_category
    }
}
