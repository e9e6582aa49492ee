//! Service registry.
//!
//! Services are discovered from an explicit list of factories registered at
//! startup. Each factory builds one fresh instance per run; a factory that
//! fails is logged and skipped so one broken service never hides the rest.

use super::service::PortableService;
use crate::Result;
use crate::config::PorterConfig;
use crate::services::DirectoryService;
use std::fmt;
use tracing::{debug, warn};

/// Builds one service instance.
pub type ServiceFactory = Box<dyn Fn() -> Result<Box<dyn PortableService>> + Send + Sync>;

/// Explicit catalog of service factories.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: Vec<(String, ServiceFactory)>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry of directory-backed services declared in `config`.
    #[must_use]
    pub fn from_config(config: &PorterConfig) -> Self {
        let site_dir = config.site_dir();
        config
            .services
            .iter()
            .cloned()
            .fold(Self::new(), |registry, spec| {
                let site_dir = site_dir.clone();
                let name = spec.category.clone();
                registry.with_factory(name, move || {
                    DirectoryService::new(&spec, &site_dir)
                        .map(|service| Box::new(service) as Box<dyn PortableService>)
                })
            })
    }

    /// Registers a named factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn PortableService>> + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn PortableService>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Names of the registered factories in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiates every registered service, lazily.
    ///
    /// Construction failures are logged and the failing entry is skipped.
    /// Yields in registration order, though callers must not rely on it.
    pub fn discover(&self) -> impl Iterator<Item = Box<dyn PortableService>> + '_ {
        self.factories
            .iter()
            .filter_map(|(name, factory)| match factory() {
                Ok(service) => {
                    debug!(service = %name, category = %service.category(), "Discovered service");
                    metrics::counter!("porter_services_discovered_total").increment(1);
                    Some(service)
                },
                Err(e) => {
                    warn!(service = %name, error = %e, "Skipping service that failed to construct");
                    metrics::counter!("porter_service_discovery_failures_total").increment(1);
                    None
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryName, ExportRequest, Job};
    use crate::portability::ServiceContext;
    use crate::{Error, ServiceSpec};

    struct Fixed(&'static str);

    impl PortableService for Fixed {
        fn category(&self) -> CategoryName {
            CategoryName::new(self.0)
        }

        fn export_data(&mut self, _: &mut ServiceContext<'_>, _: &Job, _: &ExportRequest) -> Result<()> {
            Ok(())
        }

        fn import_data(&mut self, _: &mut ServiceContext<'_>, _: &Job, _: &ExportRequest) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_discovery_skips_broken_factories() {
        let registry = ServiceRegistry::new()
            .with_factory("a", || Ok(Box::new(Fixed("a")) as Box<dyn PortableService>))
            .with_factory("broken", || Err(Error::InvalidInput("missing dependency".into())))
            .with_factory("b", || Ok(Box::new(Fixed("b")) as Box<dyn PortableService>));

        let categories: Vec<String> = registry
            .discover()
            .map(|s| s.category().to_string())
            .collect();
        assert_eq!(categories, vec!["a", "b"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_from_config_uses_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PorterConfig::default().with_data_dir(dir.path());
        config.services = vec![
            ServiceSpec::root("pages", 0),
            ServiceSpec::root("  ", 1),
            ServiceSpec::child("page-versions", "pages", 0),
        ];

        let registry = ServiceRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["pages", "  ", "page-versions"]);

        let discovered: Vec<_> = registry.discover().collect();
        assert_eq!(discovered.len(), 2);
        assert_eq!(discovered[1].parent(), Some(CategoryName::new("pages")));
    }
}
