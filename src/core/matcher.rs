//! Configuration applicability matching and external/internal id
//! translation.
//!
//! The translation catalog is built at most once per run from the server's
//! full configuration list and lives for the process; nothing invalidates
//! it short of a restart.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::errors::RunError;
use crate::remote::api::{ConfigurationId, ServerFacade};

struct Catalog {
    external_to_internal: BTreeMap<String, ConfigurationId>,
    /// Keyed by both internal and external project id.
    by_project: BTreeMap<String, BTreeSet<ConfigurationId>>,
}

pub struct ConfigurationMatcher<'a, S: ServerFacade + ?Sized> {
    server: &'a S,
    catalog: RefCell<Option<Catalog>>,
}

impl<'a, S: ServerFacade + ?Sized> ConfigurationMatcher<'a, S> {
    pub fn new(server: &'a S) -> Self {
        Self {
            server,
            catalog: RefCell::new(None),
        }
    }

    /// Resolves the CLI-requested filter into internal configuration ids.
    /// A project filter expands to all of the project's configurations;
    /// configuration filters accept internal (`bt<digits>`) and external
    /// ids. A filter that resolves to nothing is an error, not an implicit
    /// run-everything.
    pub fn requested(
        &self,
        configurations: &[String],
        project: Option<&str>,
    ) -> Result<BTreeSet<ConfigurationId>, RunError> {
        if let Some(project) = project {
            let ids = self.with_catalog(|catalog| {
                catalog.by_project.get(project).cloned().unwrap_or_default()
            })?;
            if ids.is_empty() {
                return Err(RunError::NoApplicableConfigurations {
                    requested: vec![project.to_owned()],
                });
            }
            return Ok(ids);
        }

        let wanted: Vec<&str> = configurations
            .iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut resolved = BTreeSet::new();
        for id in &wanted {
            if ConfigurationId::looks_internal(id) {
                resolved.insert(ConfigurationId((*id).to_owned()));
                continue;
            }
            let translated =
                self.with_catalog(|catalog| catalog.external_to_internal.get(*id).cloned())?;
            match translated {
                Some(internal) => {
                    resolved.insert(internal);
                }
                None => debug!(id, "requested configuration id not known to the server"),
            }
        }

        if resolved.is_empty() {
            return Err(RunError::NoApplicableConfigurations {
                requested: wanted.iter().map(|s| (*s).to_owned()).collect(),
            });
        }
        Ok(resolved)
    }

    /// The applicability decision:
    /// - non-empty `requested` without a forced check is trusted verbatim;
    /// - a forced check intersects `requested` with the server-reported
    ///   applicable set for the touched paths;
    /// - an empty `requested` means "every applicable configuration".
    pub fn applicable(
        &self,
        requested: &BTreeSet<ConfigurationId>,
        touched_paths: &BTreeSet<String>,
        force_compatibility_check: bool,
    ) -> Result<BTreeSet<ConfigurationId>, RunError> {
        let selected = if requested.is_empty() {
            let applicable = self.server.applicable_configurations(touched_paths)?;
            debug!(count = applicable.len(), "using all applicable configurations");
            applicable
        } else if force_compatibility_check {
            let applicable = self.server.applicable_configurations(touched_paths)?;
            let intersection: BTreeSet<_> =
                requested.intersection(&applicable).cloned().collect();
            debug!(
                requested = requested.len(),
                applicable = applicable.len(),
                kept = intersection.len(),
                "intersected requested with applicable configurations"
            );
            intersection
        } else {
            requested.clone()
        };

        if selected.is_empty() {
            return Err(RunError::NoApplicableConfigurations {
                requested: requested.iter().map(|id| id.0.clone()).collect(),
            });
        }
        Ok(selected)
    }

    fn with_catalog<T>(&self, read: impl FnOnce(&Catalog) -> T) -> Result<T, RunError> {
        let mut slot = self.catalog.borrow_mut();
        match &*slot {
            Some(catalog) => Ok(read(catalog)),
            None => {
                let catalog = self.build_catalog()?;
                let value = read(&catalog);
                *slot = Some(catalog);
                Ok(value)
            }
        }
    }

    fn build_catalog(&self) -> Result<Catalog, RunError> {
        let listed = self.server.list_configurations()?;
        debug!(count = listed.len(), "built configuration id catalog");
        let mut external_to_internal = BTreeMap::new();
        let mut by_project: BTreeMap<String, BTreeSet<ConfigurationId>> = BTreeMap::new();
        for cfg in listed {
            external_to_internal.insert(cfg.external_id.clone(), cfg.internal_id.clone());
            by_project
                .entry(cfg.project_id.clone())
                .or_default()
                .insert(cfg.internal_id.clone());
            by_project
                .entry(cfg.project_external_id.clone())
                .or_default()
                .insert(cfg.internal_id);
        }
        Ok(Catalog {
            external_to_internal,
            by_project,
        })
    }
}
