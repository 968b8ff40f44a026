// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only template catalog keyed by (day, variant), plus the default
//! template set shipped with the binary.

use std::collections::{BTreeMap, HashSet};

use cadence_core::{CadenceError, Store, Template, types::is_cadence_day};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_TEMPLATES: &str = include_str!("../templates/defaults.toml");

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DefaultsFile {
    day: Vec<DayVariants>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DayVariants {
    day: u32,
    variants: Vec<String>,
}

/// The built-in templates, all active, variants numbered from 1.
pub fn default_templates() -> Result<Vec<Template>, CadenceError> {
    let file: DefaultsFile = toml::from_str(DEFAULT_TEMPLATES)
        .map_err(|e| CadenceError::Config(format!("default templates are malformed: {e}")))?;
    Ok(file
        .day
        .into_iter()
        .flat_map(|day| {
            let number = day.day;
            day.variants
                .into_iter()
                .zip(1u32..)
                .map(move |(body, variant)| Template {
                    day: number,
                    variant,
                    body,
                    active: true,
                })
        })
        .collect())
}

/// Write the built-in templates to the store.
///
/// Existing (day, variant) pairs are kept unless `overwrite` is set, so
/// seeding twice is harmless and local edits survive. Returns the number of
/// templates written.
pub async fn seed_default_templates(
    store: &dyn Store,
    overwrite: bool,
) -> Result<usize, CadenceError> {
    let existing: HashSet<(u32, u32)> = store
        .list_templates()
        .await?
        .into_iter()
        .map(|t| (t.day, t.variant))
        .collect();

    let mut written = 0;
    for template in default_templates()? {
        if !overwrite && existing.contains(&(template.day, template.variant)) {
            continue;
        }
        store.upsert_template(&template).await?;
        written += 1;
    }
    info!(written, overwrite, "default templates seeded");
    Ok(written)
}

/// Snapshot of the message templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<(u32, u32), Template>,
}

impl TemplateCatalog {
    pub fn new(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut map = BTreeMap::new();
        for template in templates {
            if !is_cadence_day(template.day) {
                warn!(
                    day = template.day,
                    variant = template.variant,
                    "template for a day outside the cadence ignored"
                );
                continue;
            }
            map.insert((template.day, template.variant), template);
        }
        Self { templates: map }
    }

    /// Load every template from the store.
    pub async fn load(store: &dyn Store) -> Result<Self, CadenceError> {
        let catalog = Self::new(store.list_templates().await?);
        info!(templates = catalog.len(), "template catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The active template for (day, variant).
    pub fn get(&self, day: u32, variant: u32) -> Option<&Template> {
        self.templates
            .get(&(day, variant))
            .filter(|template| template.active)
    }

    /// Active variant numbers for `day`, ascending.
    pub fn active_variants(&self, day: u32) -> Vec<u32> {
        self.templates
            .range((day, 0)..=(day, u32::MAX))
            .filter(|(_, template)| template.active)
            .map(|(&(_, variant), _)| variant)
            .collect()
    }

    /// Pick an active variant for `day` uniformly at random.
    pub fn pick<R: Rng + ?Sized>(&self, day: u32, rng: &mut R) -> Option<&Template> {
        let variants = self.active_variants(day);
        let variant = variants.choose(rng)?;
        self.get(day, *variant)
    }

    /// The requested variant if active, else another active variant of the day.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        day: u32,
        variant: u32,
        rng: &mut R,
    ) -> Option<&Template> {
        self.get(day, variant).or_else(|| self.pick(day, rng))
    }
}
