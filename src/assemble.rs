use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::catalog::{normalize_catalog_number, CatalogEntry};
use crate::error::SkipReason;
use crate::schema::{CellRecord, Field, Procedure, RawFieldMap, RawValue, StepMap};

/// What has already been assembled, in this run or a previous one.
/// Entries are only ever added.
#[derive(Debug, Default)]
pub struct RunLedger {
    /// catalog number → (id, record key) found on disk at startup
    resumed: HashMap<String, (u64, String)>,
    /// catalog number → record key, for everything claimed this run
    seen: HashMap<String, String>,
    keys: HashSet<String>,
    max_id: u64,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record recovered from a previous run.
    pub fn seed(&mut self, catalog_number: &str, id: u64, key: &str) {
        let catalog = normalize_catalog_number(catalog_number);
        self.resumed.insert(catalog, (id, key.to_string()));
        self.keys.insert(key.to_string());
        self.max_id = self.max_id.max(id);
    }

    pub fn resumed_len(&self) -> usize {
        self.resumed.len()
    }

    pub fn max_id(&self) -> u64 {
        self.max_id
    }
}

/// A record ready to persist under `key` (its display name, disambiguated).
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub key: String,
    pub record: CellRecord,
}

/// Owns the ledger and the ID sequence. Holding `&mut self` for every
/// assignment keeps IDs unique without locking.
pub struct Assembler {
    ledger: RunLedger,
    next_id: u64,
}

impl Assembler {
    pub fn new(ledger: RunLedger) -> Self {
        let next_id = ledger.max_id + 1;
        Assembler { ledger, next_id }
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Decide before fetching whether an entry can be skipped outright.
    /// A resumed entry is claimed the first time it is seen, so a second
    /// listing of the same catalog number is reported as a duplicate.
    pub fn precheck(&mut self, entry: &CatalogEntry) -> Option<SkipReason> {
        let catalog = normalize_catalog_number(&entry.catalog_number);
        if let Some(first_key) = self.ledger.seen.get(&catalog) {
            return Some(SkipReason::Duplicate {
                first_key: first_key.clone(),
            });
        }
        if let Some((_, key)) = self.ledger.resumed.get(&catalog) {
            self.ledger.seen.insert(catalog, key.clone());
            return Some(SkipReason::Resumed);
        }
        None
    }

    /// Build the canonical record for a normalized field map and claim its
    /// catalog number, key, and ID.
    pub fn assemble(&mut self, entry: &CatalogEntry, raw: RawFieldMap) -> Result<Assembled, SkipReason> {
        if let Some(reason) = self.precheck(entry) {
            return Err(reason);
        }
        if raw.name.is_empty() {
            return Err(SkipReason::Parse("empty product name after cleaning".to_string()));
        }
        if raw.catalog_number.is_empty() {
            return Err(SkipReason::Parse("empty catalog number after cleaning".to_string()));
        }

        let catalog = normalize_catalog_number(&entry.catalog_number);
        let key = self.unique_key(&raw.name, &raw.catalog_number);
        let id = self.next_id;

        let record = build_record(id, entry, raw);

        self.next_id += 1;
        self.ledger.max_id = id;
        self.ledger.keys.insert(key.clone());
        self.ledger.seen.insert(catalog, key.clone());
        debug!("Assembled {} as #{} ({:?})", entry.catalog_number, id, key);

        Ok(Assembled { key, record })
    }

    /// Display name, or `"Name (CATALOG)"` when another catalog number already
    /// holds that name.
    fn unique_key(&self, name: &str, catalog_number: &str) -> String {
        if !self.ledger.keys.contains(name) {
            return name.to_string();
        }
        let qualified = format!("{} ({})", name, catalog_number);
        if !self.ledger.keys.contains(&qualified) {
            return qualified;
        }
        (2..)
            .map(|n| format!("{} ({}) #{}", name, catalog_number, n))
            .find(|k| !self.ledger.keys.contains(k))
            .unwrap_or(qualified)
    }
}

// ── Field mapping ──

fn take_text(fields: &mut BTreeMap<Field, RawValue>, field: Field) -> Option<String> {
    match fields.remove(&field)? {
        RawValue::Text(t) => Some(t),
        RawValue::List(items) | RawValue::Steps(items) => Some(items.join(", ")),
        RawValue::Procedure { description, .. } => Some(description),
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Pairs(_) => None,
    }
    .filter(|t| !t.is_empty())
}

fn take_list(fields: &mut BTreeMap<Field, RawValue>, field: Field) -> Vec<String> {
    match fields.remove(&field) {
        Some(RawValue::List(items)) | Some(RawValue::Steps(items)) => items,
        Some(RawValue::Text(t)) if !t.is_empty() => vec![t],
        _ => Vec::new(),
    }
}

fn take_steps(fields: &mut BTreeMap<Field, RawValue>, field: Field) -> Option<StepMap> {
    match fields.remove(&field)? {
        RawValue::Steps(items) | RawValue::List(items) => Some(StepMap(items)),
        RawValue::Text(t) if !t.is_empty() => Some(StepMap(vec![t])),
        RawValue::Text(_) => Some(StepMap::default()),
        _ => None,
    }
}

fn take_procedure(fields: &mut BTreeMap<Field, RawValue>, field: Field) -> Option<Procedure> {
    let procedure = match fields.remove(&field)? {
        RawValue::Procedure { description, steps } => Procedure {
            description: Some(description).filter(|d| !d.is_empty()),
            steps: StepMap(steps),
        },
        RawValue::Steps(steps) => Procedure {
            description: None,
            steps: StepMap(steps),
        },
        RawValue::Text(t) => Procedure {
            description: Some(t).filter(|d| !d.is_empty()),
            steps: StepMap::default(),
        },
        _ => return None,
    };
    (!procedure.is_empty()).then_some(procedure)
}

fn take_price(fields: &mut BTreeMap<Field, RawValue>) -> Option<f64> {
    match fields.remove(&Field::Price)? {
        RawValue::Number(n) => Some(n),
        RawValue::Text(t) => crate::parser::extract::price::parse_price(&t),
        _ => None,
    }
    .filter(|n| n.is_finite() && *n >= 0.0)
}

fn take_images(fields: &mut BTreeMap<Field, RawValue>) -> Option<Vec<(String, String)>> {
    match fields.remove(&Field::Images)? {
        RawValue::Pairs(pairs) if !pairs.is_empty() => Some(pairs),
        _ => None,
    }
}

fn build_record(id: u64, entry: &CatalogEntry, raw: RawFieldMap) -> CellRecord {
    let RawFieldMap {
        name,
        catalog_number,
        mut fields,
    } = raw;
    let f = &mut fields;

    CellRecord {
        id,
        name,
        catalog_number,
        product_category: take_text(f, Field::ProductCategory),
        product_type: take_list(f, Field::ProductType),
        product_format: take_text(f, Field::ProductFormat),
        organism: take_text(f, Field::Organism),
        morphology: take_text(f, Field::Morphology),
        tissue: take_list(f, Field::Tissue),
        disease: take_text(f, Field::Disease),
        applications: take_list(f, Field::Applications),
        storage_conditions: take_text(f, Field::StorageConditions),
        unpacking_instructions: take_steps(f, Field::UnpackingInstructions),
        complete_medium: take_text(f, Field::CompleteMedium),
        temperature: take_text(f, Field::Temperature),
        atmosphere: take_list(f, Field::Atmosphere),
        handling_procedure: take_procedure(f, Field::HandlingProcedure),
        subculturing_procedure: take_procedure(f, Field::SubculturingProcedure),
        subcultivation_ratio: take_text(f, Field::SubcultivationRatio),
        medium_renewal: take_text(f, Field::MediumRenewal),
        cryo_reagents: take_text(f, Field::CryoReagents),
        price: take_price(f),
        link: entry.url.clone(),
        images: take_images(f),
    }
}
