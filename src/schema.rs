use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Canonical fields ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    ProductCategory,
    ProductType,
    ProductFormat,
    Organism,
    Morphology,
    Tissue,
    Disease,
    Applications,
    StorageConditions,
    UnpackingInstructions,
    CompleteMedium,
    Temperature,
    Atmosphere,
    HandlingProcedure,
    SubculturingProcedure,
    SubcultivationRatio,
    MediumRenewal,
    CryoReagents,
    Price,
    Images,
}

/// How a labelled section's data element is turned into a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    /// Split on any of these separators (line breaks always split).
    List(&'static [char]),
    /// `<li>` items become an ordered step map.
    Steps,
    /// `"Base:\nitem\nitem"` folds to `"Base: item, item"`.
    Medium,
    Procedure,
}

/// Source label → canonical field. Labels not listed here are dropped.
pub const FIELD_TABLE: &[(&str, Field, Shape)] = &[
    ("Product category", Field::ProductCategory, Shape::Text),
    ("Product type", Field::ProductType, Shape::List(&[','])),
    ("Product format", Field::ProductFormat, Shape::Text),
    ("Organism", Field::Organism, Shape::Text),
    ("Morphology", Field::Morphology, Shape::Text),
    ("Tissue", Field::Tissue, Shape::List(&[';'])),
    ("Disease", Field::Disease, Shape::Text),
    ("Applications", Field::Applications, Shape::List(&[','])),
    ("Storage conditions", Field::StorageConditions, Shape::Text),
    ("Unpacking and storage instructions", Field::UnpackingInstructions, Shape::Steps),
    ("Complete medium", Field::CompleteMedium, Shape::Medium),
    ("Temperature", Field::Temperature, Shape::Text),
    ("Atmosphere", Field::Atmosphere, Shape::List(&[','])),
    ("Handling procedure", Field::HandlingProcedure, Shape::Procedure),
    ("Subculturing procedure", Field::SubculturingProcedure, Shape::Procedure),
    ("Subcultivation ratio", Field::SubcultivationRatio, Shape::Text),
    ("Medium renewal", Field::MediumRenewal, Shape::Text),
    ("Reagents for cryopreservation", Field::CryoReagents, Shape::Text),
];

pub fn lookup_label(label: &str) -> Option<(Field, Shape)> {
    let label = label.trim();
    FIELD_TABLE
        .iter()
        .find(|(l, _, _)| l.eq_ignore_ascii_case(label))
        .map(|(_, f, s)| (*f, *s))
}

// ── Parser output ──

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    List(Vec<String>),
    Steps(Vec<String>),
    Procedure { description: String, steps: Vec<String> },
    Pairs(Vec<(String, String)>),
    Number(f64),
}

/// Loosely-typed fields for one entry, keyed by canonical field.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldMap {
    pub name: String,
    pub catalog_number: String,
    pub fields: BTreeMap<Field, RawValue>,
}

// ── Canonical record ──

/// Ordered instruction steps, serialized as `{"1": .., "2": .., ..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap(pub Vec<String>);

impl StepMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.0.len()).map(|n| n.to_string())
    }
}

impl Serialize for StepMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, step) in self.keys().zip(&self.0) {
            map.serialize_entry(&key, step)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StepMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepVisitor;

        impl<'de> Visitor<'de> for StepVisitor {
            type Value = StepMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of contiguous step numbers to instructions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StepMap, A::Error> {
                let mut steps: BTreeMap<usize, String> = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    let n: usize = key
                        .trim()
                        .parse()
                        .map_err(|_| de::Error::custom(format!("non-numeric step key {:?}", key)))?;
                    steps.insert(n, value);
                }
                for (expected, n) in (1..).zip(steps.keys()) {
                    if *n != expected {
                        return Err(de::Error::custom(format!(
                            "step keys not contiguous: expected {}, found {}",
                            expected, n
                        )));
                    }
                }
                Ok(StepMap(steps.into_values().collect()))
            }
        }

        deserializer.deserialize_map(StepVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Steps", default)]
    pub steps: StepMap,
}

impl Procedure {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.steps.is_empty()
    }
}

/// The persisted unit. Field order here is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "Cell Name")]
    pub name: String,
    #[serde(rename = "ATCC Number")]
    pub catalog_number: String,
    #[serde(rename = "Product category")]
    pub product_category: Option<String>,
    #[serde(rename = "Product type", default)]
    pub product_type: Vec<String>,
    #[serde(rename = "Product format")]
    pub product_format: Option<String>,
    #[serde(rename = "Organism")]
    pub organism: Option<String>,
    #[serde(rename = "Morphology")]
    pub morphology: Option<String>,
    #[serde(rename = "Tissue", default)]
    pub tissue: Vec<String>,
    #[serde(rename = "Disease")]
    pub disease: Option<String>,
    #[serde(rename = "Applications", default)]
    pub applications: Vec<String>,
    #[serde(rename = "Storage conditions")]
    pub storage_conditions: Option<String>,
    #[serde(rename = "Unpacking and storage instructions")]
    pub unpacking_instructions: Option<StepMap>,
    #[serde(rename = "Complete medium")]
    pub complete_medium: Option<String>,
    #[serde(rename = "Temperature")]
    pub temperature: Option<String>,
    #[serde(rename = "Atmosphere", default)]
    pub atmosphere: Vec<String>,
    #[serde(rename = "Handling procedure")]
    pub handling_procedure: Option<Procedure>,
    #[serde(rename = "Subculturing procedure")]
    pub subculturing_procedure: Option<Procedure>,
    #[serde(rename = "Subcultivation ratio")]
    pub subcultivation_ratio: Option<String>,
    #[serde(rename = "Medium renewal")]
    pub medium_renewal: Option<String>,
    #[serde(rename = "Reagents for cryopreservation")]
    pub cryo_reagents: Option<String>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "ATCC Link")]
    pub link: String,
    #[serde(rename = "Images")]
    pub images: Option<Vec<(String, String)>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup_is_case_insensitive() {
        assert_eq!(lookup_label(" tissue "), Some((Field::Tissue, Shape::List(&[';']))));
        assert_eq!(lookup_label("Growth properties"), None);
    }

    #[test]
    fn step_map_keys_are_strings_in_order() {
        let steps = StepMap((1..=11).map(|i| format!("step {}", i)).collect());
        let json = serde_json::to_string(&steps).unwrap();
        assert!(json.starts_with(r#"{"1":"step 1","2":"step 2""#));
        assert!(json.ends_with(r#""10":"step 10","11":"step 11"}"#));
        let keys: Vec<String> = steps.keys().collect();
        assert_eq!(keys.first().map(String::as_str), Some("1"));
        assert_eq!(keys.last().map(String::as_str), Some("11"));
    }

    #[test]
    fn step_map_rejects_gaps() {
        let err = serde_json::from_str::<StepMap>(r#"{"1":"a","3":"c"}"#).unwrap_err();
        assert!(err.to_string().contains("not contiguous"));
        let ok: StepMap = serde_json::from_str(r#"{"2":"b","1":"a"}"#).unwrap();
        assert_eq!(ok.0, vec!["a", "b"]);
    }

    #[test]
    fn missing_scalars_are_null_and_empty_lists_stay_lists() {
        let record = CellRecord {
            id: 1,
            name: "HeLa".into(),
            catalog_number: "CCL-2".into(),
            product_category: None,
            product_type: vec![],
            product_format: None,
            organism: None,
            morphology: None,
            tissue: vec![],
            disease: None,
            applications: vec![],
            storage_conditions: None,
            unpacking_instructions: Some(StepMap::default()),
            complete_medium: None,
            temperature: None,
            atmosphere: vec![],
            handling_procedure: None,
            subculturing_procedure: None,
            subcultivation_ratio: None,
            medium_renewal: None,
            cryo_reagents: None,
            price: None,
            link: "https://www.atcc.org/products/ccl-2".into(),
            images: None,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert!(v["Organism"].is_null());
        assert_eq!(v["Tissue"], serde_json::json!([]));
        assert_eq!(v["Unpacking and storage instructions"], serde_json::json!({}));
        assert!(v["Price"].is_null());
        assert!(v["Images"].is_null());

        let back: CellRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record);
    }
}
