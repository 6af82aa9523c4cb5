//! Case field metadata: labels, storage location, and display grouping.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::cases::record::{LOCKED_FIELDS_KEY, PENDING_SUGGESTIONS_KEY};
use crate::error::RegistryError;

/// Where a field's value lives on the case record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStorage {
    /// Top-level column on the case.
    Dedicated,
    /// Key inside `case_details`.
    Details,
}

/// Section a field is shown under during review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayGroup {
    CaseInformation,
    Court,
    Parties,
    Counsel,
    Dates,
    Other,
}

impl DisplayGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseInformation => "case_information",
            Self::Court => "court",
            Self::Parties => "parties",
            Self::Counsel => "counsel",
            Self::Dates => "dates",
            Self::Other => "other",
        }
    }

    pub fn from_config_value(value: &str) -> Option<Self> {
        match value {
            "case_information" => Some(Self::CaseInformation),
            "court" => Some(Self::Court),
            "parties" => Some(Self::Parties),
            "counsel" => Some(Self::Counsel),
            "dates" => Some(Self::Dates),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::CaseInformation => "Case Information",
            Self::Court => "Court",
            Self::Parties => "Parties",
            Self::Counsel => "Counsel",
            Self::Dates => "Dates",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub storage: FieldStorage,
    pub editable: bool,
    pub group: DisplayGroup,
}

impl FieldSpec {
    pub fn is_dedicated(&self) -> bool {
        self.storage == FieldStorage::Dedicated
    }
}

#[derive(Debug, Deserialize)]
struct RegistryTable {
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawStorage {
    Dedicated,
    Details,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    label: String,
    storage: RawStorage,
    group: String,
    #[serde(default = "default_editable")]
    editable: bool,
}

fn default_editable() -> bool {
    true
}

/// Lookup table from field name to [`FieldSpec`], in declaration order.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

static BUNDLED: LazyLock<Result<FieldRegistry, RegistryError>> =
    LazyLock::new(|| FieldRegistry::from_toml_str(include_str!("field_registry.toml")));

impl FieldRegistry {
    /// The registry shipped with the crate.
    pub fn bundled() -> Result<&'static FieldRegistry, RegistryError> {
        match &*BUNDLED {
            Ok(registry) => Ok(registry),
            Err(err) => Err(err.clone()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RegistryError> {
        let table: RegistryTable =
            toml::from_str(raw).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let mut fields = Vec::with_capacity(table.fields.len());
        for raw in table.fields {
            let group = DisplayGroup::from_config_value(&raw.group).ok_or_else(|| {
                RegistryError::UnknownGroup {
                    field: raw.name.clone(),
                    group: raw.group.clone(),
                }
            })?;
            fields.push(FieldSpec {
                name: raw.name,
                label: raw.label,
                storage: match raw.storage {
                    RawStorage::Dedicated => FieldStorage::Dedicated,
                    RawStorage::Details => FieldStorage::Details,
                },
                editable: raw.editable,
                group,
            });
        }
        Self::new(fields)
    }

    /// Build a registry, enforcing one storage location per field name.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(fields.len());
        for (pos, spec) in fields.iter().enumerate() {
            if spec.name == PENDING_SUGGESTIONS_KEY || spec.name == LOCKED_FIELDS_KEY {
                return Err(RegistryError::Reserved(spec.name.clone()));
            }
            if index.insert(spec.name.clone(), pos).is_some() {
                return Err(RegistryError::Duplicate(spec.name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.index.get(field).map(|&pos| &self.fields[pos])
    }

    /// Unknown fields are never displayed.
    pub fn is_displayable(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// Declaration order, used to sort review output.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
