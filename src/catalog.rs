//! Patient and condition catalog.
//!
//! The catalog is static per deployment, so it is fetched once per process
//! and shared read-only afterwards. There is no reset.

use crate::api::ApiClient;
use crate::error::{PrevisitError, Result};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Catalog {
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Patient {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub existing_condition: Option<String>,
    /// TTS voice used for this patient's answers.
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default, rename = "fhirFile")]
    pub fhir_file: Option<String>,
}

/// A selectable condition. The catalog lists these either as bare names or
/// as objects with a `name`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ConditionRepr")]
pub struct Condition {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConditionRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<ConditionRepr> for Condition {
    fn from(repr: ConditionRepr) -> Self {
        match repr {
            ConditionRepr::Name(name) => Condition {
                name,
                description: None,
            },
            ConditionRepr::Full { name, description } => Condition { name, description },
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PrevisitError::Catalog {
            message: format!("invalid catalog JSON: {e}"),
        })
    }

    /// Look a patient up by exact name, as the backend does.
    pub fn patient(&self, name: &str) -> Result<&Patient> {
        self.patients
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PrevisitError::UnknownPatient {
                name: name.to_string(),
            })
    }

    pub fn patient_names(&self) -> impl Iterator<Item = &str> {
        self.patients.iter().map(|p| p.name.as_str())
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c.name == name)
    }
}

/// Read-through, init-once cache around the catalog fetch.
#[derive(Debug, Default)]
pub struct CatalogCache {
    cell: OnceCell<Arc<Catalog>>,
}

impl CatalogCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Fetch on first use; later calls return the cached catalog.
    ///
    /// A failed fetch leaves the cache empty so the next call tries again.
    pub async fn get_or_fetch(&self, client: &ApiClient) -> Result<Arc<Catalog>> {
        self.cell
            .get_or_try_init(|| async { client.fetch_catalog().await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    pub fn get(&self) -> Option<Arc<Catalog>> {
        self.cell.get().cloned()
    }
}

static CATALOG: CatalogCache = CatalogCache::new();

/// Process-wide catalog.
pub async fn load(client: &ApiClient) -> Result<Arc<Catalog>> {
    CATALOG.get_or_fetch(client).await
}
