//! Selection and facet wire shapes.
//!
//! A [`Selection`] scopes an analysis or facet computation. Facet jobs also
//! return their computed facets in this shape. Unknown fields sent by the
//! server are kept in `extra` so a selection round-trips untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{DimensionPk, ProjectId};

/// Item type used for free values picked by the user.
pub const VALUE_ITEM_TYPE: &str = "v";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub facets: Vec<Facet>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facet {
    pub dimension: FacetDimension,
    #[serde(default)]
    pub selected_items: Vec<FacetItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacetDimension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DimensionPk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FacetDimension {
    /// True when this facet dimension refers to `dimension`, either through
    /// its full key or through the bare object id the server sometimes sends.
    pub fn matches(&self, dimension: &DimensionPk) -> bool {
        let by_oid = self
            .oid
            .as_deref()
            .is_some_and(|oid| oid == dimension.dimension_id.as_str());
        let by_key = self
            .id
            .as_ref()
            .is_some_and(|id| id.dimension_id == dimension.dimension_id);
        by_oid || by_key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FacetItem {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            kind: VALUE_ITEM_TYPE.to_string(),
            id: Value::from(-1),
            value: Some(value.into()),
            extra: Map::new(),
        }
    }
}

impl Selection {
    pub fn from_facets(facets: Vec<Facet>) -> Self {
        Self {
            facets,
            extra: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    pub fn facet(&self, dimension: &DimensionPk) -> Option<&Facet> {
        self.facets.iter().find(|f| f.dimension.matches(dimension))
    }

    /// Adds `value` to the facet of `dimension`, creating the facet scoped to
    /// `project_id` when the dimension has no facet yet.
    pub fn select_value(
        &mut self,
        project_id: &ProjectId,
        dimension: &DimensionPk,
        value: impl Into<String>,
    ) {
        let index = match self
            .facets
            .iter()
            .rposition(|f| f.dimension.matches(dimension))
        {
            Some(index) => index,
            None => {
                self.facets.push(Facet {
                    dimension: FacetDimension {
                        id: Some(DimensionPk {
                            project_id: project_id.clone(),
                            domain_id: dimension.domain_id.clone(),
                            dimension_id: dimension.dimension_id.clone(),
                        }),
                        oid: None,
                        extra: Map::new(),
                    },
                    selected_items: Vec::new(),
                    extra: Map::new(),
                });
                self.facets.len() - 1
            }
        };
        self.facets[index]
            .selected_items
            .push(FacetItem::value(value));
    }
}
