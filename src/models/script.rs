use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: String,
    pub name: String,
    /// Game-server resource identifier the license is verified against.
    pub resource_name: String,
    /// Price in points.
    pub price: i64,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScript {
    pub name: String,
    pub resource_name: String,
    pub price: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateScript {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name is required".into()));
        }
        if self.resource_name.trim().is_empty() {
            return Err(AppError::BadRequest("Resource name is required".into()));
        }
        if self.price < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScript {
    pub name: Option<String>,
    pub resource_name: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
}

impl UpdateScript {
    pub fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::BadRequest("Name cannot be empty".into()));
        }
        if self
            .resource_name
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(AppError::BadRequest("Resource name cannot be empty".into()));
        }
        if self.price.is_some_and(|p| p < 0) {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        Ok(())
    }
}
