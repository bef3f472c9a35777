use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub script_id: String,
    pub name: String,
    pub resource_name: String,
    pub price: i64,
    pub added_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItem {
    pub script_id: String,
}
