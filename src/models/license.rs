use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Revoked,
}

/// A purchased script: the license granted to its buyer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseGrant {
    pub id: String,
    pub user_id: String,
    pub script_id: String,
    pub license_key: String,
    /// Points paid at checkout time.
    pub price_paid: i64,
    pub bound_server_address: Option<String>,
    pub status: LicenseStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseWithScript {
    #[serde(flatten)]
    pub license: LicenseGrant,
    pub script_name: String,
    pub resource_name: String,
}

/// Administrator edits to a license.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicense {
    pub status: Option<LicenseStatus>,
    /// `Some(None)` clears the binding, `None` leaves it untouched.
    #[serde(default, with = "double_option")]
    pub bound_server_address: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetServerAddress {
    pub server_address: String,
}

/// Request sent by a game server when a script starts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLicenseRequest {
    pub license_key: String,
    pub resource_name: String,
    pub server_address: String,
}
