use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use strum::{AsRefStr, EnumString};

/// Converts minor units (satang) to a two-decimal baht amount.
pub fn minor_to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

fn serialize_minor<S: Serializer>(minor: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    Serialize::serialize(&minor_to_decimal(*minor), serializer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FundingMethod {
    /// Dynamic PromptPay QR, confirmed by the payment webhook.
    Qr,
    /// Bank-transfer slip, reviewed by an administrator.
    Slip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FundingStatus {
    Pending,
    Completed,
    Approved,
    Rejected,
    Expired,
    Failed,
}

impl FundingStatus {
    pub fn is_terminal(self) -> bool {
        self != FundingStatus::Pending
    }

    /// Terminal states that put the intent's points on the account.
    pub fn credits_account(self) -> bool {
        matches!(self, FundingStatus::Completed | FundingStatus::Approved)
    }

    /// Allowed transitions:
    /// qr: pending -> completed | expired | failed
    /// slip: pending -> approved | rejected
    pub fn can_transition(self, to: FundingStatus, method: FundingMethod) -> bool {
        use FundingStatus::*;
        match (self, method) {
            (Pending, FundingMethod::Qr) => matches!(to, Completed | Expired | Failed),
            (Pending, FundingMethod::Slip) => matches!(to, Approved | Rejected),
            _ => false,
        }
    }
}

/// A user's request to add funds, carried from creation to a single terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingIntent {
    pub id: String,
    pub user_id: String,
    pub method: FundingMethod,
    pub status: FundingStatus,
    /// Amount the payer must send, in satang (salted for QR intents).
    #[serde(serialize_with = "serialize_minor")]
    pub amount: i64,
    /// Amount the user asked for, in satang.
    #[serde(serialize_with = "serialize_minor")]
    pub requested_amount: i64,
    pub points_to_credit: i64,
    pub reference: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub approver_id: Option<String>,
    pub review_note: Option<String>,
    pub evidence_url: Option<String>,
}

impl FundingIntent {
    pub fn amount_decimal(&self) -> Decimal {
        minor_to_decimal(self.amount)
    }

    /// True for a pending intent whose payment window has closed.
    pub fn is_past_deadline(&self, now: i64) -> bool {
        self.status == FundingStatus::Pending && self.expires_at.is_some_and(|exp| now > exp)
    }
}

pub struct CreateFundingIntent<'a> {
    pub user_id: &'a str,
    pub method: FundingMethod,
    pub amount: i64,
    pub requested_amount: i64,
    pub points_to_credit: i64,
    pub reference: &'a str,
    pub expires_at: Option<i64>,
    pub evidence_url: Option<&'a str>,
}

/// Administrator verdict on a slip intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(self) -> FundingStatus {
        match self {
            ReviewDecision::Approve => FundingStatus::Approved,
            ReviewDecision::Reject => FundingStatus::Rejected,
        }
    }
}
