pub mod funding;
pub mod promptpay;
pub mod reconcile;
mod signature;

pub use signature::verify_webhook_signature;

use base64::{Engine, engine::general_purpose::STANDARD};
use qrcode::{QrCode, render::svg};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Knobs for funding-intent creation and webhook reconciliation.
#[derive(Clone)]
pub struct PaymentSettings {
    /// Receiving PromptPay account: phone number, tax id or e-wallet id.
    pub promptpay_id: String,
    pub intent_ttl_secs: i64,
    /// Add 1-99 satang to QR amounts so concurrent payments can be told apart.
    pub salt_enabled: bool,
    /// Upper bound for a single funding intent, in satang.
    pub max_amount_minor: i64,
    /// Shared secret for `X-Signature` on the payment webhook. Unsigned calls
    /// are accepted when unset.
    pub webhook_secret: Option<String>,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            promptpay_id: config.promptpay_id.clone(),
            intent_ttl_secs: config.payment_ttl_minutes * 60,
            salt_enabled: config.amount_salt_enabled,
            max_amount_minor: config.max_funding_amount * 100,
            webhook_secret: config.payment_webhook_secret.clone(),
        }
    }
}

/// Convert a baht amount to satang, rejecting sub-satang precision.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    if amount.normalize().scale() > 2 {
        return Err(AppError::InvalidAmount(
            "Amount must have at most 2 decimal places".into(),
        ));
    }
    (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| AppError::InvalidAmount("Amount is out of range".into()))
}

/// Turns a payment payload into an image the payer can scan.
pub trait QrRenderer: Send + Sync {
    /// Returns the image as a `data:` URL.
    fn render(&self, payload: &str) -> Result<String>;
}

pub struct SvgQrRenderer {
    pub min_size: u32,
}

impl Default for SvgQrRenderer {
    fn default() -> Self {
        Self { min_size: 300 }
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render(&self, payload: &str) -> Result<String> {
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| AppError::Internal(format!("QR encoding failed: {}", e)))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
    }
}
