//! EMVCo merchant-presented QR payloads for PromptPay.
//!
//! Layout (each field is `id`, two-digit length, value):
//!
//! ```text
//! 00 payload format   "01"
//! 01 initiation       "12" (dynamic, amount present)
//! 29 merchant info    00 AID + 01 phone | 02 tax id | 03 e-wallet
//! 58 country          "TH"
//! 53 currency         "764"
//! 54 amount           "100.37"
//! 63 CRC              CRC-16/CCITT-FALSE over everything up to and including "6304"
//! ```

use rust_decimal::Decimal;

use crate::error::{AppError, Result};

const TAG_PAYLOAD_FORMAT: &str = "00";
const TAG_INITIATION: &str = "01";
const TAG_MERCHANT_PROMPTPAY: &str = "29";
const TAG_COUNTRY: &str = "58";
const TAG_CURRENCY: &str = "53";
const TAG_AMOUNT: &str = "54";
const TAG_CRC: &str = "63";

const PAYLOAD_FORMAT_EMV: &str = "01";
const INITIATION_DYNAMIC: &str = "12";

const MERCHANT_TAG_AID: &str = "00";
const PROMPTPAY_AID: &str = "A000000677010111";

const COUNTRY_TH: &str = "TH";
const CURRENCY_THB: &str = "764";

const TAX_ID_LEN: usize = 13;
const EWALLET_MIN_LEN: usize = 15;

/// Kind of PromptPay account the payment is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Phone,
    TaxId,
    EWallet,
}

impl AccountKind {
    fn tag(self) -> &'static str {
        match self {
            AccountKind::Phone => "01",
            AccountKind::TaxId => "02",
            AccountKind::EWallet => "03",
        }
    }
}

/// Classify an account id by its digit count and return it in wire form.
///
/// Phone numbers lose their leading zero in favour of the 66 country code
/// and are left-padded with zeros to 13 digits.
pub fn normalize_account(account_id: &str) -> Result<(AccountKind, String)> {
    let digits: String = account_id.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(AppError::BadRequest("PromptPay id must contain digits".into()));
    }

    if digits.len() >= EWALLET_MIN_LEN {
        return Ok((AccountKind::EWallet, digits));
    }
    if digits.len() == TAX_ID_LEN {
        return Ok((AccountKind::TaxId, digits));
    }

    let international = match digits.strip_prefix('0') {
        Some(rest) => format!("66{}", rest),
        None => digits,
    };
    let padded = format!("{:0>13}", international);
    Ok((AccountKind::Phone, padded[padded.len() - 13..].to_string()))
}

fn tlv(tag: &str, value: &str) -> String {
    format!("{}{:02}{}", tag, value.len(), value)
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build the payload a banking app scans to pay `amount` baht to `account_id`.
pub fn generate_payload(account_id: &str, amount: Decimal) -> Result<String> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidAmount("Amount must be positive".into()));
    }
    let (kind, target) = normalize_account(account_id)?;

    let merchant = format!(
        "{}{}",
        tlv(MERCHANT_TAG_AID, PROMPTPAY_AID),
        tlv(kind.tag(), &target)
    );
    let amount = format!("{:.2}", amount.round_dp(2));

    let mut payload = String::with_capacity(96);
    payload.push_str(&tlv(TAG_PAYLOAD_FORMAT, PAYLOAD_FORMAT_EMV));
    payload.push_str(&tlv(TAG_INITIATION, INITIATION_DYNAMIC));
    payload.push_str(&tlv(TAG_MERCHANT_PROMPTPAY, &merchant));
    payload.push_str(&tlv(TAG_COUNTRY, COUNTRY_TH));
    payload.push_str(&tlv(TAG_CURRENCY, CURRENCY_THB));
    payload.push_str(&tlv(TAG_AMOUNT, &amount));
    payload.push_str(TAG_CRC);
    payload.push_str("04");

    let checksum = crc16(payload.as_bytes());
    payload.push_str(&format!("{:04X}", checksum));
    Ok(payload)
}
