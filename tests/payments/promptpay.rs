use scriptshop::payments::promptpay::{crc16, generate_payload};

use crate::common::*;

/// Split a TLV string into (tag, value) pairs.
fn parse_tlv(mut payload: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    while payload.len() >= 4 {
        let tag = &payload[..2];
        let len: usize = payload[2..4].parse().unwrap();
        fields.push((tag.to_string(), payload[4..4 + len].to_string()));
        payload = &payload[4 + len..];
    }
    fields
}

#[test]
fn test_payload_for_phone_number() {
    let payload = generate_payload("0812345678", dec("100.37")).unwrap();

    assert!(payload.starts_with("000201010212"));
    assert!(payload.contains("0016A000000677010111"));
    assert!(payload.contains("01130066812345678"));
    assert!(payload.contains("5802TH"));
    assert!(payload.contains("5303764"));
    assert!(payload.contains("5406100.37"));
}

#[test]
fn test_payload_fields_are_well_formed() {
    let payload = generate_payload("0812345678", dec("250")).unwrap();
    let fields = parse_tlv(&payload);
    let tags: Vec<&str> = fields.iter().map(|(t, _)| t.as_str()).collect();

    assert_eq!(tags, vec!["00", "01", "29", "58", "53", "54", "63"]);

    let merchant = parse_tlv(&fields[2].1);
    assert_eq!(merchant[0], ("00".to_string(), "A000000677010111".to_string()));
    assert_eq!(merchant[1], ("01".to_string(), "0066812345678".to_string()));

    assert_eq!(fields[5].1, "250.00");
}

#[test]
fn test_payload_crc_covers_everything_before_it() {
    let payload = generate_payload("0812345678", dec("100.37")).unwrap();
    let (body, checksum) = payload.split_at(payload.len() - 4);

    assert!(body.ends_with("6304"));
    assert_eq!(checksum, format!("{:04X}", crc16(body.as_bytes())));
    assert!(checksum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
}

#[test]
fn test_payload_uses_tax_id_tag() {
    let payload = generate_payload("1234567890123", dec("10")).unwrap();
    assert!(payload.contains("02131234567890123"));
}

#[test]
fn test_payload_rejects_non_positive_amounts() {
    assert!(generate_payload("0812345678", dec("0")).is_err());
    assert!(generate_payload("0812345678", dec("-1")).is_err());
}

#[test]
fn test_crc_check_value() {
    assert_eq!(crc16(b"123456789"), 0x29B1);
}
