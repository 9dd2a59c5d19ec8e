use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use mws_client::Params;
use mws_client::signing::{self, canonical_query, encode, format_timestamp, signed_query, string_to_sign};
use sha2::Sha256;

const SECRET: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

fn sample_params() -> Params {
    let mut params = Params::new();
    params.insert("Action".to_string(), "GetReportRequestList".to_string());
    params.insert("AWSAccessKeyId".to_string(), "AKIDEXAMPLE".to_string());
    params.insert("Merchant".to_string(), "M_TEST_1".to_string());
    params.insert("Marketplace".to_string(), "ATVPDKIKX0DER".to_string());
    params.insert("Version".to_string(), "2009-01-01".to_string());
    params.insert("Timestamp".to_string(), "2024-03-01T12:00:00Z".to_string());
    params.insert("ReportRequestIdList.Id.1".to_string(), "2291326454".to_string());
    params.insert("ReportRequestIdList.Id.10".to_string(), "2291326463".to_string());
    params.insert("ReportRequestIdList.Id.2".to_string(), "2291326455".to_string());
    params
}

fn independent_signature(data: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(data.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

#[test]
fn test_rfc3986_encoding() {
    assert_eq!(encode("AZaz09-_.~"), "AZaz09-_.~");
    assert_eq!(encode("a b+c/d=e&f"), "a%20b%2Bc%2Fd%3De%26f");
    assert_eq!(encode("2024-03-01T12:00:00Z"), "2024-03-01T12%3A00%3A00Z");
    assert_eq!(encode("é"), "%C3%A9");
}

#[test]
fn test_timestamp_format() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
    assert_eq!(format_timestamp(at), "2024-03-01T09:05:07Z");
}

#[test]
fn test_string_to_sign_layout() {
    let mut params = Params::new();
    params.insert("B".to_string(), "2".to_string());
    params.insert("A".to_string(), "1 1".to_string());
    let data = string_to_sign("post", "MWS.AmazonServices.com", "/", &params);
    assert_eq!(data, "POST\nmws.amazonservices.com\n/\nA=1%201&B=2");
}

#[test]
fn test_signature_is_deterministic_and_verifiable() {
    let mut first = sample_params();
    let mut second = sample_params();
    let query_a = signed_query("GET", "mws.amazonservices.com", "/", &mut first, SECRET).unwrap();
    let query_b = signed_query("GET", "mws.amazonservices.com", "/", &mut second, SECRET).unwrap();
    assert_eq!(query_a, query_b);

    assert_eq!(first.get("SignatureMethod").map(String::as_str), Some("HmacSHA256"));
    assert_eq!(first.get("SignatureVersion").map(String::as_str), Some("2"));

    let expected = independent_signature(&string_to_sign("GET", "mws.amazonservices.com", "/", &first));
    assert!(query_a.ends_with(&format!("&Signature={}", encode(&expected))));
    assert_eq!(signing::sign(SECRET, "abc").unwrap(), independent_signature("abc"));
}

#[test]
fn test_signed_query_keys_are_sorted() {
    let mut params = sample_params();
    let query = signed_query("GET", "mws.amazonservices.com", "/", &mut params, SECRET).unwrap();

    let keys: Vec<&str> = query
        .split('&')
        .map(|pair| pair.split('=').next().unwrap())
        .collect();
    let (signature, rest) = keys.split_last().unwrap();
    assert_eq!(*signature, "Signature");
    assert!(rest.windows(2).all(|pair| pair[0] < pair[1]), "keys out of order: {:?}", rest);
    assert!(!rest.contains(&"Signature"));

    // Byte order, not natural order
    let position = |key: &str| rest.iter().position(|k| *k == key).unwrap();
    assert!(position("ReportRequestIdList.Id.1") < position("ReportRequestIdList.Id.10"));
    assert!(position("ReportRequestIdList.Id.10") < position("ReportRequestIdList.Id.2"));
    assert!(position("AWSAccessKeyId") < position("Action"));
}

#[test]
fn test_changing_any_input_changes_signature() {
    let sign = |method: &str, host: &str, params: &mut Params, secret: &str| {
        signed_query(method, host, "/", params, secret).unwrap()
    };
    let base = sign("GET", "mws.amazonservices.com", &mut sample_params(), SECRET);
    assert_ne!(base, sign("POST", "mws.amazonservices.com", &mut sample_params(), SECRET));
    assert_ne!(base, sign("GET", "mws.amazonservices.ca", &mut sample_params(), SECRET));
    assert_ne!(base, sign("GET", "mws.amazonservices.com", &mut sample_params(), "other"));

    let mut changed = sample_params();
    changed.insert("Timestamp".to_string(), "2024-03-01T12:00:01Z".to_string());
    assert_ne!(base, sign("GET", "mws.amazonservices.com", &mut changed, SECRET));
}

#[test]
fn test_empty_values_are_kept() {
    let mut params = Params::new();
    params.insert("Empty".to_string(), String::new());
    params.insert("Key".to_string(), "v".to_string());
    assert_eq!(canonical_query(&params), "Empty=&Key=v");
}
