//! AWS Signature Version 4 for JSON-protocol services (`POST /` with an
//! `X-Amz-Target` header), which is all the Rekognition client needs.

use ::chrono::{DateTime, Utc};
use ::hmac_sha256::{Hash, HMAC};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl ::std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct JsonRequest<'a> {
    pub host: &'a str,
    pub target: &'a str,
    pub content_type: &'a str,
    pub payload: &'a [u8],
}

pub fn signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> [u8; 32] {
    let k_date = HMAC::mac(date.as_bytes(), format!("AWS4{}", secret_access_key));
    let k_region = HMAC::mac(region.as_bytes(), k_date);
    let k_service = HMAC::mac(service.as_bytes(), k_region);
    HMAC::mac(b"aws4_request", k_service)
}

fn canonical_headers(
    request: &JsonRequest<'_>,
    amz_date: &str,
    session_token: Option<&str>,
) -> Vec<(&'static str, String)> {
    // Must stay sorted by header name.
    let mut headers = vec![
        ("content-type", request.content_type.to_string()),
        ("host", request.host.to_string()),
        ("x-amz-date", amz_date.to_string()),
    ];
    if let Some(token) = session_token {
        headers.push(("x-amz-security-token", token.to_string()));
    }
    headers.push(("x-amz-target", request.target.to_string()));
    headers
}

pub(crate) fn canonical_request(
    request: &JsonRequest<'_>,
    headers: &[(&'static str, String)],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = signed_header_names(headers);

    format!(
        "POST\n/\n\n{}\n{}\n{}",
        canonical_headers,
        signed_headers,
        ::hex::encode(Hash::hash(request.payload))
    )
}

fn hex_signature(signing_key: &[u8; 32], string_to_sign: &str) -> String {
    ::hex::encode(HMAC::mac(string_to_sign.as_bytes(), signing_key))
}

fn signed_header_names(headers: &[(&'static str, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";")
}

/// Returns the headers to attach to the request: `X-Amz-Date`, the optional
/// `X-Amz-Security-Token` and `Authorization`.
pub fn sign(
    credentials: &Credentials,
    region: &str,
    service: &str,
    request: &JsonRequest<'_>,
    time: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, region, service);

    let headers = canonical_headers(
        request,
        &amz_date,
        credentials.session_token.as_deref(),
    );
    let canonical = canonical_request(request, &headers);

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        ::hex::encode(Hash::hash(canonical.as_bytes()))
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, service);
    let signature = hex_signature(&key, &string_to_sign);

    let mut out = vec![("X-Amz-Date", amz_date)];
    if let Some(token) = &credentials.session_token {
        out.push(("X-Amz-Security-Token", token.clone()));
    }
    out.push((
        "Authorization",
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id,
            scope,
            signed_header_names(&headers),
            signature
        ),
    ));
    out
}
