//! Shared Key request signing for the Blob service

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blobsync_types::{Error, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Method, Url};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// `Content-MD5`, which the `http` crate has no constant for
pub(crate) const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Standard headers that take part in the signature, in signing order
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Signs requests with a storage account's shared key
#[derive(Clone)]
pub struct SharedKeySigner {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeySigner")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeySigner {
    /// Create a signer from the account name and its base64 access key
    pub fn new(account: impl Into<String>, access_key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(access_key.trim())
            .map_err(|e| Error::config(format!("storage_access_key is not valid base64: {e}")))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    /// Storage account name
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Value of the `Authorization` header for a request
    pub fn authorization(&self, method: &Method, url: &Url, headers: &HeaderMap) -> Result<String> {
        let string_to_sign = self.string_to_sign(method, url, headers);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::config(format!("unusable storage access key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    /// Canonical string covered by the signature
    pub fn string_to_sign(&self, method: &Method, url: &Url, headers: &HeaderMap) -> String {
        let mut out = String::new();
        out.push_str(method.as_str());
        out.push('\n');

        for name in SIGNED_HEADERS {
            let value = header_str(headers, name);
            // A zero length is signed as an empty string
            if name == "content-length" && value == "0" {
                out.push('\n');
                continue;
            }
            out.push_str(value);
            out.push('\n');
        }

        out.push_str(&canonicalized_headers(headers));
        out.push_str(&self.canonicalized_resource(url));
        out
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.to_lowercase())
                .or_default()
                .push(value.into_owned());
        }
        for (name, mut values) in params {
            values.sort();
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(&values.join(","));
        }
        resource
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?.trim())))
        .collect();
    ms_headers.sort_unstable();

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};

    fn signer() -> SharedKeySigner {
        SharedKeySigner::new("myaccount", &STANDARD.encode(b"not-a-real-key")).unwrap()
    }

    #[test]
    fn test_rejects_invalid_key() {
        let error = SharedKeySigner::new("myaccount", "***").unwrap_err();
        assert!(error.to_string().contains("storage_access_key"));
    }

    #[test]
    fn test_string_to_sign_for_put() {
        let url = Url::parse("https://myaccount.blob.core.windows.net/www/css/site.css").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("7"));
        headers.insert(CONTENT_MD5, HeaderValue::from_static("abc=="));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"),
        );

        let expected = "PUT\n\n\n7\nabc==\ntext/css\n\n\n\n\n\n\n\
            x-ms-blob-type:BlockBlob\n\
            x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
            x-ms-version:2021-08-06\n\
            /myaccount/www/css/site.css";
        assert_eq!(signer().string_to_sign(&Method::PUT, &url, &headers), expected);
    }

    #[test]
    fn test_zero_length_and_query_are_canonicalized() {
        let url =
            Url::parse("https://myaccount.blob.core.windows.net/www?restype=container&comp=list")
                .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let signed = signer().string_to_sign(&Method::GET, &url, &headers);
        assert!(signed.starts_with("GET\n\n\n\n"));
        assert!(signed.ends_with("/myaccount/www\ncomp:list\nrestype:container"));
    }

    #[test]
    fn test_authorization_header_shape() {
        let url = Url::parse("https://myaccount.blob.core.windows.net/www/a.txt").unwrap();
        let headers = HeaderMap::new();
        let signer = signer();

        let first = signer.authorization(&Method::HEAD, &url, &headers).unwrap();
        let second = signer.authorization(&Method::HEAD, &url, &headers).unwrap();
        assert_eq!(first, second);

        let signature = first.strip_prefix("SharedKey myaccount:").unwrap();
        assert_eq!(STANDARD.decode(signature).unwrap().len(), 32);
    }
}
