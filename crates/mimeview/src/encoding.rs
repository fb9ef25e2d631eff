use crate::{MimeViewError, Result};

/// Define our own because data_encoding::BASE64_MIME, despite its name,
/// is not RFC2045 compliant, and will not ignore spaces
const BASE64_RFC2045: data_encoding::Encoding = data_encoding_macro::new_encoding! {
    symbols: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/",
    padding: '=',
    ignore: " \r\n\t",
    wrap_width: 76,
    wrap_separator: "\r\n",
};

/// Apply the declared content-transfer-encoding to raw body bytes.
/// 7bit, 8bit and absent encodings pass through unchanged.
pub(crate) fn decode_body(raw: &[u8], encoding: Option<&str>) -> Result<String> {
    let bytes = match encoding.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("quoted-printable") => {
            quoted_printable::decode(raw, quoted_printable::ParseMode::Robust)
                .map_err(|err| MimeViewError::Decode(format!("quoted printable decode: {err}")))?
        }
        Some("base64") => BASE64_RFC2045
            .decode(raw)
            .map_err(|err| MimeViewError::Decode(format!("base64 decode: {err}")))?,
        _ => raw.to_vec(),
    };

    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Re-encode a replacement body for the target's declared
/// content-transfer-encoding. The result carries no trailing CRLF.
pub(crate) fn encode_body(body: &str, encoding: Option<&str>) -> Vec<u8> {
    let mut encoded = match encoding.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("quoted-printable") => quoted_printable::encode(body),
        Some("base64") => BASE64_RFC2045.encode(body.as_bytes()).into_bytes(),
        _ => body.as_bytes().to_vec(),
    };

    while encoded.ends_with(b"\r\n") {
        encoded.truncate(encoded.len() - 2);
    }

    encoded
}
