//! Wire encodings of the SAML bindings.
//!
//! Requests arrive over HTTP-Redirect (raw DEFLATE, then base64, in a query
//! parameter); responses leave over HTTP-POST (base64 only, in a form body).

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{
    write::DeflateEncoder, Compression, Decompress, FlushDecompress, Status,
};
use quick_xml::se::Serializer;
use serde::{de::DeserializeOwned, Serialize};

use idp_slo::{errors, Result};

use crate::schema::{AuthnRequest, Response, XmlRoot};

/// Upper bound on an inflated SAMLRequest unless configured otherwise.
pub const DEFAULT_MAX_INFLATE_SIZE: usize = 128 * 1024;

const INFLATE_CHUNK: usize = 8 * 1024;

/// base64 -> inflate -> XML. The first failing step decides the error kind.
pub fn decode_authn_request(raw: &str, max_size: usize) -> Result<AuthnRequest> {
    // Line breaks are tolerated inside the base64 payload.
    let raw: String = raw.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    let data = STANDARD.decode(raw).map_err(|err| {
        errors::decode(&format!("failed to decode SAMLRequest: {err}"))
    })?;
    let buf = inflate(&data, max_size)?;
    let xml = std::str::from_utf8(&buf).map_err(|err| {
        errors::xml_parse(&format!("failed to unmarshal SAMLRequest: {err}"))
    })?;
    quick_xml::de::from_str(xml).map_err(|err| {
        errors::xml_parse(&format!("failed to unmarshal SAMLRequest: {err}"))
    })
}

/// XML -> deflate -> base64, the form an SP puts on the redirect URL.
pub fn encode_authn_request(request: &AuthnRequest) -> Result<String> {
    let xml = marshal_indent(request)?;
    Ok(STANDARD.encode(deflate(xml.as_bytes())?))
}

/// XML -> base64, the SAMLResponse value of the POST form.
pub fn encode_response(response: &Response) -> Result<String> {
    let xml = marshal_indent(response).map_err(|err| {
        errors::marshal(&format!("failed to format response: {err}"))
    })?;
    Ok(STANDARD.encode(xml))
}

/// Serialize `value` as its root element, tab indented.
pub fn marshal_indent<T: Serialize + XmlRoot>(value: &T) -> Result<String> {
    let mut buf = String::new();
    let mut ser = Serializer::with_root(&mut buf, Some(T::ROOT))
        .map_err(|err| errors::marshal(&err))?;
    ser.indent('\t', 1);
    value.serialize(ser).map_err(|err| errors::marshal(&err))?;
    Ok(buf)
}

pub fn unmarshal<T: DeserializeOwned>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml).map_err(|err| errors::xml_parse(&err))
}

/// Inflate a raw DEFLATE stream of at most `limit` output bytes.
///
/// The stream must reach its final block: input that runs out before that
/// is reported as truncated rather than returned partially.
pub fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut out =
        Vec::with_capacity(INFLATE_CHUNK.min(limit.saturating_add(1)));
    loop {
        if out.len() > limit {
            return Err(errors::inflate(&format!(
                "SAMLRequest inflates beyond {limit} bytes"
            )));
        }
        if out.len() == out.capacity() {
            out.reserve_exact(
                INFLATE_CHUNK.min(limit.saturating_add(1) - out.len()),
            );
        }
        let (total_in, total_out) = (inflater.total_in(), inflater.total_out());
        // total_in never exceeds data.len().
        let status = inflater
            .decompress_vec(
                &data[total_in as usize..],
                &mut out,
                FlushDecompress::None,
            )
            .map_err(|err| {
                errors::inflate(&format!("failed to read SAMLRequest: {err}"))
            })?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if inflater.total_in() == total_in
                    && inflater.total_out() == total_out
                {
                    return Err(errors::inflate(
                        "failed to read SAMLRequest: unexpected end of stream",
                    ));
                }
            }
        }
    }
    if out.len() > limit {
        return Err(errors::inflate(&format!(
            "SAMLRequest inflates beyond {limit} bytes"
        )));
    }
    Ok(out)
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|err| errors::marshal(&err))?;
    encoder.finish().map_err(|err| errors::marshal(&err))
}
