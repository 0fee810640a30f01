use crate::error::Result;
use data_encoding::{BASE64, HEXLOWER};

pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn base64_decode(data: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(data.as_bytes())?)
}

pub fn hex_encode(data: &[u8]) -> String {
    HEXLOWER.encode(data)
}
