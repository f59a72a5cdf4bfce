//! Contract ABI loading
//!
//! ABIs arrive either as a plain JSON array of entries or wrapped in a build
//! artifact object with an `"abi"` field. Loaded once at startup.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ethers::abi::Abi;
use serde_json::Value;

pub fn load_abi<P: AsRef<Path>>(path: P) -> Result<Abi> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read ABI file {}", path.as_ref().display()))?;
    parse_abi(&raw).with_context(|| format!("parse ABI file {}", path.as_ref().display()))
}

pub fn parse_abi(raw: &str) -> Result<Abi> {
    let value: Value = serde_json::from_str(raw).context("ABI is not valid JSON")?;
    let entries = match value {
        Value::Array(_) => value,
        Value::Object(ref obj) => match obj.get("abi") {
            Some(inner @ Value::Array(_)) => inner.clone(),
            Some(_) => bail!("artifact \"abi\" field is not an array"),
            None => bail!("JSON object has no \"abi\" field"),
        },
        _ => bail!("ABI must be a JSON array or an artifact object"),
    };
    let abi: Abi = serde_json::from_value(entries).context("ABI entries failed to decode")?;
    Ok(abi)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = r#"[
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"owner","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}]}
    ]"#;

    #[test]
    fn test_plain_array_form() {
        let abi = parse_abi(PLAIN).unwrap();
        assert!(abi.function("balanceOf").is_ok());
    }

    #[test]
    fn test_artifact_wrapper_form() {
        let wrapped = format!(r#"{{"contractName":"Token","abi":{}}}"#, PLAIN);
        let abi = parse_abi(&wrapped).unwrap();
        assert!(abi.function("balanceOf").is_ok());
    }

    #[test]
    fn test_rejects_object_without_abi_field() {
        assert!(parse_abi(r#"{"contractName":"Token"}"#).is_err());
        assert!(parse_abi(r#""just a string""#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("cl-rebalancer-abi-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("erc20.json");
        fs::write(&path, PLAIN).unwrap();
        let abi = load_abi(&path).unwrap();
        assert!(abi.function("balanceOf").is_ok());
    }
}
