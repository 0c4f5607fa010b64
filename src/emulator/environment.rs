/*!
  Test-environment import: a JSON object mapping environment names to memory images
  applied before a run. Addresses are spelled as decimal or `0x`-hex strings; values are
  plain 32-bit integers.

  ```json
  { "fibonacci": { "entry_mem": { "0x64": 13, "101": -7 } } }
  ```
*/

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::emulator::Emulator;

#[derive(Debug, Error)]
pub enum EnvironmentError {
  #[error("malformed environment file: {0}")]
  Json(#[from] serde_json::Error),

  #[error("`{text}` is not a 32-bit memory address")]
  BadAddress { text: String }
}

#[derive(Debug, Deserialize)]
struct RawEnvironment {
  entry_mem: HashMap<String, i32>
}

/// One named environment: the initial memory cells it seeds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Environment {
  pub entry_mem: HashMap<i32, i32>
}

impl Environment {
  pub fn apply(&self, emulator: &mut Emulator) {
    for (&address, &value) in self.entry_mem.iter() {
      emulator.write_memory(address, value);
    }
  }
}

fn parse_address(text: &str) -> Result<i32, EnvironmentError> {
  let folded = text.trim().to_ascii_lowercase();
  let parsed = match folded.strip_prefix("0x") {
    Some(digits) => u32::from_str_radix(digits, 16).map(|bits| bits as i32).ok(),
    None         => folded.parse::<i64>().ok().and_then(|value| {
      match value >= i32::MIN as i64 && value <= u32::MAX as i64 {
        true  => Some(value as u32 as i32),
        false => None
      }
    })
  };
  parsed.ok_or_else(|| EnvironmentError::BadAddress { text: text.to_string() })
}

pub fn parse_environments(json: &str) -> Result<HashMap<String, Environment>, EnvironmentError> {
  let raw: HashMap<String, RawEnvironment> = serde_json::from_str(json)?;
  let mut environments = HashMap::new();
  for (name, environment) in raw {
    let mut entry_mem = HashMap::new();
    for (address, value) in environment.entry_mem {
      entry_mem.insert(parse_address(&address)?, value);
    }
    environments.insert(name, Environment { entry_mem });
  }
  Ok(environments)
}
