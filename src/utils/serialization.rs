// Thin wrapper over bincode 2.0 with the standard configuration
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Decode a value, rejecting input with bytes left over after it
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, consumed) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if consumed != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Deserialization left {} trailing bytes",
            bytes.len() - consumed
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Record {
        id: u64,
        payload: Vec<u8>,
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let bytes = serialize(&Record {
            id: 7,
            payload: vec![1, 2, 3, 4, 5],
        })
        .unwrap();
        let result: Result<Record> = deserialize(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(BlockchainError::Serialization(_))));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = serialize(&Record {
            id: 7,
            payload: vec![],
        })
        .unwrap();
        bytes.push(0);
        let result: Result<Record> = deserialize(&bytes);
        assert!(matches!(result, Err(BlockchainError::Serialization(_))));
    }
}
