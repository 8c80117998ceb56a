//! Serde support for ledger types: addresses as base58 strings.

use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::identity::Address;

impl Serialize for Address {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(d: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        Address::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn address_valid_serde() {
        let addr = Keypair::from_seed([5u8; 32]).address();
        let ser = serde_json::to_string(&addr).unwrap();
        assert_eq!(ser, format!("\"{}\"", addr));
        let de: Address = serde_json::from_str(&ser).unwrap();
        assert_eq!(de, addr);
    }

    #[test]
    fn address_as_map_key() {
        let addr = Keypair::from_seed([5u8; 32]).address();
        let map = BTreeMap::from([(addr, 7u64)]);
        let ser = serde_json::to_string(&map).unwrap();
        let de: BTreeMap<Address, u64> = serde_json::from_str(&ser).unwrap();
        assert_eq!(de, map);
    }

    #[test]
    fn address_invalid_serde() {
        assert!(serde_json::from_str::<Address>("\"not-base58-0OIl\"").is_err());
        assert!(serde_json::from_str::<Address>("\"0xdeadbeef\"").is_err());
    }
}
