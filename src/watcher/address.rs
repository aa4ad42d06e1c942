use ethers::abi::ParamType;
use ethers::contract::{parse_log, EthEvent};
use ethers::types::{Address, Log, TransactionReceipt};
use tracing::debug;

use crate::abis::ProxyCreationFilter;
use crate::error::WatchError;

/// Finds the address of the contract created by `receipt`.
///
/// A decoded `ProxyCreation` event wins, then the receipt's own
/// `contract_address`, and finally the first log read as a bare address.
pub fn extract_deployed_address(
    receipt: &TransactionReceipt,
) -> Result<Address, WatchError> {
    if let Some(address) = receipt.logs.iter().find_map(decode_proxy_creation) {
        debug!(?address, "Address taken from the creation event");
        return Ok(address);
    }

    if let Some(address) = receipt.contract_address {
        debug!(?address, "Address taken from the receipt");
        return Ok(address);
    }

    receipt
        .logs
        .first()
        .and_then(decode_address_log)
        .ok_or(WatchError::AddressExtractionFailed {
            tx_hash: receipt.transaction_hash,
        })
}

fn decode_proxy_creation(log: &Log) -> Option<Address> {
    if log.topics.first() != Some(&ProxyCreationFilter::signature()) {
        return None;
    }

    match parse_log::<ProxyCreationFilter>(log.clone()) {
        Ok(event) => Some(event.proxy),
        Err(_) => decode_address_log(log),
    }
}

fn decode_address_log(log: &Log) -> Option<Address> {
    // indexed parameter
    if let Some(topic) = log.topics.get(1) {
        return Some(Address::from_slice(&topic.as_bytes()[12..]));
    }

    let tokens = ethers::abi::decode(&[ParamType::Address], &log.data).ok()?;

    tokens.into_iter().next()?.into_address()
}

#[cfg(test)]
mod tests {
    use ethers::types::{Bytes, H160, H256};
    use hex_literal::hex;

    use super::*;

    const PROXY: Address = H160(hex!("d9145cce52d386f254917e481eb44e9943f39138"));

    fn address_word(address: Address) -> Bytes {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_bytes());
        Bytes::from(word.to_vec())
    }

    fn receipt_with_logs(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: H256::repeat_byte(0xab),
            logs,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_the_creation_event() {
        let unrelated = Log {
            topics: vec![H256::repeat_byte(1)],
            data: address_word(Address::repeat_byte(9)),
            ..Default::default()
        };
        let creation = Log {
            topics: vec![ProxyCreationFilter::signature()],
            data: address_word(PROXY),
            ..Default::default()
        };

        let mut receipt = receipt_with_logs(vec![unrelated, creation]);
        receipt.contract_address = Some(Address::repeat_byte(7));

        assert_eq!(extract_deployed_address(&receipt).unwrap(), PROXY);
    }

    #[test]
    fn falls_back_to_contract_address() {
        let mut receipt = receipt_with_logs(vec![]);
        receipt.contract_address = Some(PROXY);

        assert_eq!(extract_deployed_address(&receipt).unwrap(), PROXY);
    }

    #[test]
    fn decodes_first_log_data() {
        let log = Log {
            topics: vec![H256::repeat_byte(2)],
            data: address_word(PROXY),
            ..Default::default()
        };

        let receipt = receipt_with_logs(vec![log]);

        assert_eq!(extract_deployed_address(&receipt).unwrap(), PROXY);
    }

    #[test]
    fn decodes_indexed_first_log() {
        let mut indexed = [0u8; 32];
        indexed[12..].copy_from_slice(PROXY.as_bytes());

        let log = Log {
            topics: vec![H256::repeat_byte(2), H256(indexed)],
            ..Default::default()
        };

        let receipt = receipt_with_logs(vec![log]);

        assert_eq!(extract_deployed_address(&receipt).unwrap(), PROXY);
    }

    #[test]
    fn fails_without_any_source() {
        let log = Log {
            topics: vec![H256::repeat_byte(2)],
            data: Bytes::from(vec![1, 2, 3]),
            ..Default::default()
        };

        let err = extract_deployed_address(&receipt_with_logs(vec![log]))
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::AddressExtractionFailed { tx_hash } if tx_hash == H256::repeat_byte(0xab)
        ));

        let err =
            extract_deployed_address(&receipt_with_logs(vec![])).unwrap_err();
        assert!(matches!(err, WatchError::AddressExtractionFailed { .. }));
    }
}
