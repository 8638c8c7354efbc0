//! JSON設定ファイルから作るウォレットとブロードキャスト先 (CLI用)。

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use bitcoin::{
    bip32::{ChildNumber, DerivationPath},
    psbt::Psbt,
    Address, Amount, Network as BitcoinNetwork, OutPoint, PrivateKey, ScriptBuf, Transaction,
    TxOut, Txid,
};

use crate::config::InputConfig;
use crate::error::{Result, SendError};
use crate::services::{ChainBackend, LabelResult, WalletService};
use crate::transaction::LocalSigner;
use crate::types::{total_value, AccountIndex, CandidateInput, Destination, ScriptType};

/// 送金先としてバーンを表す文字列。
pub const BURN_MARKER: &str = "BURN";

// タイムロック付きアドレスの派生パス上のブランチ番号
const TIMELOCKED_BRANCH: u32 = 2;

pub struct FileWallet {
    network: BitcoinNetwork,
    utxos: Vec<(AccountIndex, CandidateInput)>,
    change_addresses: BTreeMap<AccountIndex, Address>,
    known_scripts: BTreeSet<ScriptBuf>,
    labels: RefCell<BTreeMap<String, String>>,
    signer: LocalSigner,
}

impl FileWallet {
    pub fn from_config(config: &InputConfig, network: BitcoinNetwork) -> Result<Self> {
        let mut signer = LocalSigner::new();
        let mut utxos = Vec::with_capacity(config.utxos.len());
        let mut known_scripts = BTreeSet::new();

        for utxo in &config.utxos {
            let private_key = PrivateKey::from_wif(&utxo.private_key_wif)?;
            if private_key.network != network.into() {
                return Err(SendError::InvalidRequest(format!(
                    "ネットワーク不整合: CLI指定 ({:?}) vs WIF ({:?})",
                    network, private_key.network
                )));
            }
            let txid = Txid::from_str(&utxo.txid).map_err(|e| {
                SendError::InvalidRequest(format!("無効なTXID形式 ({}): {}", utxo.txid, e))
            })?;
            let script_pubkey_bytes = hex::decode(&utxo.script_pubkey_hex).map_err(|e| {
                SendError::InvalidRequest(format!("scriptPubKeyHexのデコード失敗: {}", e))
            })?;
            let script_pubkey = ScriptBuf::from_bytes(script_pubkey_bytes);
            let path = DerivationPath::from_str(&utxo.derivation_path).map_err(|e| {
                SendError::InvalidRequest(format!(
                    "無効な派生パス ({}): {}",
                    utxo.derivation_path, e
                ))
            })?;

            signer.add_key(script_pubkey.clone(), private_key)?;
            known_scripts.insert(script_pubkey.clone());
            log::debug!(
                "UTXO追加: txid={}, vout={}, value={}, account={}",
                utxo.txid, utxo.vout, utxo.value_sats, utxo.account
            );
            utxos.push((
                utxo.account,
                CandidateInput {
                    out_point: OutPoint::new(txid, utxo.vout),
                    value: Amount::from_sat(utxo.value_sats),
                    script_pubkey,
                    path,
                },
            ));
        }

        let mut change_addresses = BTreeMap::new();
        for (account, addr) in &config.change_addresses {
            let address = Address::from_str(addr)
                .and_then(|a| a.require_network(network))
                .map_err(|e| {
                    SendError::InvalidRequest(format!(
                        "おつりアドレス形式エラーまたはネットワーク不整合 ({}): {}",
                        addr, e
                    ))
                })?;
            known_scripts.insert(address.script_pubkey());
            change_addresses.insert(*account, address);
        }

        Ok(FileWallet {
            network,
            utxos,
            change_addresses,
            known_scripts,
            labels: RefCell::new(BTreeMap::new()),
            signer,
        })
    }

    pub fn label_of(&self, address: &Address) -> Option<String> {
        self.labels.borrow().get(&address.to_string()).cloned()
    }

    fn account_utxos(&self, account: AccountIndex) -> impl Iterator<Item = &CandidateInput> {
        self.utxos
            .iter()
            .filter(move |(a, _)| *a == account)
            .map(|(_, utxo)| utxo)
    }
}

impl WalletService for FileWallet {
    fn validate_address(&self, address: &str) -> std::result::Result<Address, String> {
        Address::from_str(address)
            .and_then(|a| a.require_network(self.network))
            .map_err(|e| e.to_string())
    }

    fn is_burn_destination(&self, destination: &str) -> bool {
        destination == BURN_MARKER
    }

    fn supports_fidelity_bonds(&self) -> bool {
        true
    }

    fn spendable_inputs(&self, account: AccountIndex) -> Vec<CandidateInput> {
        self.account_utxos(account).cloned().collect()
    }

    /// 金額の大きい順に必要額に達するまで選ぶ。
    fn select_inputs(&self, account: AccountIndex, min_value: Amount) -> Result<Vec<CandidateInput>> {
        let mut candidates: Vec<CandidateInput> = self.account_utxos(account).cloned().collect();
        candidates.sort_by(|a, b| b.value.cmp(&a.value));

        let mut selected = Vec::new();
        let mut total = Amount::ZERO;
        for utxo in candidates {
            if total >= min_value {
                break;
            }
            total += utxo.value;
            selected.push(utxo);
        }
        if total < min_value {
            return Err(SendError::InsufficientFunds {
                available: total_value(&selected),
                required: min_value,
                fee: Amount::ZERO,
            });
        }
        Ok(selected)
    }

    fn output_script_type(&self, destination: &Destination) -> Option<ScriptType> {
        match destination {
            Destination::Address(address) => ScriptType::from_address(address),
            Destination::Burn => None,
        }
    }

    fn account_script_type(&self) -> ScriptType {
        self.utxos
            .iter()
            .filter(|(_, u)| !self.is_timelocked_path(&u.path))
            .find_map(|(_, u)| ScriptType::classify(&u.script_pubkey))
            .unwrap_or(ScriptType::P2WPKH)
    }

    fn internal_change_address(&self, account: AccountIndex) -> Result<Address> {
        self.change_addresses.get(&account).cloned().ok_or_else(|| {
            SendError::InvalidRequest(format!(
                "アカウント {} のおつりアドレスが設定されていません",
                account
            ))
        })
    }

    fn is_timelocked_path(&self, path: &DerivationPath) -> bool {
        let children: &[ChildNumber] = path.as_ref();
        children.len() == 6 && children[3] == ChildNumber::Normal { index: TIMELOCKED_BRANCH }
    }

    fn unlock_time_of(&self, path: &DerivationPath) -> u32 {
        let children: &[ChildNumber] = path.as_ref();
        children.last().map(|c| u32::from(*c)).unwrap_or(0)
    }

    fn label_address(&self, address: &Address, label: &str) -> LabelResult {
        if !self.known_scripts.contains(&address.script_pubkey()) {
            return LabelResult::UnknownAddress;
        }
        self.labels
            .borrow_mut()
            .insert(address.to_string(), label.to_string());
        LabelResult::Labeled
    }

    fn sign_raw(
        &self,
        tx: &mut Transaction,
        spent_outputs: &[TxOut],
    ) -> std::result::Result<(), String> {
        self.signer
            .sign_transaction(tx, spent_outputs)
            .map_err(|e| e.to_string())
    }

    fn sign_partial(&self, psbt: Psbt) -> std::result::Result<Psbt, String> {
        self.signer.sign_psbt(psbt).map_err(|e| e.to_string())
    }
}

/// 実際のノードの代わりに、raw transaction hexをファイルと標準出力へ書き出す。
pub struct FileBroadcaster {
    current_height: u32,
    output_file: PathBuf,
}

impl FileBroadcaster {
    pub fn new(current_height: u32, output_file: PathBuf) -> Self {
        FileBroadcaster {
            current_height,
            output_file,
        }
    }
}

impl ChainBackend for FileBroadcaster {
    fn current_height(&self) -> u32 {
        self.current_height
    }

    fn push_tx(&self, raw_tx: &[u8]) -> bool {
        let serialized_tx = hex::encode(raw_tx);
        log::info!("Raw transaction hex: {}", serialized_tx);
        println!("{}", serialized_tx);
        match fs::write(&self.output_file, serialized_tx.as_bytes()) {
            Ok(()) => {
                log::info!("Raw transactionを {:?} に保存しました。", self.output_file);
                true
            }
            Err(e) => {
                log::error!("出力ファイルへの書き込みに失敗しました: {:?}: {}", self.output_file, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UtxoInput;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    const TXID: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::new(SecretKey::from_slice(&[byte; 32]).unwrap(), BitcoinNetwork::Testnet)
    }

    fn p2wpkh(pk: &PrivateKey) -> ScriptBuf {
        let secp = Secp256k1::new();
        ScriptBuf::new_p2wpkh(&pk.public_key(&secp).wpubkey_hash().unwrap())
    }

    fn utxo(byte: u8, vout: u32, sats: u64, account: AccountIndex) -> UtxoInput {
        let pk = key(byte);
        UtxoInput {
            txid: TXID.to_string(),
            vout,
            script_pubkey_hex: p2wpkh(&pk).to_hex_string(),
            value_sats: sats,
            private_key_wif: pk.to_wif(),
            account,
            derivation_path: format!("m/84'/1'/{}'/0/{}", account, vout),
        }
    }

    fn config(utxos: Vec<UtxoInput>) -> InputConfig {
        let change = Address::from_script(&p2wpkh(&key(7)), BitcoinNetwork::Testnet).unwrap();
        InputConfig {
            fee_rate_sats_per_vb: 1,
            current_height: 100,
            account: 0,
            destinations: vec![],
            custom_change_address: None,
            change_label: None,
            change_addresses: BTreeMap::from([(0, change.to_string())]),
            utxos,
        }
    }

    #[test]
    fn selects_largest_first_within_account() {
        let wallet = FileWallet::from_config(
            &config(vec![utxo(1, 0, 1_000, 0), utxo(2, 1, 5_000, 0), utxo(3, 2, 9_000, 1)]),
            BitcoinNetwork::Testnet,
        )
        .unwrap();
        let picked = wallet.select_inputs(0, Amount::from_sat(4_000)).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].value, Amount::from_sat(5_000));

        let err = wallet.select_inputs(0, Amount::from_sat(7_000)).unwrap_err();
        assert!(matches!(err, SendError::InsufficientFunds { .. }));
        assert_eq!(wallet.spendable_inputs(1).len(), 1);
    }

    #[test]
    fn timelocked_paths_carry_unlock_time() {
        let wallet = FileWallet::from_config(&config(vec![]), BitcoinNetwork::Testnet).unwrap();
        let locked = DerivationPath::from_str("m/84'/1'/0'/2/0/1700000000").unwrap();
        let normal = DerivationPath::from_str("m/84'/1'/0'/0/5").unwrap();
        assert!(wallet.is_timelocked_path(&locked));
        assert_eq!(wallet.unlock_time_of(&locked), 1_700_000_000);
        assert!(!wallet.is_timelocked_path(&normal));
    }

    #[test]
    fn labels_only_wallet_addresses() {
        let wallet = FileWallet::from_config(&config(vec![]), BitcoinNetwork::Testnet).unwrap();
        let change = wallet.internal_change_address(0).unwrap();
        assert_eq!(wallet.label_address(&change, "change"), LabelResult::Labeled);
        assert_eq!(wallet.label_of(&change).as_deref(), Some("change"));

        let foreign = Address::from_script(&p2wpkh(&key(8)), BitcoinNetwork::Testnet).unwrap();
        assert_eq!(wallet.label_address(&foreign, "x"), LabelResult::UnknownAddress);
    }

    #[test]
    fn rejects_wif_from_other_network() {
        let err = FileWallet::from_config(&config(vec![utxo(1, 0, 1_000, 0)]), BitcoinNetwork::Bitcoin)
            .err()
            .unwrap();
        assert!(matches!(err, SendError::InvalidRequest(_)));
    }

    #[test]
    fn push_tx_writes_hex_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tx.hex");
        let backend = FileBroadcaster::new(10, out.clone());
        assert!(backend.push_tx(&[0xde, 0xad]));
        assert_eq!(fs::read_to_string(out).unwrap(), "dead");
    }
}
