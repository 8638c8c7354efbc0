#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::{
    Address, Amount, Network, OutPoint, ScriptBuf, Transaction, TxOut, Txid, WPubkeyHash,
    WScriptHash, Witness,
};
use direct_send::{
    AccountIndex, CandidateInput, ChainBackend, ConfirmationProvider, ConfirmationRequest,
    Destination, LabelResult, Notifier, Result, ScriptType, SendError, WalletService,
};

pub const BURN: &str = "BURN";

pub fn addr(n: u8) -> Address {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([n; 20]));
    Address::from_script(&script, Network::Testnet).unwrap()
}

pub fn input(n: u8, sats: u64) -> CandidateInput {
    CandidateInput {
        out_point: OutPoint::new(Txid::from_byte_array([n; 32]), n as u32),
        value: Amount::from_sat(sats),
        script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([n; 20])),
        path: DerivationPath::from_str(&format!("m/84'/1'/0'/0/{}", n)).unwrap(),
    }
}

pub fn timelocked_input(n: u8, sats: u64, unlock_time: u32) -> CandidateInput {
    CandidateInput {
        out_point: OutPoint::new(Txid::from_byte_array([n; 32]), n as u32),
        value: Amount::from_sat(sats),
        script_pubkey: ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array([n; 32])),
        path: DerivationPath::from_str(&format!("m/84'/1'/0'/2/{}/{}", n, unlock_time)).unwrap(),
    }
}

pub struct FakeWallet {
    pub inputs: BTreeMap<AccountIndex, Vec<CandidateInput>>,
    pub change: Address,
    pub fidelity_bonds: bool,
    pub fail_raw_signing: bool,
    pub fail_partial_signing: bool,
    /// `output_script_type` が `None` を返すアドレス
    pub unresolved: Vec<Address>,
    pub spendable_calls: Cell<usize>,
    pub select_calls: Cell<usize>,
    pub labels: RefCell<Vec<(String, String)>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        FakeWallet {
            inputs: BTreeMap::new(),
            change: addr(200),
            fidelity_bonds: true,
            fail_raw_signing: false,
            fail_partial_signing: false,
            unresolved: vec![],
            spendable_calls: Cell::new(0),
            select_calls: Cell::new(0),
            labels: RefCell::new(vec![]),
        }
    }

    pub fn with_inputs(mut self, account: AccountIndex, inputs: Vec<CandidateInput>) -> Self {
        self.inputs.insert(account, inputs);
        self
    }

    pub fn coin_queries(&self) -> usize {
        self.spendable_calls.get() + self.select_calls.get()
    }

    fn account_inputs(&self, account: AccountIndex) -> Vec<CandidateInput> {
        self.inputs.get(&account).cloned().unwrap_or_default()
    }
}

impl WalletService for FakeWallet {
    fn validate_address(&self, address: &str) -> std::result::Result<Address, String> {
        Address::from_str(address)
            .and_then(|a| a.require_network(Network::Testnet))
            .map_err(|e| e.to_string())
    }

    fn is_burn_destination(&self, destination: &str) -> bool {
        destination == BURN
    }

    fn supports_fidelity_bonds(&self) -> bool {
        self.fidelity_bonds
    }

    fn spendable_inputs(&self, account: AccountIndex) -> Vec<CandidateInput> {
        self.spendable_calls.set(self.spendable_calls.get() + 1);
        self.account_inputs(account)
    }

    fn select_inputs(&self, account: AccountIndex, min_value: Amount) -> Result<Vec<CandidateInput>> {
        self.select_calls.set(self.select_calls.get() + 1);
        let mut selected = vec![];
        let mut total = Amount::ZERO;
        for i in self.account_inputs(account) {
            if total >= min_value {
                break;
            }
            total += i.value;
            selected.push(i);
        }
        if total < min_value {
            return Err(SendError::InsufficientFunds {
                available: total,
                required: min_value,
                fee: Amount::ZERO,
            });
        }
        Ok(selected)
    }

    fn output_script_type(&self, destination: &Destination) -> Option<ScriptType> {
        match destination {
            Destination::Address(a) if self.unresolved.contains(a) => None,
            Destination::Address(a) => ScriptType::from_address(a),
            Destination::Burn => None,
        }
    }

    fn account_script_type(&self) -> ScriptType {
        ScriptType::P2WPKH
    }

    fn internal_change_address(&self, _account: AccountIndex) -> Result<Address> {
        Ok(self.change.clone())
    }

    fn is_timelocked_path(&self, path: &DerivationPath) -> bool {
        let children: &[ChildNumber] = path.as_ref();
        children.len() == 6 && children[3] == ChildNumber::Normal { index: 2 }
    }

    fn unlock_time_of(&self, path: &DerivationPath) -> u32 {
        let children: &[ChildNumber] = path.as_ref();
        u32::from(*children.last().unwrap())
    }

    fn label_address(&self, address: &Address, label: &str) -> LabelResult {
        if *address != self.change {
            return LabelResult::UnknownAddress;
        }
        self.labels
            .borrow_mut()
            .push((address.to_string(), label.to_string()));
        LabelResult::Labeled
    }

    fn sign_raw(&self, tx: &mut Transaction, spent_outputs: &[TxOut]) -> std::result::Result<(), String> {
        if self.fail_raw_signing {
            return Err("no key".to_string());
        }
        assert_eq!(tx.input.len(), spent_outputs.len());
        for txin in tx.input.iter_mut() {
            txin.witness = Witness::from_slice(&[vec![0x30; 72], vec![0x02; 33]]);
        }
        Ok(())
    }

    fn sign_partial(&self, psbt: Psbt) -> std::result::Result<Psbt, String> {
        if self.fail_partial_signing {
            return Err("device refused".to_string());
        }
        Ok(psbt)
    }
}

pub struct FakeChain {
    pub height: u32,
    pub accept: bool,
    pub pushed: RefCell<Vec<Vec<u8>>>,
}

impl FakeChain {
    pub fn new(height: u32) -> Self {
        FakeChain {
            height,
            accept: true,
            pushed: RefCell::new(vec![]),
        }
    }

    pub fn push_count(&self) -> usize {
        self.pushed.borrow().len()
    }

    pub fn last_pushed(&self) -> Transaction {
        let raw = self.pushed.borrow().last().cloned().unwrap();
        bitcoin::consensus::deserialize(&raw).unwrap()
    }
}

impl ChainBackend for FakeChain {
    fn current_height(&self) -> u32 {
        self.height
    }

    fn push_tx(&self, raw_tx: &[u8]) -> bool {
        self.pushed.borrow_mut().push(raw_tx.to_vec());
        self.accept
    }
}

/// 決まった答えを返し、受け取った確認内容を記録する。
pub struct Answer {
    pub accept: bool,
    pub seen: RefCell<Vec<ConfirmationRequest>>,
}

impl Answer {
    pub fn yes() -> Self {
        Answer { accept: true, seen: RefCell::new(vec![]) }
    }

    pub fn no() -> Self {
        Answer { accept: false, seen: RefCell::new(vec![]) }
    }
}

impl ConfirmationProvider for Answer {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.seen.borrow_mut().push(request.clone());
        self.accept
    }
}

#[derive(Default)]
pub struct Messages {
    pub info: RefCell<Vec<String>>,
    pub error: RefCell<Vec<String>>,
}

impl Notifier for Messages {
    fn info(&self, message: &str) {
        self.info.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.error.borrow_mut().push(message.to_string());
    }
}
