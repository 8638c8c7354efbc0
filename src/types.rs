use std::fmt;

use bitcoin::{
    address::AddressType, bip32::DerivationPath, opcodes::all::OP_RETURN, psbt::Psbt,
    script::Builder, Address, Amount, OutPoint, ScriptBuf, Transaction, TxOut, Txid,
};
use serde::Deserialize;

use crate::error::SendError;

/// 送金元として使えるアカウント(mixdepth)の番号。
pub type AccountIndex = u32;

/// タイムロック付きUTXOとバーンが許されるフィデリティボンド用アカウント。
pub const FIDELITY_BOND_ACCOUNT: AccountIndex = 0;

#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ScriptType {
    P2PKH,
    P2SH_P2WPKH,
    P2WPKH,
    P2WSH,
    P2TR,
}

impl ScriptType {
    /// 手数料見積もり用の分類。未対応のスクリプトは `None`。
    pub fn classify(script: &ScriptBuf) -> Option<Self> {
        if script.is_p2pkh() {
            Some(ScriptType::P2PKH)
        } else if script.is_p2sh() {
            // 中身の分からない P2SH もネストされた P2WPKH の重みで見積もる。
            // 出力サイズは redeem script によらず同じで、入力はウォレットが扱う唯一の P2SH の形
            Some(ScriptType::P2SH_P2WPKH)
        } else if script.is_p2wpkh() {
            Some(ScriptType::P2WPKH)
        } else if script.is_p2wsh() {
            Some(ScriptType::P2WSH)
        } else if script.is_p2tr() {
            Some(ScriptType::P2TR)
        } else {
            None
        }
    }

    pub fn from_script_buf(script: &ScriptBuf) -> Result<Self, SendError> {
        Self::classify(script).ok_or_else(|| SendError::UnknownScriptType {
            script_hex: script.to_hex_string(),
        })
    }

    pub fn from_address(address: &Address) -> Option<Self> {
        match address.address_type()? {
            AddressType::P2pkh => Some(ScriptType::P2PKH),
            // 出力としては P2SH の種類によらず 32 vB
            AddressType::P2sh => Some(ScriptType::P2SH_P2WPKH),
            AddressType::P2wpkh => Some(ScriptType::P2WPKH),
            AddressType::P2wsh => Some(ScriptType::P2WSH),
            AddressType::P2tr => Some(ScriptType::P2TR),
            _ => None,
        }
    }

    /// 署名済み入力1つあたりの仮想サイズ (vB)。
    pub fn input_vbytes(self) -> u64 {
        match self {
            ScriptType::P2PKH => 148,
            ScriptType::P2SH_P2WPKH => 91,
            ScriptType::P2WPKH => 68,
            // フィデリティボンドのタイムロックスクリプトを想定
            ScriptType::P2WSH => 114,
            ScriptType::P2TR => 58,
        }
    }

    pub fn output_vbytes(self) -> u64 {
        match self {
            ScriptType::P2PKH => 34,
            ScriptType::P2SH_P2WPKH => 32,
            ScriptType::P2WPKH => 31,
            ScriptType::P2WSH | ScriptType::P2TR => 43,
        }
    }

    /// 種類が分からない入力に使う最も大きい見積もり。
    pub const LARGEST_INPUT: ScriptType = ScriptType::P2PKH;
    /// 種類が分からない出力に使う最も大きい見積もり。
    pub const LARGEST_OUTPUT: ScriptType = ScriptType::P2WSH;
}

/// 外部のUTXOプロバイダから受け取る入力候補。パイプラインは変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInput {
    pub out_point: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
    pub path: DerivationPath,
}

impl CandidateInput {
    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

pub fn total_value(inputs: &[CandidateInput]) -> Amount {
    inputs.iter().map(|i| i.value).sum()
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub destination: String,
    /// 0 はスイープを意味する。負の値は検証で弾かれる。
    pub amount_sats: i64,
}

impl PaymentEntry {
    pub fn new(destination: impl Into<String>, amount_sats: i64) -> Self {
        PaymentEntry {
            destination: destination.into(),
            amount_sats,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRequest {
    pub entries: Vec<PaymentEntry>,
}

impl PaymentRequest {
    pub fn new(entries: Vec<PaymentEntry>) -> Self {
        PaymentRequest { entries }
    }

    pub fn single(destination: impl Into<String>, amount_sats: i64) -> Self {
        Self::new(vec![PaymentEntry::new(destination, amount_sats)])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address(Address),
    /// 資金を証明可能な形で焼却する OP_RETURN 出力
    Burn,
}

impl Destination {
    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            Destination::Address(address) => address.script_pubkey(),
            Destination::Burn => Builder::new().push_opcode(OP_RETURN).into_script(),
        }
    }

    pub fn is_burn(&self) -> bool {
        matches!(self, Destination::Burn)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Address(address) => write!(f, "{}", address),
            Destination::Burn => write!(f, "BURN"),
        }
    }
}

/// 成功時に呼び出し側へ返す形。PSBT と完全なトランザクションを同時に要求することはできない。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputShape {
    #[default]
    Txid,
    FullTransaction,
    /// 署名済みPSBTを返し、ブロードキャストはしない
    FinalPsbt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPolicy {
    pub account: AccountIndex,
    pub auto_confirm: bool,
    pub allow_rbf: bool,
    pub custom_change_address: Option<String>,
    pub change_label: Option<String>,
    pub output_shape: OutputShape,
}

impl SpendPolicy {
    pub fn new(account: AccountIndex) -> Self {
        SpendPolicy {
            account,
            auto_confirm: false,
            allow_rbf: true,
            custom_change_address: None,
            change_label: None,
            output_shape: OutputShape::Txid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub destination: Destination,
    pub value: Amount,
}

impl PlannedOutput {
    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.destination.script_pubkey(),
        }
    }
}

/// 出力計画。スイープ以外では `change_index` がおつり出力を指す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub inputs: Vec<CandidateInput>,
    pub outputs: Vec<PlannedOutput>,
    pub change_index: Option<usize>,
    pub fee: Amount,
}

impl OutputPlan {
    pub fn is_sweep(&self) -> bool {
        self.change_index.is_none()
    }

    pub fn change(&self) -> Option<&PlannedOutput> {
        self.change_index.map(|i| &self.outputs[i])
    }

    pub fn total_input(&self) -> Amount {
        total_value(&self.inputs)
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

#[derive(Debug, Clone)]
pub enum SigningResult {
    Signed(Transaction),
    Partial(Psbt),
    Failed(String),
}

/// 1回の送金呼び出しの最終結果。
#[derive(Debug)]
pub enum Outcome {
    BroadcastId(Txid),
    FullTransaction(Transaction),
    PartialTransaction(Psbt),
    Rejected(SendError),
}

impl Outcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&SendError> {
        match self {
            Outcome::Rejected(err) => Some(err),
            _ => None,
        }
    }
}
