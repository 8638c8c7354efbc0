//! 送金パイプラインが依存する外部コンポーネントのインターフェース。
//!
//! ウォレット、チェーンバックエンドはすべて呼び出し側から明示的に渡される。
//! プロセス全体で共有されるグローバル状態は持たない。

use bitcoin::{bip32::DerivationPath, psbt::Psbt, Address, Amount, Transaction, TxOut};

use crate::error::Result;
use crate::types::{AccountIndex, CandidateInput, Destination, ScriptType};

/// ラベル付けの結果。ウォレット外のアドレスは失敗ではなく `UnknownAddress` になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelResult {
    Labeled,
    UnknownAddress,
}

pub trait WalletService {
    /// アドレス文字列を検証する。無効な場合は理由を返す。
    fn validate_address(&self, address: &str) -> std::result::Result<Address, String>;

    fn is_burn_destination(&self, destination: &str) -> bool;

    /// タイムロック付きUTXOとバーンを扱えるウォレットかどうか。
    fn supports_fidelity_bonds(&self) -> bool;

    /// アカウント内の使用可能なUTXOをすべて返す。毎回最新の状態を問い合わせる。
    fn spendable_inputs(&self, account: AccountIndex) -> Vec<CandidateInput>;

    /// 合計が `min_value` 以上になるようにUTXOを選択する。
    /// 同時実行時の二重使用の回避はこの実装側の責任。
    fn select_inputs(&self, account: AccountIndex, min_value: Amount) -> Result<Vec<CandidateInput>>;

    /// 出力先のスクリプトタイプ。ウォレットが扱えない種類なら `None`。
    fn output_script_type(&self, destination: &Destination) -> Option<ScriptType>;

    /// ウォレット自身が受け取りに使うスクリプトタイプ。
    fn account_script_type(&self) -> ScriptType;

    fn internal_change_address(&self, account: AccountIndex) -> Result<Address>;

    fn is_timelocked_path(&self, path: &DerivationPath) -> bool;

    /// タイムロック付きパスのロック解除時刻 (Unix時刻)。
    fn unlock_time_of(&self, path: &DerivationPath) -> u32;

    fn label_address(&self, address: &Address, label: &str) -> LabelResult;

    /// `spent_outputs[i]` は `tx.input[i]` が使用する出力。
    fn sign_raw(
        &self,
        tx: &mut Transaction,
        spent_outputs: &[TxOut],
    ) -> std::result::Result<(), String>;

    /// 署名済み(ファイナライズ済み)のPSBTを返す。
    fn sign_partial(&self, psbt: Psbt) -> std::result::Result<Psbt, String>;
}

pub trait ChainBackend {
    /// 次のブロックに含められる現在の高さ。
    fn current_height(&self) -> u32;

    /// シリアライズ済みトランザクションをネットワークへ送信する。再試行はしない。
    fn push_tx(&self, raw_tx: &[u8]) -> bool;
}
