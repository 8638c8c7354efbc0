use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::SendError;
use crate::types::{AccountIndex, PaymentEntry, PaymentRequest};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub fee_rate_sats_per_vb: u64,
    /// ブロードキャスト先ノードの代わりに使う現在のブロック高
    pub current_height: u32,
    #[serde(default)]
    pub account: AccountIndex,
    pub destinations: Vec<PaymentEntry>,
    #[serde(default)]
    pub custom_change_address: Option<String>,
    #[serde(default)]
    pub change_label: Option<String>,
    /// アカウントごとの内部(おつり)アドレス
    #[serde(default)]
    pub change_addresses: BTreeMap<AccountIndex, String>,
    pub utxos: Vec<UtxoInput>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInput {
    pub txid: String,
    pub vout: u32,
    pub script_pubkey_hex: String,
    pub value_sats: u64,
    pub private_key_wif: String,
    #[serde(default)]
    pub account: AccountIndex,
    /// 例: "m/84'/1'/0'/0/3"。タイムロック付きは "m/84'/1'/0'/2/<index>/<locktime>"
    pub derivation_path: String,
}

// 秘密鍵はログに出さない
impl fmt::Debug for UtxoInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoInput")
            .field("txid", &self.txid)
            .field("vout", &self.vout)
            .field("script_pubkey_hex", &self.script_pubkey_hex)
            .field("value_sats", &self.value_sats)
            .field("private_key_wif", &"<redacted>")
            .field("account", &self.account)
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

impl InputConfig {
    pub fn from_file(path: &Path) -> Result<Self, SendError> {
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("入力ファイルの読み込みに失敗しました: {:?}", path);
            SendError::Io(e)
        })?;
        let config: InputConfig = serde_json::from_str(&content).map_err(|e| {
            log::error!("入力JSONのパースに失敗しました。");
            SendError::JsonParse {
                file_path: path.to_path_buf(),
                source: e,
            }
        })?;
        log::debug!("入力設定ファイルのパース成功: {:?}", config);
        Ok(config)
    }

    pub fn payment_request(&self) -> PaymentRequest {
        PaymentRequest::new(self.destinations.clone())
    }
}
