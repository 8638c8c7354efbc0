use std::path::PathBuf;
use bitcoin::address::ParseError as BitcoinAddressError;
use bitcoin::key::FromWifError as BitcoinKeyError; // WIFデコードエラー用
use bitcoin::Amount;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("リクエスト検証エラー: {0}")]
    InvalidRequest(String),

    #[error("バーンは許可されていません: {0}")]
    BurnNotPermitted(String),

    #[error("アカウント {account} に利用可能なUTXOがありません")]
    NoFunds { account: u32 },

    #[error("資金不足: 利用可能な総額 {available}, 要求額 {required} (手数料 {fee} を含む)")]
    InsufficientFunds {
        available: Amount,
        required: Amount,
        fee: Amount,
    },

    #[error("署名に失敗しました: {0}")]
    SigningFailed(String),

    #[error("トランザクションのブロードキャストに失敗しました")]
    BroadcastFailed,

    #[error("トランザクションのブロードキャストを中止しました")]
    Aborted,

    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bitcoinアドレスエラー: {0}")]
    BitcoinAddress(#[from] BitcoinAddressError),

    #[error("Bitcoin秘密鍵(WIF)処理エラー: {0}")]
    BitcoinKey(#[from] BitcoinKeyError),

    #[error("不明なスクリプトタイプ: {script_hex}")]
    UnknownScriptType { script_hex: String },

    #[error("内部エラー: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SendError>;
