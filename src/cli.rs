use clap::Parser;
use std::path::PathBuf;
use bitcoin::Network as BitcoinNetwork;
use crate::error::SendError;
use crate::types::OutputShape;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// ウォレットのUTXOと送金先を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// ブロードキャストしたraw transaction hex (またはPSBT hex) を保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub output_file: PathBuf,

    /// 使用するネットワーク ("bitcoin", "testnet", "signet", "regtest")
    #[clap(short, long, value_parser, default_value = "testnet")]
    pub network: String,

    /// 確認せずにブロードキャストする
    #[clap(short, long)]
    pub yes: bool,

    /// ブロードキャストせず署名済みPSBTを出力する
    #[clap(long, conflicts_with = "return_tx")]
    pub psbt: bool,

    /// txidの代わりにトランザクション全体をJSONで出力する
    #[clap(long)]
    pub return_tx: bool,

    /// RBF (replace-by-fee) を無効にする
    #[clap(long)]
    pub no_rbf: bool,
}

impl CliArgs {
    pub fn output_shape(&self) -> OutputShape {
        if self.psbt {
            OutputShape::FinalPsbt
        } else if self.return_tx {
            OutputShape::FullTransaction
        } else {
            OutputShape::Txid
        }
    }
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, SendError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        "signet" => Ok(BitcoinNetwork::Signet),
        "regtest" => Ok(BitcoinNetwork::Regtest),
        s => Err(SendError::InvalidRequest(format!("無効なネットワークが指定されました: {}", s))),
    }
}
