use std::fs;

use clap::Parser;
use direct_send::{
    cli::{parse_network, CliArgs},
    config::InputConfig,
    direct_send,
    file_wallet::{FileBroadcaster, FileWallet},
    Outcome, SendContext, SendError, SpendPolicy, VsizeFeeEstimator,
};

fn main() -> Result<(), SendError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    let cli_network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", cli_network);

    let config = InputConfig::from_file(&args.input_file)?;
    let wallet = FileWallet::from_config(&config, cli_network)?;
    let chain = FileBroadcaster::new(config.current_height, args.output_file.clone());
    let fees = VsizeFeeEstimator::new(config.fee_rate_sats_per_vb);
    let ctx = SendContext::new(&wallet, &chain, &fees);

    let policy = SpendPolicy {
        account: config.account,
        auto_confirm: args.yes,
        allow_rbf: !args.no_rbf,
        custom_change_address: config.custom_change_address.clone(),
        change_label: config.change_label.clone(),
        output_shape: args.output_shape(),
    };

    match direct_send(&ctx, &config.payment_request(), &policy, &mut rand::thread_rng()) {
        Outcome::BroadcastId(txid) => println!("{}", txid),
        Outcome::FullTransaction(tx) => {
            let json = serde_json::to_string_pretty(&tx)
                .map_err(|e| SendError::Internal(format!("トランザクションのJSON変換に失敗: {}", e)))?;
            println!("{}", json);
        }
        Outcome::PartialTransaction(psbt) => {
            let psbt_hex = psbt.serialize_hex();
            println!("{}", psbt_hex);
            fs::write(&args.output_file, psbt_hex.as_bytes()).map_err(|e| {
                log::error!("出力ファイルの作成に失敗しました: {:?}", args.output_file);
                SendError::Io(e)
            })?;
            log::info!("PSBTを {:?} に保存しました。", args.output_file);
        }
        Outcome::Rejected(err) => return Err(err),
    }

    log::info!("処理が正常に完了しました。");
    Ok(())
}
