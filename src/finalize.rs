//! 署名、確認、ブロードキャスト。
//!
//! 状態遷移:
//! `Assembled -> {PartialExport | SignRequested} -> {Confirmed | Aborted} -> {Broadcast | BroadcastFailed}`

use std::io::{self, BufRead, Write};

use bitcoin::{consensus::encode, psbt::Psbt, Address, Amount, Transaction};

use crate::assemble::AssembledTx;
use crate::error::{Result, SendError};
use crate::services::{ChainBackend, LabelResult, WalletService};
use crate::types::{Destination, OutputShape, SigningResult, SpendPolicy};

/// 確認時に提示する送金内容。
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub human_readable_tx: String,
    pub destination: Destination,
    pub amount: Amount,
    pub fee: Amount,
    pub custom_change: Option<Address>,
}

pub trait ConfirmationProvider {
    /// `true` ならブロードキャストする。呼び出しはブロックしてよい。
    fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// 標準入力で y/n を尋ねる。
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl ConfirmationProvider for ConsolePrompt {
    fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("ネットワークに送信しますか? (y/n): ");
            if io::stdout().flush().is_err() {
                return false;
            }
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return false,
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "y" | "yes" => return true,
                    "n" | "no" => return false,
                    _ => continue,
                },
                Err(e) => {
                    log::error!("確認入力の読み込みに失敗しました: {}", e);
                    return false;
                }
            }
        }
    }
}

/// 任意の述語を確認手段として使う。
pub struct AcceptCallback<F>(pub F);

impl<F> ConfirmationProvider for AcceptCallback<F>
where
    F: Fn(&ConfirmationRequest) -> bool,
{
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        (self.0)(request)
    }
}

/// 確認とラベル付けに必要な送金の要約。
#[derive(Debug, Clone)]
pub struct SendSummary {
    pub destination: Destination,
    pub amount: Amount,
    pub fee: Amount,
    pub custom_change: Option<Address>,
    pub change_address: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Assembled,
    PartialExport,
    SignRequested,
    Confirmed,
    Aborted,
    Broadcast,
    BroadcastFailed,
}

impl FinalizerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FinalizerState::PartialExport
                | FinalizerState::Aborted
                | FinalizerState::Broadcast
                | FinalizerState::BroadcastFailed
        )
    }
}

#[derive(Debug)]
pub enum Finalized {
    Partial(Psbt),
    Broadcast(Transaction),
}

pub struct Finalizer<'a> {
    wallet: &'a dyn WalletService,
    chain: &'a dyn ChainBackend,
    confirmation: &'a dyn ConfirmationProvider,
    state: FinalizerState,
}

impl<'a> Finalizer<'a> {
    pub fn new(
        wallet: &'a dyn WalletService,
        chain: &'a dyn ChainBackend,
        confirmation: &'a dyn ConfirmationProvider,
    ) -> Self {
        Finalizer {
            wallet,
            chain,
            confirmation,
            state: FinalizerState::Assembled,
        }
    }

    pub fn state(&self) -> FinalizerState {
        self.state
    }

    fn transition(&mut self, next: FinalizerState) {
        if next.is_terminal() {
            log::info!("ファイナライザ終了: {:?} -> {:?}", self.state, next);
        } else {
            log::debug!("ファイナライザ状態: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    pub fn run(
        &mut self,
        assembled: &AssembledTx,
        summary: &SendSummary,
        policy: &SpendPolicy,
    ) -> Result<Finalized> {
        if policy.output_shape == OutputShape::FinalPsbt {
            return match self.sign_partial(assembled)? {
                SigningResult::Partial(psbt) => {
                    self.transition(FinalizerState::PartialExport);
                    log::info!("署名済みPSBTを作成しました: {}", psbt.serialize_hex());
                    Ok(Finalized::Partial(psbt))
                }
                SigningResult::Failed(reason) => {
                    log::error!("PSBTの署名に失敗しました。終了します。エラー: {}", reason);
                    Err(SendError::SigningFailed(reason))
                }
                SigningResult::Signed(_) => {
                    Err(SendError::Internal("PSBT署名が完全なトランザクションを返しました".to_string()))
                }
            };
        }

        self.transition(FinalizerState::SignRequested);
        let tx = match self.sign_raw(assembled) {
            SigningResult::Signed(tx) => tx,
            SigningResult::Failed(reason) => {
                log::error!("トランザクションの署名に失敗しました。終了します。エラー: {}", reason);
                return Err(SendError::SigningFailed(reason));
            }
            SigningResult::Partial(_) => {
                return Err(SendError::Internal("署名結果がPSBTでした".to_string()));
            }
        };

        let human_readable_tx =
            serde_json::to_string_pretty(&tx).unwrap_or_else(|_| encode::serialize_hex(&tx));
        log::info!("署名済みトランザクション:\n{}", human_readable_tx);
        let mut sending_info = format!(
            "送金額: {} 送金先: {}",
            summary.amount, summary.destination
        );
        if let Some(change) = &summary.custom_change {
            sending_info.push_str(&format!(", カスタムおつりアドレス: {}", change));
        }
        log::info!("{}", sending_info);

        if !policy.auto_confirm {
            let request = ConfirmationRequest {
                human_readable_tx,
                destination: summary.destination.clone(),
                amount: summary.amount,
                fee: summary.fee,
                custom_change: summary.custom_change.clone(),
            };
            if !self.confirmation.confirm(&request) {
                self.transition(FinalizerState::Aborted);
                log::info!("トランザクションをブロードキャストしないことが選択されました。終了します。");
                return Err(SendError::Aborted);
            }
        }
        self.transition(FinalizerState::Confirmed);

        if let (Some(label), Some(change)) = (&policy.change_label, &summary.change_address) {
            match self.wallet.label_address(change, label) {
                LabelResult::Labeled => log::debug!("おつりアドレス {} にラベルを設定しました", change),
                // ウォレット外のカスタムおつりアドレスでは起こりうる
                LabelResult::UnknownAddress => {
                    log::warn!("おつりアドレス {} はウォレットに存在しないためラベルを設定しません", change)
                }
            }
        }

        if self.chain.push_tx(&encode::serialize(&tx)) {
            self.transition(FinalizerState::Broadcast);
            Ok(Finalized::Broadcast(tx))
        } else {
            self.transition(FinalizerState::BroadcastFailed);
            Err(SendError::BroadcastFailed)
        }
    }

    fn sign_raw(&self, assembled: &AssembledTx) -> SigningResult {
        let mut tx = assembled.tx.clone();
        match self.wallet.sign_raw(&mut tx, &assembled.spent_outputs) {
            Ok(()) => SigningResult::Signed(tx),
            Err(reason) => SigningResult::Failed(reason),
        }
    }

    fn sign_partial(&self, assembled: &AssembledTx) -> Result<SigningResult> {
        let mut psbt = Psbt::from_unsigned_tx(assembled.tx.clone())
            .map_err(|e| SendError::Internal(format!("PSBTの作成に失敗しました: {}", e)))?;
        for (input, spent) in psbt.inputs.iter_mut().zip(&assembled.spent_outputs) {
            input.witness_utxo = Some(spent.clone());
        }
        Ok(match self.wallet.sign_partial(psbt) {
            Ok(psbt) => SigningResult::Partial(psbt),
            Err(reason) => SigningResult::Failed(reason),
        })
    }
}
