//! 1つのアカウントからオンチェーンで直接送金するためのパイプライン。
//!
//! 検証 -> 出力計画 -> ロックタイム決定 -> 組み立て -> 署名/確認/ブロードキャスト -> 結果報告
//! の順に1回だけ実行し、失敗はすべて `Outcome::Rejected` として返す。自動再試行はしない。

pub mod assemble;
pub mod cli;
pub mod config;
pub mod error;
pub mod fees;
pub mod file_wallet;
pub mod finalize;
pub mod locktime;
pub mod outcome;
pub mod plan;
pub mod services;
pub mod transaction;
pub mod types;
pub mod validate;

use rand::Rng;

pub use error::{Result, SendError};
pub use fees::{FeeEstimator, VsizeFeeEstimator};
pub use finalize::{AcceptCallback, ConfirmationProvider, ConfirmationRequest, ConsolePrompt};
pub use outcome::{LogNotifier, Notifier};
pub use services::{ChainBackend, LabelResult, WalletService};
pub use types::{
    AccountIndex, CandidateInput, Destination, Outcome, OutputShape, PaymentEntry, PaymentRequest, ScriptType,
    SpendPolicy, FIDELITY_BOND_ACCOUNT,
};

use finalize::{Finalized, Finalizer, SendSummary};
use validate::ValidatedRequest;

/// 送金に使う外部コンポーネント一式。
pub struct SendContext<'a> {
    pub wallet: &'a dyn WalletService,
    pub chain: &'a dyn ChainBackend,
    pub fees: &'a dyn FeeEstimator,
    confirmation: Option<&'a dyn ConfirmationProvider>,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> SendContext<'a> {
    pub fn new(
        wallet: &'a dyn WalletService,
        chain: &'a dyn ChainBackend,
        fees: &'a dyn FeeEstimator,
    ) -> Self {
        SendContext {
            wallet,
            chain,
            fees,
            confirmation: None,
            notifier: None,
        }
    }

    /// 指定しない場合はコンソールで確認する。
    pub fn with_confirmation(mut self, confirmation: &'a dyn ConfirmationProvider) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// 指定しない場合は `log` に出力する。
    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// 送金を1回実行して結果を返す。
pub fn direct_send<R: Rng>(
    ctx: &SendContext<'_>,
    request: &PaymentRequest,
    policy: &SpendPolicy,
    rng: &mut R,
) -> Outcome {
    let result = run_pipeline(ctx, request, policy, rng);
    match ctx.notifier {
        Some(notifier) => outcome::report(result, policy.output_shape, notifier),
        None => outcome::report(result, policy.output_shape, &LogNotifier),
    }
}

fn run_pipeline<R: Rng>(
    ctx: &SendContext<'_>,
    request: &PaymentRequest,
    policy: &SpendPolicy,
    rng: &mut R,
) -> Result<Finalized> {
    let validated = validate::validate_request(ctx.wallet, request, policy)?;
    let plan = plan::plan_outputs(ctx.wallet, ctx.fees, &validated, policy)?;
    let lock_time =
        locktime::resolve_locktime(ctx.wallet, ctx.chain, policy.account, &plan.inputs, rng)?;

    log::info!("手数料: {}", plan.fee);
    if let Some(change) = plan.change() {
        log::info!("おつり: {}", change.value);
    }
    let assembled = assemble::assemble_transaction(&plan, lock_time, policy.allow_rbf, rng);

    let summary = summarize(&validated, &plan);
    let console = ConsolePrompt;
    let confirmation: &dyn ConfirmationProvider = match ctx.confirmation {
        Some(confirmation) => confirmation,
        None => &console,
    };
    Finalizer::new(ctx.wallet, ctx.chain, confirmation).run(&assembled, &summary, policy)
}

fn summarize(request: &ValidatedRequest, plan: &types::OutputPlan) -> SendSummary {
    // スイープでは手数料を引いた額が実際の送金額
    let amount = if plan.is_sweep() {
        plan.outputs[0].value
    } else {
        request.total_amount()
    };
    let change_address = plan.change().and_then(|c| match &c.destination {
        Destination::Address(addr) => Some(addr.clone()),
        Destination::Burn => None,
    });
    SendSummary {
        destination: request.primary_destination().clone(),
        amount,
        fee: plan.fee,
        custom_change: request.custom_change.clone(),
        change_address,
    }
}
