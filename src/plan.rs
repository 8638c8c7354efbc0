use bitcoin::Amount;

use crate::error::{Result, SendError};
use crate::fees::FeeEstimator;
use crate::services::WalletService;
use crate::types::{
    total_value, CandidateInput, Destination, OutputPlan, PlannedOutput, ScriptType, SpendPolicy,
};
use crate::validate::ValidatedRequest;

/// 初回の手数料見積もりで想定する入力数。再見積もりがほぼ不要になるよう多めに取る。
pub const CONSERVATIVE_INPUT_COUNT: usize = 8;

// Bitcoin Coreのデフォルトダスト閾値 (P2PKH/P2WPKH出力に対して)
const DUST_THRESHOLD_SATS: u64 = 546;

pub fn plan_outputs(
    wallet: &dyn WalletService,
    fees: &dyn FeeEstimator,
    request: &ValidatedRequest,
    policy: &SpendPolicy,
) -> Result<OutputPlan> {
    if request.is_sweep {
        plan_sweep(wallet, fees, request, policy)
    } else {
        plan_payment(wallet, fees, request, policy)
    }
}

fn input_script_types(inputs: &[CandidateInput]) -> Vec<ScriptType> {
    inputs
        .iter()
        .map(|i| ScriptType::classify(&i.script_pubkey).unwrap_or(ScriptType::LARGEST_INPUT))
        .collect()
}

fn add_fee(amount: Amount, fee: Amount) -> Result<Amount> {
    amount.checked_add(fee).ok_or_else(|| {
        SendError::InvalidRequest(format!("送金額 {} と手数料 {} の合計が範囲外です", amount, fee))
    })
}

fn plan_sweep(
    wallet: &dyn WalletService,
    fees: &dyn FeeEstimator,
    request: &ValidatedRequest,
    policy: &SpendPolicy,
) -> Result<OutputPlan> {
    let destination = request.primary_destination().clone();
    let inputs = wallet.spendable_inputs(policy.account);
    if inputs.is_empty() {
        log::error!("アカウント {} に利用可能なUTXOがありません。終了します。", policy.account);
        return Err(SendError::NoFunds { account: policy.account });
    }

    let total_in = total_value(&inputs);
    // 未対応の出力タイプは最も大きい出力として見積もる
    let out_type = wallet
        .output_script_type(&destination)
        .unwrap_or(ScriptType::LARGEST_OUTPUT);
    let fee = fees.estimate_fee(&input_script_types(&inputs), &[out_type]);

    let value = total_in
        .checked_sub(fee)
        .ok_or(SendError::InsufficientFunds {
            available: total_in,
            required: fee,
            fee,
        })?;
    log::debug!("スイープ: 入力 {} 個, 合計 {}, 手数料 {}", inputs.len(), total_in, fee);

    Ok(OutputPlan {
        inputs,
        outputs: vec![PlannedOutput { destination, value }],
        change_index: None,
        fee,
    })
}

fn plan_payment(
    wallet: &dyn WalletService,
    fees: &dyn FeeEstimator,
    request: &ValidatedRequest,
    policy: &SpendPolicy,
) -> Result<OutputPlan> {
    let account_type = wallet.account_script_type();
    let change_type = match &request.custom_change {
        // 認識できないタイプなら不正確でもウォレットのタイプに戻す
        Some(addr) => wallet
            .output_script_type(&Destination::Address(addr.clone()))
            .unwrap_or(account_type),
        None => account_type,
    };

    let mut out_types: Vec<ScriptType> = request
        .targets
        .iter()
        .map(|t| wallet.output_script_type(&t.destination).unwrap_or(change_type))
        .collect();
    out_types.push(change_type);

    let total_requested = request.total_amount();
    let conservative_fee =
        fees.estimate_fee(&[account_type; CONSERVATIVE_INPUT_COUNT], &out_types);
    let target = add_fee(total_requested, conservative_fee)?;
    let inputs = wallet.select_inputs(policy.account, target)?;

    // 選択された入力が想定より少なければ実際の入力で見積もり直す (通常は安くなる)
    let fee = if inputs.len() < CONSERVATIVE_INPUT_COUNT {
        fees.estimate_fee(&input_script_types(&inputs), &out_types)
    } else {
        conservative_fee
    };

    let total_in = total_value(&inputs);
    let required = add_fee(total_requested, fee)?;
    let change_value = total_in
        .checked_sub(required)
        .ok_or(SendError::InsufficientFunds {
            available: total_in,
            required,
            fee,
        })?;
    if change_value.to_sat() < DUST_THRESHOLD_SATS {
        log::warn!(
            "おつり {} はダスト閾値 {} sats 未満です。",
            change_value,
            DUST_THRESHOLD_SATS
        );
    }

    let change_address = match &request.custom_change {
        Some(addr) => addr.clone(),
        None => wallet.internal_change_address(policy.account)?,
    };
    log::debug!("おつり発生: {}, おつりアドレス: {}", change_value, change_address);

    let mut outputs = request.targets.clone();
    outputs.push(PlannedOutput {
        destination: Destination::Address(change_address),
        value: change_value,
    });
    let change_index = Some(outputs.len() - 1);

    Ok(OutputPlan {
        inputs,
        outputs,
        change_index,
        fee,
    })
}
