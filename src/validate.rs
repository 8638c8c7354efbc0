use bitcoin::{Address, Amount};

use crate::error::{Result, SendError};
use crate::services::WalletService;
use crate::types::{Destination, PaymentRequest, PlannedOutput, SpendPolicy, FIDELITY_BOND_ACCOUNT};

/// 検証済みの送金リクエスト。スイープの場合 `targets` は金額0の1件のみ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub targets: Vec<PlannedOutput>,
    pub is_sweep: bool,
    pub custom_change: Option<Address>,
}

impl ValidatedRequest {
    pub fn total_amount(&self) -> Amount {
        self.targets.iter().map(|t| t.value).sum()
    }

    pub fn primary_destination(&self) -> &Destination {
        &self.targets[0].destination
    }
}

/// コイン選択の前に送金先・金額・バーン条件を検証する。
/// ここで失敗した場合、ウォレットへの問い合わせは一切行われない。
pub fn validate_request(
    wallet: &dyn WalletService,
    request: &PaymentRequest,
    policy: &SpendPolicy,
) -> Result<ValidatedRequest> {
    if request.entries.is_empty() {
        return Err(SendError::InvalidRequest("送金先が指定されていません".to_string()));
    }

    let custom_change = match &policy.custom_change_address {
        Some(addr) => Some(wallet.validate_address(addr).map_err(|e| {
            SendError::InvalidRequest(format!("無効なおつりアドレス ({}): {}", addr, e))
        })?),
        None => None,
    };

    let entry_count = request.entries.len();
    let is_sweep = request.entries.iter().any(|e| e.amount_sats == 0);
    // スイープの形はバーン条件より先に判定する
    if is_sweep {
        if entry_count != 1 {
            return Err(SendError::InvalidRequest(
                "スイープ(金額0)は送金先が1件の場合のみ指定できます".to_string(),
            ));
        }
        if custom_change.is_some() {
            return Err(SendError::InvalidRequest(
                "スイープではおつりアドレスを指定できません".to_string(),
            ));
        }
    }

    let mut targets = Vec::with_capacity(entry_count);
    let mut total = Amount::ZERO;

    for entry in &request.entries {
        let destination = if wallet.is_burn_destination(&entry.destination) {
            Destination::Burn
        } else {
            let address = wallet.validate_address(&entry.destination).map_err(|e| {
                SendError::InvalidRequest(format!("無効な送金先 ({}): {}", entry.destination, e))
            })?;
            Destination::Address(address)
        };

        if entry.amount_sats < 0 {
            return Err(SendError::InvalidRequest(format!(
                "負の金額は指定できません: {} ({})",
                entry.amount_sats, entry.destination
            )));
        }

        let value = Amount::from_sat(entry.amount_sats as u64);
        total = total
            .checked_add(value)
            .filter(|t| *t <= Amount::MAX_MONEY)
            .ok_or_else(|| {
                SendError::InvalidRequest(format!(
                    "送金額の合計がビットコインの総供給量 {} を超えています",
                    Amount::MAX_MONEY
                ))
            })?;

        if destination.is_burn() {
            check_burn_allowed(wallet, policy, entry.amount_sats)?;
        }

        log::debug!("送金先を検証しました: {} ({} sats)", destination, entry.amount_sats);
        targets.push(PlannedOutput { destination, value });
    }

    Ok(ValidatedRequest {
        targets,
        is_sweep,
        custom_change,
    })
}

fn check_burn_allowed(
    wallet: &dyn WalletService,
    policy: &SpendPolicy,
    amount_sats: i64,
) -> Result<()> {
    let reason = if !wallet.supports_fidelity_bonds() {
        "フィデリティボンド対応ウォレットのみコインをバーンできます".to_string()
    } else if policy.auto_confirm {
        "確認なしでのバーンは許可されていません".to_string()
    } else if policy.account != FIDELITY_BOND_ACCOUNT {
        format!(
            "バーンはアカウント {} からのみ可能です",
            FIDELITY_BOND_ACCOUNT
        )
    } else if amount_sats != 0 {
        // トランザクションを小さく保つため。特定のUTXOだけ使う場合はコインコントロールで凍結する
        "バーンはスイープでのみ可能です".to_string()
    } else {
        return Ok(());
    };
    log::error!("{}", reason);
    Err(SendError::BurnNotPermitted(reason))
}
