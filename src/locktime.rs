use bitcoin::absolute::LockTime;
use rand::Rng;

use crate::error::{Result, SendError};
use crate::services::{ChainBackend, WalletService};
use crate::types::{AccountIndex, CandidateInput, FIDELITY_BOND_ACCOUNT};

/// アンチフィースナイピングで高さを戻す最大ブロック数。
const MAX_HEIGHT_BACKOFF: u32 = 99;

/// 現在の高さを基準にしたロックタイム。10回に1回はランダムに過去の高さを使う。
pub fn base_locktime_height<R: Rng>(current_height: u32, rng: &mut R) -> u32 {
    if rng.gen_range(0..10) == 0 {
        let backoff = rng.gen_range(0..=MAX_HEIGHT_BACKOFF);
        current_height.saturating_sub(backoff).max(1)
    } else {
        current_height
    }
}

/// 選択された入力に合わせてトランザクションのロックタイムを決める。
///
/// フィデリティボンド用アカウントからタイムロック付きの入力を使う場合は、
/// 高さではなくUnix時刻で表したロックタイムに切り替える。
/// OP_CHECKLOCKTIMEVERIFY は同じ単位同士でしか比較できないため。
pub fn resolve_locktime<R: Rng>(
    wallet: &dyn WalletService,
    chain: &dyn ChainBackend,
    account: AccountIndex,
    inputs: &[CandidateInput],
    rng: &mut R,
) -> Result<LockTime> {
    let base = base_locktime_height(chain.current_height(), rng);

    let mut max_unlock: Option<u32> = None;
    if account == FIDELITY_BOND_ACCOUNT && wallet.supports_fidelity_bonds() {
        for input in inputs.iter().filter(|i| wallet.is_timelocked_path(&i.path)) {
            let unlock = wallet.unlock_time_of(&input.path);
            log::debug!("タイムロック付き入力 {} (解除時刻 {})", input.out_point, unlock);
            max_unlock = Some(max_unlock.map_or(unlock, |m| m.max(unlock)));
        }
    }

    match max_unlock {
        Some(unlock) => {
            let after_unlock = unlock.checked_add(1).ok_or_else(|| {
                SendError::Internal(format!("解除時刻が範囲外です: {}", unlock))
            })?;
            LockTime::from_time(base.max(after_unlock)).map_err(|e| {
                SendError::Internal(format!("Unix時刻のロックタイムを作成できません: {}", e))
            })
        }
        None => LockTime::from_height(base).map_err(|e| {
            SendError::Internal(format!("高さのロックタイムを作成できません: {}", e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn base_height_never_exceeds_current() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut moved_back = false;
        for _ in 0..1_000 {
            let h = base_locktime_height(800_000, &mut rng);
            assert!(h <= 800_000);
            assert!(h >= 800_000 - MAX_HEIGHT_BACKOFF);
            moved_back |= h < 800_000;
        }
        assert!(moved_back);
    }

    #[test]
    fn base_height_is_floored_at_one() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert!(base_locktime_height(5, &mut rng) >= 1);
        }
    }
}
