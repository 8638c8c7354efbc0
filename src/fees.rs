use bitcoin::Amount;

use crate::types::ScriptType;

/// バージョン、ロックタイム、入出力数、segwitマーカー分のサイズ (vB, 切り上げ)。
const TX_OVERHEAD_VBYTES: u64 = 11;

pub trait FeeEstimator {
    /// 入力と出力のスクリプトタイプの並びから手数料を見積もる。
    /// 入力数・出力数はそれぞれのスライスの長さ。
    fn estimate_fee(&self, input_types: &[ScriptType], output_types: &[ScriptType]) -> Amount;
}

#[derive(Debug, Clone, Copy)]
pub struct VsizeFeeEstimator {
    pub fee_rate_sats_per_vb: u64,
}

impl VsizeFeeEstimator {
    pub fn new(fee_rate_sats_per_vb: u64) -> Self {
        VsizeFeeEstimator { fee_rate_sats_per_vb }
    }
}

pub fn estimate_vsize(input_types: &[ScriptType], output_types: &[ScriptType]) -> u64 {
    let inputs: u64 = input_types.iter().map(|t| t.input_vbytes()).sum();
    let outputs: u64 = output_types.iter().map(|t| t.output_vbytes()).sum();
    TX_OVERHEAD_VBYTES + inputs + outputs
}

impl FeeEstimator for VsizeFeeEstimator {
    fn estimate_fee(&self, input_types: &[ScriptType], output_types: &[ScriptType]) -> Amount {
        let vsize = estimate_vsize(input_types, output_types);
        let fee = vsize.saturating_mul(self.fee_rate_sats_per_vb);
        log::debug!(
            "手数料見積もり: 入力 {} 個, 出力 {} 個, 推定vsize {} vB, 手数料率 {} sats/vB -> {} sats",
            input_types.len(),
            output_types.len(),
            vsize,
            self.fee_rate_sats_per_vb,
            fee
        );
        Amount::from_sat(fee)
    }
}
