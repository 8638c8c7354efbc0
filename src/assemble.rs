use bitcoin::{
    absolute::LockTime, transaction::Version, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::OutputPlan;

/// 未署名のトランザクションと、各入力が使用する出力 (入力と同じ順序)。
#[derive(Debug, Clone)]
pub struct AssembledTx {
    pub tx: Transaction,
    pub spent_outputs: Vec<TxOut>,
}

pub fn input_sequence(allow_rbf: bool) -> Sequence {
    if allow_rbf {
        // 0xffffffff - 2: RBFを有効にしつつロックタイムも有効
        Sequence::ENABLE_RBF_NO_LOCKTIME
    } else {
        Sequence::ENABLE_LOCKTIME_NO_RBF
    }
}

/// 入出力の順序をランダムにして未署名のトランザクションを組み立てる。
pub fn assemble_transaction<R: Rng>(
    plan: &OutputPlan,
    lock_time: LockTime,
    allow_rbf: bool,
    rng: &mut R,
) -> AssembledTx {
    let mut inputs = plan.inputs.clone();
    inputs.shuffle(rng);

    let mut outputs: Vec<TxOut> = plan.outputs.iter().map(|o| o.tx_out()).collect();
    if !plan.is_sweep() {
        outputs.shuffle(rng);
    }

    let sequence = input_sequence(allow_rbf);
    let tx = Transaction {
        version: Version::TWO,
        lock_time,
        input: inputs
            .iter()
            .map(|i| TxIn {
                previous_output: i.out_point,
                script_sig: ScriptBuf::new(), // 署名前は空
                sequence,
                witness: Witness::new(), // 署名前は空
            })
            .collect(),
        output: outputs,
    };
    log::debug!(
        "未署名トランザクションを構築しました: 入力 {} 個, 出力 {} 個, locktime {}",
        tx.input.len(),
        tx.output.len(),
        tx.lock_time
    );

    AssembledTx {
        spent_outputs: inputs.iter().map(|i| i.tx_out()).collect(),
        tx,
    }
}
