use crate::error::{Result, SendError};
use crate::finalize::Finalized;
use crate::types::{Outcome, OutputShape};

/// 情報メッセージとエラーメッセージの出力先。
/// 成否の判断は戻り値だけで行い、メッセージを解析する必要はない。
pub trait Notifier {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// パイプラインの結果を呼び出し側に返す `Outcome` に変換する。
pub fn report(result: Result<Finalized>, shape: OutputShape, notifier: &dyn Notifier) -> Outcome {
    match result {
        Ok(Finalized::Partial(psbt)) => Outcome::PartialTransaction(psbt),
        Ok(Finalized::Broadcast(tx)) => {
            let txid = tx.compute_txid();
            notifier.info(&format!("トランザクションを送信しました: {}", txid));
            match shape {
                OutputShape::FullTransaction => Outcome::FullTransaction(tx),
                OutputShape::Txid | OutputShape::FinalPsbt => Outcome::BroadcastId(txid),
            }
        }
        Err(SendError::Aborted) => {
            notifier.info(&SendError::Aborted.to_string());
            Outcome::Rejected(SendError::Aborted)
        }
        Err(err) => {
            notifier.error(&err.to_string());
            Outcome::Rejected(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{absolute::LockTime, transaction::Version, Transaction};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        info: RefCell<Vec<String>>,
        error: RefCell<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn info(&self, message: &str) {
            self.info.borrow_mut().push(message.to_string());
        }
        fn error(&self, message: &str) {
            self.error.borrow_mut().push(message.to_string());
        }
    }

    fn empty_tx() -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        }
    }

    #[test]
    fn broadcast_reports_txid_by_default() {
        let rec = Recorder::default();
        let tx = empty_tx();
        let txid = tx.compute_txid();
        match report(Ok(Finalized::Broadcast(tx)), OutputShape::Txid, &rec) {
            Outcome::BroadcastId(id) => assert_eq!(id, txid),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(rec.info.borrow().len(), 1);
        assert!(rec.info.borrow()[0].contains(&txid.to_string()));
        assert!(rec.error.borrow().is_empty());
    }

    #[test]
    fn broadcast_can_return_full_transaction() {
        let rec = Recorder::default();
        let outcome = report(Ok(Finalized::Broadcast(empty_tx())), OutputShape::FullTransaction, &rec);
        assert!(matches!(outcome, Outcome::FullTransaction(_)));
    }

    #[test]
    fn failures_go_to_error_channel() {
        let rec = Recorder::default();
        let outcome = report(Err(SendError::BroadcastFailed), OutputShape::Txid, &rec);
        assert!(matches!(outcome.rejection(), Some(SendError::BroadcastFailed)));
        assert_eq!(rec.error.borrow().len(), 1);
        assert!(rec.info.borrow().is_empty());
    }

    #[test]
    fn abort_is_rejected_but_not_an_error_message() {
        let rec = Recorder::default();
        let outcome = report(Err(SendError::Aborted), OutputShape::Txid, &rec);
        assert!(outcome.is_rejected());
        assert!(rec.error.borrow().is_empty());
    }
}
