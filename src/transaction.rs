use std::collections::HashMap;

use bitcoin::{
    ecdsa,
    hashes::Hash,
    psbt::Psbt,
    script::PushBytesBuf,
    secp256k1::{All, Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    PrivateKey, PublicKey, ScriptBuf, Transaction, TxOut, Witness,
};

use crate::{
    error::SendError,
    types::ScriptType,
};

// 署名に必要な情報を一時的に保持するための構造体
struct SigningInfo {
    input_index: usize,
    sighash_message: Message,
    private_key: PrivateKey,
    public_key: PublicKey,
    script_type: ScriptType,
}

/// scriptPubKey から秘密鍵を引いて P2PKH / P2WPKH の入力に署名する。
pub struct LocalSigner {
    secp: Secp256k1<All>,
    keys: HashMap<ScriptBuf, PrivateKey>,
}

impl Default for LocalSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSigner {
    pub fn new() -> Self {
        LocalSigner {
            secp: Secp256k1::new(),
            keys: HashMap::new(),
        }
    }

    /// 秘密鍵を登録する。鍵が scriptPubKey に対応していなければエラー。
    pub fn add_key(&mut self, script_pubkey: ScriptBuf, private_key: PrivateKey) -> Result<(), SendError> {
        let public_key = private_key.public_key(&self.secp);
        let matches = match ScriptType::from_script_buf(&script_pubkey)? {
            ScriptType::P2PKH => ScriptBuf::new_p2pkh(&public_key.pubkey_hash()) == script_pubkey,
            ScriptType::P2WPKH => public_key
                .wpubkey_hash()
                .map(|h| ScriptBuf::new_p2wpkh(&h) == script_pubkey)
                .unwrap_or(false),
            other => {
                return Err(SendError::SigningFailed(format!(
                    "未対応のスクリプトタイプです: {:?}",
                    other
                )));
            }
        };
        if !matches {
            return Err(SendError::SigningFailed(format!(
                "秘密鍵がscriptPubKeyに対応していません: {}",
                script_pubkey.to_hex_string()
            )));
        }
        self.keys.insert(script_pubkey, private_key);
        Ok(())
    }

    /// `spent_outputs[i]` を使う `tx.input[i]` すべてに署名し、scriptSig / witness を設定する。
    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        spent_outputs: &[TxOut],
    ) -> Result<(), SendError> {
        if tx.input.len() != spent_outputs.len() {
            return Err(SendError::SigningFailed(format!(
                "入力数 {} と使用する出力の数 {} が一致しません",
                tx.input.len(),
                spent_outputs.len()
            )));
        }
        log::info!("トランザクション署名処理を開始します。");
        let mut signing_infos: Vec<SigningInfo> = Vec::new();

        // 1. 署名ハッシュ計算フェーズ
        {
            let mut sighash_cache = SighashCache::new(&*tx);

            for (input_index, spent) in spent_outputs.iter().enumerate() {
                let private_key = self.keys.get(&spent.script_pubkey).ok_or_else(|| {
                    SendError::SigningFailed(format!(
                        "入力 {} の秘密鍵が見つかりません: {}",
                        input_index,
                        spent.script_pubkey.to_hex_string()
                    ))
                })?;
                let script_type = ScriptType::from_script_buf(&spent.script_pubkey)?;
                let sighash_type = EcdsaSighashType::All;

                let digest = match script_type {
                    ScriptType::P2PKH => sighash_cache
                        .legacy_signature_hash(input_index, &spent.script_pubkey, sighash_type.to_u32())
                        .map_err(|e| {
                            SendError::SigningFailed(format!("Sighash計算エラー (入力インデックス {}): {}", input_index, e))
                        })?
                        .to_byte_array(),
                    ScriptType::P2WPKH => sighash_cache
                        .p2wpkh_signature_hash(input_index, &spent.script_pubkey, spent.value, sighash_type)
                        .map_err(|e| {
                            SendError::SigningFailed(format!("Sighash計算エラー (入力インデックス {}): {}", input_index, e))
                        })?
                        .to_byte_array(),
                    _ => {
                        return Err(SendError::UnknownScriptType {
                            script_hex: spent.script_pubkey.to_hex_string(),
                        });
                    }
                };
                log::debug!("入力 {} の署名ハッシュ計算が完了しました。", input_index);

                signing_infos.push(SigningInfo {
                    input_index,
                    sighash_message: Message::from_digest(digest),
                    private_key: *private_key,
                    public_key: private_key.public_key(&self.secp),
                    script_type,
                });
            }
        } // ここで sighash_cache が破棄され、transaction の借用が解放される

        // 2. 署名生成と適用フェーズ
        for info in signing_infos {
            let secp_sig = self.secp.sign_ecdsa(&info.sighash_message, &info.private_key.inner);
            let btc_ecdsa_sig = ecdsa::Signature::sighash_all(secp_sig);

            match info.script_type {
                ScriptType::P2PKH => {
                    let push = PushBytesBuf::try_from(btc_ecdsa_sig.to_vec()).map_err(|_| {
                        SendError::Internal(format!("P2PKH署名のPushBytes変換失敗 (input {})", info.input_index))
                    })?;
                    tx.input[info.input_index].script_sig = bitcoin::script::Builder::new()
                        .push_slice(push)
                        .push_key(&info.public_key)
                        .into_script();
                }
                _ => {
                    let mut final_witness = Witness::new();
                    final_witness.push(btc_ecdsa_sig.to_vec());
                    final_witness.push(info.public_key.to_bytes());
                    tx.input[info.input_index].witness = final_witness;
                }
            }
            log::debug!("入力 {} ({:?}) の署名適用完了。", info.input_index, info.script_type);
        }
        log::info!("全ての入力の署名が完了しました。");

        Ok(())
    }

    /// `witness_utxo` を持つPSBTの全入力に署名し、ファイナライズする。
    pub fn sign_psbt(&self, mut psbt: Psbt) -> Result<Psbt, SendError> {
        let spent_outputs = psbt
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                input.witness_utxo.clone().ok_or_else(|| {
                    SendError::SigningFailed(format!("入力 {} に witness_utxo がありません", i))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut signed = psbt.unsigned_tx.clone();
        self.sign_transaction(&mut signed, &spent_outputs)?;

        for (input, txin) in psbt.inputs.iter_mut().zip(signed.input) {
            if !txin.script_sig.is_empty() {
                input.final_script_sig = Some(txin.script_sig);
            }
            if !txin.witness.is_empty() {
                input.final_script_witness = Some(txin.witness);
            }
        }
        Ok(psbt)
    }
}
