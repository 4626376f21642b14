#![allow(unused)]

use std::{cell::Cell, collections::HashMap, rc::Rc};

use anyhow::{anyhow, bail};
use log::debug;
use secp256k1::{ecdsa, Message, PublicKey as SecpPublic, Secp256k1, SecretKey};
use sha2::{Digest as _, Sha256};

use ledger_utxo_core::{
    apdu::prelude::*,
    coins::CoinInfo,
    engine::{Driver, Engine, Error, Event, Node, Report, ReportOutput, State},
    scripts::hash160,
    signer::{sign_tx, Approver, Host},
};

/// Wallet seed used by the [TestDriver]
pub const SEED: [u8; 32] = [0x42; 32];

pub const H: u32 = HARDENED;

pub fn init_log() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Deterministic key derivation for test use (not BIP32)
pub fn secret_key(path: &[u32]) -> SecretKey {
    let mut h = Sha256::new();
    h.update(SEED);
    for p in path {
        h.update(p.to_le_bytes());
    }
    SecretKey::from_slice(&h.finalize()).unwrap()
}

pub fn pubkey(path: &[u32]) -> PublicKey {
    let secp = Secp256k1::signing_only();
    SecpPublic::from_secret_key(&secp, &secret_key(path)).serialize()
}

/// Driver implementation for test use, counting signing operations
#[derive(Clone, Default)]
pub struct TestDriver {
    pub signs: Rc<Cell<usize>>,
}

impl Driver for TestDriver {
    fn derive_node(&self, path: &[u32]) -> Result<Node, Error> {
        let sk = secret_key(path);

        Ok(Node {
            public_key: pubkey(path),
            chain_code: Sha256::digest(sk.secret_bytes()).into(),
            private_key: sk.secret_bytes(),
        })
    }

    fn sign(&self, node: &Node, digest: &[u8; 32]) -> Result<Signature, Error> {
        self.signs.set(self.signs.get() + 1);

        let secp = Secp256k1::signing_only();
        let sk = SecretKey::from_slice(&node.private_key).map_err(|_| Error::SignError)?;
        let msg = Message::from_digest_slice(digest).map_err(|_| Error::SignError)?;

        let sig = secp.sign_ecdsa(&msg, &sk).serialize_der();
        Signature::from_slice(&sig).map_err(|_| Error::SignError)
    }
}

/// Verify a DER signature over a digest
pub fn verify(pubkey: &PublicKey, digest: &[u8; 32], der: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();
    let pk = SecpPublic::from_slice(pubkey).unwrap();
    let sig = ecdsa::Signature::from_der(der).unwrap();
    let msg = Message::from_digest_slice(digest).unwrap();

    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

pub fn sha256d(b: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(b)).into()
}

pub fn varint(b: &mut Vec<u8>, v: u64) {
    match v {
        0..=0xfc => b.push(v as u8),
        0xfd..=0xffff => {
            b.push(0xfd);
            b.extend_from_slice(&(v as u16).to_le_bytes());
        }
        _ => {
            b.push(0xfe);
            b.extend_from_slice(&(v as u32).to_le_bytes());
        }
    }
}

pub fn prefixed(b: &mut Vec<u8>, data: &[u8]) {
    varint(b, data.len() as u64);
    b.extend_from_slice(data);
}

pub fn outpoint(b: &mut Vec<u8>, prev_hash: &[u8; 32], prev_index: u32) {
    let mut h = *prev_hash;
    h.reverse();
    b.extend_from_slice(&h);
    b.extend_from_slice(&prev_index.to_le_bytes());
}

pub fn p2pkh(pubkey: &PublicKey) -> Vec<u8> {
    let mut s = vec![0x76, 0xa9, 0x14];
    s.extend_from_slice(&hash160(pubkey));
    s.extend_from_slice(&[0x88, 0xac]);
    s
}

pub fn p2wpkh(pubkey: &PublicKey) -> Vec<u8> {
    let mut s = vec![0x00, 0x14];
    s.extend_from_slice(&hash160(pubkey));
    s
}

pub fn p2sh(script: &[u8]) -> Vec<u8> {
    let mut s = vec![0xa9, 0x14];
    s.extend_from_slice(&hash160(script));
    s.push(0x87);
    s
}

/// Bare multisig redeem script
pub fn redeem_script(m: u8, keys: &[PublicKey]) -> Vec<u8> {
    let mut s = vec![0x50 + m];
    for k in keys {
        s.push(33);
        s.extend_from_slice(k);
    }
    s.push(0x50 + keys.len() as u8);
    s.push(0xae);
    s
}

/// Spendable wallet path for the provided purpose and coin
pub fn path(purpose: u32, coin: u32, chain: u32, index: u32) -> [u32; 5] {
    [purpose | H, coin | H, H, chain, index]
}

pub fn input(
    prev_hash: [u8; 32],
    prev_index: u32,
    amount: u64,
    address_n: &[u32],
    script_type: ScriptType,
) -> InputDescriptor {
    InputDescriptor {
        prev_hash,
        prev_index,
        amount,
        sequence: 0xffff_fffd,
        script_type,
        address_n: DerivationPath::from_slice(address_n).unwrap(),
        multisig: None,
        sighash: None,
    }
}

/// Prior transaction, for legacy input verification
#[derive(Clone, Debug)]
pub struct PrevTx {
    pub meta: PrevTxMeta,
    pub inputs: Vec<PrevInput>,
    pub outputs: Vec<PrevOutput>,
    pub extra: Vec<u8>,
}

impl PrevTx {
    /// Create a prior transaction funding the provided outputs
    pub fn funding(outputs: &[(u64, Vec<u8>)]) -> Self {
        let inputs = vec![PrevInput {
            prev_hash: [0xa5; 32],
            prev_index: 3,
            sequence: 0xffff_ffff,
            script_sig: heapless::Vec::from_slice(&[0x51; 107]).unwrap(),
        }];

        let outputs: Vec<_> = outputs
            .iter()
            .map(|(amount, script)| PrevOutput {
                amount: *amount,
                script_pubkey: Script::from_slice(script).unwrap(),
            })
            .collect();

        Self {
            meta: PrevTxMeta::new(1, 0, inputs.len() as u32, outputs.len() as u32),
            inputs,
            outputs,
            extra: vec![],
        }
    }

    /// Reference transaction id (display order)
    pub fn txid(&self) -> [u8; 32] {
        let mut b = vec![];

        b.extend_from_slice(&self.meta.version.to_le_bytes());
        varint(&mut b, self.inputs.len() as u64);
        for i in &self.inputs {
            outpoint(&mut b, &i.prev_hash, i.prev_index);
            prefixed(&mut b, &i.script_sig);
            b.extend_from_slice(&i.sequence.to_le_bytes());
        }
        varint(&mut b, self.outputs.len() as u64);
        for o in &self.outputs {
            b.extend_from_slice(&o.amount.to_le_bytes());
            prefixed(&mut b, &o.script_pubkey);
        }
        b.extend_from_slice(&self.meta.lock_time.to_le_bytes());
        b.extend_from_slice(&self.extra);

        let mut h = sha256d(&b);
        h.reverse();
        h
    }
}

/// Transaction to be signed, held by the host
#[derive(Clone, Debug)]
pub struct TestTx {
    pub meta: TransactionMeta,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    pub prev: Vec<PrevTx>,
}

impl TestTx {
    pub fn new(coin_name: &str, inputs: Vec<InputDescriptor>, outputs: Vec<OutputDescriptor>) -> Self {
        let meta = TransactionMeta::new(
            coin_name,
            2,
            0,
            inputs.len() as u32,
            outputs.len() as u32,
        )
        .unwrap();

        Self {
            meta,
            inputs,
            outputs,
            prev: vec![],
        }
    }

    fn prev_tx(&self, hash: &[u8; 32]) -> anyhow::Result<&PrevTx> {
        self.prev
            .iter()
            .find(|p| &p.txid() == hash)
            .ok_or_else(|| anyhow!("unknown prior tx {:02x?}", hash))
    }

    /// Resolve the event answering a request
    pub fn event(&self, req: &TxRequest) -> anyhow::Result<Event> {
        let i = req.index as usize;

        let evt = match (req.request_type, req.tx_hash) {
            (RequestType::Input, None) => Event::TxInput(self.inputs[i].clone()),
            (RequestType::Output, None) => Event::TxOutput(self.outputs[i].clone()),
            (RequestType::Meta, Some(h)) => Event::PrevMeta(self.prev_tx(&h)?.meta.clone()),
            (RequestType::Input, Some(h)) => Event::PrevInput(self.prev_tx(&h)?.inputs[i].clone()),
            (RequestType::Output, Some(h)) => {
                Event::PrevOutput(self.prev_tx(&h)?.outputs[i].clone())
            }
            (RequestType::ExtraData, Some(h)) => {
                let p = self.prev_tx(&h)?;
                let start = req.extra_data_offset as usize;
                let end = start + req.extra_data_len as usize;

                Event::PrevExtraData(PrevExtraData {
                    chunk: heapless::Vec::from_slice(&p.extra[start..end]).unwrap(),
                })
            }
            _ => bail!("unexpected request: {:?}", req),
        };

        Ok(evt)
    }

    /// Reference output scripts
    pub fn output_scripts(&self) -> Vec<Vec<u8>> {
        self.outputs
            .iter()
            .map(|o| match &o.target {
                OutputTarget::Script(s) => s.to_vec(),
                OutputTarget::OpReturn(d) => {
                    let mut s = vec![0x6a, d.len() as u8];
                    s.extend_from_slice(d);
                    s
                }
                OutputTarget::Path(p) => {
                    let pk = pubkey(p);
                    match o.script_type {
                        ScriptType::Legacy => p2pkh(&pk),
                        ScriptType::P2shSegwit => p2sh(&p2wpkh(&pk)),
                        ScriptType::NativeSegwit => p2wpkh(&pk),
                    }
                }
            })
            .collect()
    }

    fn write_outputs(&self, b: &mut Vec<u8>) {
        for (o, s) in self.outputs.iter().zip(self.output_scripts()) {
            b.extend_from_slice(&o.amount.to_le_bytes());
            prefixed(b, &s);
        }
    }

    /// Reference BIP143 digest for input `n`
    pub fn bip143_digest(&self, n: usize, script_code: &[u8], sighash: u32) -> [u8; 32] {
        let mut prevouts = vec![];
        let mut sequences = vec![];
        for i in &self.inputs {
            outpoint(&mut prevouts, &i.prev_hash, i.prev_index);
            sequences.extend_from_slice(&i.sequence.to_le_bytes());
        }
        let mut outputs = vec![];
        self.write_outputs(&mut outputs);

        let i = &self.inputs[n];

        let mut b = vec![];
        b.extend_from_slice(&self.meta.version.to_le_bytes());
        b.extend_from_slice(&sha256d(&prevouts));
        b.extend_from_slice(&sha256d(&sequences));
        outpoint(&mut b, &i.prev_hash, i.prev_index);
        prefixed(&mut b, script_code);
        b.extend_from_slice(&i.amount.to_le_bytes());
        b.extend_from_slice(&i.sequence.to_le_bytes());
        b.extend_from_slice(&sha256d(&outputs));
        b.extend_from_slice(&self.meta.lock_time.to_le_bytes());
        b.extend_from_slice(&sighash.to_le_bytes());

        sha256d(&b)
    }

    /// Reference legacy digest for input `n`
    pub fn legacy_digest(&self, n: usize, script_code: &[u8], sighash: u32) -> [u8; 32] {
        let mut b = vec![];
        b.extend_from_slice(&self.meta.version.to_le_bytes());
        varint(&mut b, self.inputs.len() as u64);
        for (k, i) in self.inputs.iter().enumerate() {
            outpoint(&mut b, &i.prev_hash, i.prev_index);
            match k == n {
                true => prefixed(&mut b, script_code),
                false => prefixed(&mut b, &[]),
            }
            b.extend_from_slice(&i.sequence.to_le_bytes());
        }
        varint(&mut b, self.outputs.len() as u64);
        self.write_outputs(&mut b);
        b.extend_from_slice(&self.meta.lock_time.to_le_bytes());
        b.extend_from_slice(&sighash.to_le_bytes());

        sha256d(&b)
    }

    /// Reference serialization with the provided script_sigs and witnesses
    pub fn serialize(&self, script_sigs: &[Vec<u8>], witnesses: Option<&[Vec<u8>]>) -> Vec<u8> {
        let mut b = vec![];
        b.extend_from_slice(&self.meta.version.to_le_bytes());
        if witnesses.is_some() {
            b.extend_from_slice(&[0x00, 0x01]);
        }
        varint(&mut b, self.inputs.len() as u64);
        for (i, s) in self.inputs.iter().zip(script_sigs) {
            outpoint(&mut b, &i.prev_hash, i.prev_index);
            prefixed(&mut b, s);
            b.extend_from_slice(&i.sequence.to_le_bytes());
        }
        varint(&mut b, self.outputs.len() as u64);
        self.write_outputs(&mut b);
        if let Some(w) = witnesses {
            for v in w {
                b.extend_from_slice(v);
            }
        }
        b.extend_from_slice(&self.meta.lock_time.to_le_bytes());
        b
    }
}

/// Hook to modify host responses, called with the request, the number
/// of prior requests for the same item, and the event to be returned
pub type Tamper = Box<dyn FnMut(&TxRequest, usize, &mut Event)>;

/// Host implementation for test use, collecting serialized data and signatures
pub struct TestHost {
    pub tx: TestTx,
    pub serialized: Vec<u8>,
    pub signatures: Vec<(u32, Signature)>,
    pub requests: Vec<TxRequest>,
    pub tamper: Option<Tamper>,
    counts: HashMap<(u8, u32, Option<[u8; 32]>), usize>,
}

impl TestHost {
    pub fn new(tx: TestTx) -> Self {
        Self {
            tx,
            serialized: vec![],
            signatures: vec![],
            requests: vec![],
            tamper: None,
            counts: HashMap::new(),
        }
    }

    fn collect(&mut self, req: &TxRequest) {
        self.serialized.extend_from_slice(&req.serialized_tx);
        if let Some(s) = &req.signature {
            self.signatures.push(s.clone());
        }
        self.requests.push(req.clone());
    }

    /// Count prior transaction requests issued
    pub fn prev_requests(&self) -> usize {
        self.requests.iter().filter(|r| r.tx_hash.is_some()).count()
    }
}

impl Host for TestHost {
    type Error = anyhow::Error;

    fn request(&mut self, req: &TxRequest) -> Result<Event, Self::Error> {
        debug!("request: {:?} {}", req.request_type, req.index);

        self.collect(req);

        let key = (req.request_type as u8, req.index, req.tx_hash);
        let count = self.counts.entry(key).or_insert(0);
        let n = *count;
        *count += 1;

        let mut evt = self.tx.event(req)?;
        if let Some(t) = self.tamper.as_mut() {
            t(req, n, &mut evt);
        }

        Ok(evt)
    }

    fn finish(&mut self, req: &TxRequest) -> Result<(), Self::Error> {
        self.collect(req);
        Ok(())
    }
}

/// Approver recording what was shown, confirming every output
/// and answering totals with `approve`
#[derive(Default)]
pub struct TestApprover {
    pub approve: bool,
    pub outputs: Vec<ReportOutput>,
    pub report: Option<Report>,
}

impl Approver for TestApprover {
    fn confirm_output(&mut self, _coin: &CoinInfo, output: &ReportOutput) -> bool {
        debug!("confirm output {}: {}", output.index, output.amount);
        self.outputs.push(output.clone());
        true
    }

    fn confirm_totals(&mut self, _coin: &CoinInfo, report: &Report) -> bool {
        self.report = Some(report.clone());
        self.approve
    }
}

/// Result of a signing session
pub struct Outcome {
    pub result: Result<(), Error>,
    /// Outputs confirmed, in the order shown
    pub outputs: Vec<ReportOutput>,
    pub report: Option<Report>,
    pub host: TestHost,
    pub signs: usize,
    pub state: State,
}

/// Execute a signing session against a fresh engine
pub fn sign(tx: &TestTx, approve: bool, tamper: Option<Tamper>) -> Outcome {
    let drv = TestDriver::default();
    let signs = drv.signs.clone();
    let mut engine = Engine::new(drv);

    let mut host = TestHost::new(tx.clone());
    host.tamper = tamper;

    let mut approver = TestApprover {
        approve,
        ..Default::default()
    };

    let result = sign_tx(&mut engine, &tx.meta, &mut host, &mut approver);

    Outcome {
        result,
        outputs: approver.outputs,
        report: approver.report,
        host,
        signs: signs.get(),
        state: engine.state(),
    }
}
