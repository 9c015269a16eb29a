//! Key/value workload generation for each benchmark type.
//!
//! Write types stream freshly generated pairs from a dedicated producer
//! through a bounded queue. Read types pre-populate the backend with a fixed
//! key set and then cycle those keys through a ring.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::options::{BenchType, BenchmarkOptions};
use crate::backend::{KvBackend, OpStatus};
use crate::error::{BenchError, Result};

/// Words in a [`WordPool`]
pub const WORD_COUNT: usize = 3000;
/// Bytes per word, a space separator follows each word in a value
pub const WORD_LEN: usize = 7;
/// Generated write operations buffered ahead of the dispatch loop
pub const WRITE_QUEUE_CAPACITY: usize = 100;
/// Candidate keys tried per populated read key, leaves room for duplicates
pub const READ_CANDIDATE_FACTOR: usize = 10;

/// Hex characters taken by the counter suffix of sequential keys
const SEQ_COUNTER_HEX_LEN: usize = 16;

/// Pool of random fixed-length words used to assemble write values
#[derive(Debug, Clone)]
pub struct WordPool {
    words: Vec<[u8; WORD_LEN]>,
}

impl WordPool {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        Self::with_size(WORD_COUNT, rng)
    }

    pub fn with_size<R: Rng>(count: usize, rng: &mut R) -> Self {
        let words = (0..count.max(1))
            .map(|_| {
                let mut word = [0u8; WORD_LEN];
                rng.fill_bytes(&mut word);
                word
            })
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Concatenate random words until exactly `size` bytes are produced
    pub fn fill_value<R: Rng>(&self, size: usize, rng: &mut R) -> Vec<u8> {
        let mut value = Vec::with_capacity(size + WORD_LEN + 1);
        while value.len() < size {
            value.extend_from_slice(&self.words[rng.gen_range(0..self.words.len())]);
            value.push(b' ');
        }
        value.truncate(size);
        value
    }
}

/// Random lowercase hex string of exactly `len` characters
pub fn rand_hex<R: Rng>(len: usize, rng: &mut R) -> String {
    let mut raw = vec![0u8; len.div_ceil(2)];
    rng.fill_bytes(&mut raw);
    let mut s = hex::encode(raw);
    s.truncate(len);
    s
}

/// Key generator for one run
#[derive(Debug, Clone)]
pub enum KeyGen {
    /// Fully random hex keys
    Random { size: usize },
    /// Fixed random prefix followed by a big-endian counter in hex
    Sequential { prefix: String, counter: u64 },
}

impl KeyGen {
    pub fn new<R: Rng>(typ: BenchType, key_size: usize, rng: &mut R) -> Self {
        if typ.is_sequential() {
            KeyGen::Sequential {
                prefix: rand_hex(key_size.saturating_sub(SEQ_COUNTER_HEX_LEN), rng),
                counter: 0,
            }
        } else {
            KeyGen::Random { size: key_size }
        }
    }

    pub fn next_key<R: Rng>(&mut self, rng: &mut R) -> Bytes {
        match self {
            KeyGen::Random { size } => Bytes::from(rand_hex(*size, rng).into_bytes()),
            KeyGen::Sequential { prefix, counter } => {
                *counter += 1;
                let mut key = String::with_capacity(prefix.len() + SEQ_COUNTER_HEX_LEN);
                key.push_str(prefix);
                key.push_str(&hex::encode(counter.to_be_bytes()));
                Bytes::from(key.into_bytes())
            }
        }
    }
}

/// A single unit of work handed to the backend
#[derive(Debug, Clone)]
pub enum Operation {
    Write { key: Bytes, value: Bytes },
    Read { key: Bytes },
}

impl Operation {
    pub fn key(&self) -> &Bytes {
        match self {
            Operation::Write { key, .. } | Operation::Read { key } => key,
        }
    }
}

/// Unbounded lazy sequence of write operations
pub struct WriteGenerator {
    keys: KeyGen,
    value_size: usize,
    words: Arc<WordPool>,
    rng: StdRng,
}

impl WriteGenerator {
    pub fn new(
        typ: BenchType,
        options: &BenchmarkOptions,
        words: Arc<WordPool>,
        mut rng: StdRng,
    ) -> Result<Self> {
        if !typ.is_write() {
            return Err(BenchError::Config(format!(
                "{} is not a write workload",
                typ
            )));
        }

        Ok(Self {
            keys: KeyGen::new(typ, options.key_size, &mut rng),
            value_size: options.value_size,
            words,
            rng,
        })
    }
}

impl Iterator for WriteGenerator {
    type Item = Operation;

    fn next(&mut self) -> Option<Operation> {
        let key = self.keys.next_key(&mut self.rng);
        let value = self.words.fill_value(self.value_size, &mut self.rng);
        Some(Operation::Write {
            key,
            value: Bytes::from(value),
        })
    }
}

/// Write the read population to the backend and return the distinct keys
pub fn populate_read_keys<B: KvBackend + ?Sized, R: Rng>(
    typ: BenchType,
    options: &BenchmarkOptions,
    backend: &B,
    rng: &mut R,
) -> Result<Vec<Bytes>> {
    if !typ.is_read() {
        return Err(BenchError::Config(format!(
            "{} is not a read workload",
            typ
        )));
    }

    let target = options.read_population.max(1);
    let candidates = target.saturating_mul(READ_CANDIDATE_FACTOR);

    let mut keygen = KeyGen::new(typ, options.key_size, rng);
    let mut seen = HashSet::with_capacity(target);
    let mut keys = Vec::with_capacity(target);
    let mut value = vec![0u8; options.value_size];
    let mut failed = 0usize;

    for _ in 0..candidates {
        if keys.len() >= target {
            break;
        }

        let key = keygen.next_key(rng);
        if !seen.insert(key.clone()) {
            continue;
        }

        rng.fill_bytes(&mut value);
        if backend.write(&key, &value) == OpStatus::Err {
            failed += 1;
        }
        keys.push(key);
    }

    if failed > 0 {
        tracing::warn!(
            "{} of {} population writes failed for {}",
            failed,
            keys.len(),
            typ
        );
    }
    tracing::debug!("Populated {} keys for {}", keys.len(), typ);

    Ok(keys)
}

/// Where the dispatch loop pulls its next operation from
pub enum OperationSource {
    /// Fresh pairs from a producer running on the blocking pool
    Write {
        queue: mpsc::Receiver<Operation>,
        producer: JoinHandle<()>,
    },
    /// Fixed key set; every read key is handed back after completion
    Read {
        ring: mpsc::Receiver<Bytes>,
        recycle: mpsc::Sender<Bytes>,
    },
}

impl OperationSource {
    /// Build the source for `typ`, writing the read population first if needed
    pub async fn prepare<B: KvBackend>(
        typ: BenchType,
        options: &BenchmarkOptions,
        backend: Arc<B>,
        words: Arc<WordPool>,
        quit: Arc<AtomicBool>,
    ) -> Result<Self> {
        if typ.is_write() {
            let generator = WriteGenerator::new(typ, options, words, StdRng::from_entropy())?;
            Ok(Self::spawn_writer(generator, quit))
        } else {
            let opts = options.clone();
            let keys = tokio::task::spawn_blocking(move || {
                let mut rng = StdRng::from_entropy();
                populate_read_keys(typ, &opts, backend.as_ref(), &mut rng)
            })
            .await??;
            Ok(Self::from_keys(keys))
        }
    }

    /// Start a producer feeding `generator` into a bounded queue until `quit`
    pub fn spawn_writer<I>(generator: I, quit: Arc<AtomicBool>) -> Self
    where
        I: Iterator<Item = Operation> + Send + 'static,
    {
        let (tx, queue) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let producer = tokio::task::spawn_blocking(move || {
            for op in generator {
                if quit.load(Ordering::Acquire) {
                    break;
                }
                if tx.blocking_send(op).is_err() {
                    break;
                }
            }
        });

        OperationSource::Write { queue, producer }
    }

    /// Ring over a fixed key set, capacity equal to the number of keys
    pub fn from_keys(keys: Vec<Bytes>) -> Self {
        let (recycle, ring) = mpsc::channel(keys.len().max(1));
        for key in keys {
            // Capacity matches the key count, so this never fails
            let _ = recycle.try_send(key);
        }
        OperationSource::Read { ring, recycle }
    }

    /// Next operation, `None` once the source is exhausted
    pub async fn next(&mut self) -> Option<Operation> {
        match self {
            OperationSource::Write { queue, .. } => queue.recv().await,
            OperationSource::Read { ring, .. } => ring.recv().await.map(|key| Operation::Read { key }),
        }
    }

    /// Handle for returning read keys to the ring
    pub fn recycler(&self) -> Option<mpsc::Sender<Bytes>> {
        match self {
            OperationSource::Write { .. } => None,
            OperationSource::Read { recycle, .. } => Some(recycle.clone()),
        }
    }

    /// Stop the producer and wait for it to exit
    pub async fn close(self) {
        if let OperationSource::Write { queue, producer } = self {
            drop(queue);
            if let Err(e) = producer.await {
                tracing::warn!("Workload producer ended abnormally: {}", e);
            }
        }
    }
}
