//! Compaction scheduler
//!
//! A fixed pool of worker threads pulls chunk ids from one shared cursor.
//! A worker keeps pulling while the chunks belong to the same pair, then
//! merges its private accumulator into the pair's running matrix. The worker
//! whose merge completes the pair's chunk count finalizes and writes it; any
//! other contributor blocks on the pair's written signal before touching the
//! chunk it already claimed for its next pair.
//!
//! Chunk ids of one pair are contiguous and the cursor only moves forward,
//! so the pair a worker waits on never depends on a chunk that worker holds.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use crate::chrom_pairs::{ChromosomePair, ChromosomePairIndex};
use crate::chunk_plan::ChunkPlan;
use crate::config::CompactionConfig;
use crate::error::{CompactError, Result};
use crate::expected::ExpectedValues;
use crate::genome::GenomeCatalog;
use crate::matrix::{MatrixSettings, PairAccumulator};
use crate::pair_source::PairSource;
use crate::shard_writer::{ShardWriter, WrittenPair};
use crate::whole_genome;

/// Shared bookkeeping of one pair
struct PairState {
    pair: ChromosomePair,
    total_chunks: u32,
    /// Whether the pair touches an included chromosome
    included: bool,
    settings: MatrixSettings,
    completed: AtomicU32,
    /// Number of merge events
    contributors: AtomicU32,
    running: Mutex<Option<PairAccumulator>>,
    written: Mutex<bool>,
    written_signal: Condvar,
}

/// What one worker hands back when the pool exits
#[derive(Debug)]
pub struct WorkerOutput {
    pub worker: usize,
    pub expected: ExpectedValues,
    pub whole_genome: PairAccumulator,
    pub chunks: u32,
    pub contacts: u64,
}

#[derive(Debug)]
pub struct SchedulerOutput {
    /// Written pairs in completion order
    pub written: Vec<WrittenPair>,
    /// Per-worker partials in worker order
    pub workers: Vec<WorkerOutput>,
}

impl SchedulerOutput {
    pub fn contacts(&self) -> u64 {
        self.workers.iter().map(|w| w.contacts).sum()
    }

    pub fn chunks(&self) -> u32 {
        self.workers.iter().map(|w| w.chunks).sum()
    }
}

fn lock<'m, T>(mutex: &'m Mutex<T>, what: &str) -> Result<MutexGuard<'m, T>> {
    mutex
        .lock()
        .map_err(|_| CompactError::consistency(format!("{what} lock poisoned")))
}

pub struct CompactionScheduler<'a> {
    config: &'a CompactionConfig,
    catalog: &'a GenomeCatalog,
    plan: &'a ChunkPlan,
    source: &'a dyn PairSource,
    writer: &'a ShardWriter<'a>,
    whole_genome_settings: MatrixSettings,
    /// Indexed by pair id; pairs without chunks have `total_chunks == 0`
    states: Vec<PairState>,
    cursor: AtomicU32,
    abort: AtomicBool,
    contacts: AtomicU64,
    written: Mutex<Vec<WrittenPair>>,
}

impl<'a> CompactionScheduler<'a> {
    pub fn new(
        config: &'a CompactionConfig,
        catalog: &'a GenomeCatalog,
        pairs: &'a ChromosomePairIndex,
        plan: &'a ChunkPlan,
        source: &'a dyn PairSource,
        writer: &'a ShardWriter<'a>,
    ) -> Self {
        let threads = config.threads.max(1) as u32;
        let base = MatrixSettings::from_config(config);
        let states = pairs
            .pairs()
            .iter()
            .map(|pair| {
                let total_chunks = plan.chunks_of(pair.pair_id);
                let share = threads.min(total_chunks).max(1);
                PairState {
                    pair: pair.clone(),
                    total_chunks,
                    included: config.includes_pair(catalog.name(pair.chr1), catalog.name(pair.chr2)),
                    settings: base.with_block_capacity(config.block_capacity / share),
                    completed: AtomicU32::new(0),
                    contributors: AtomicU32::new(0),
                    running: Mutex::new(None),
                    written: Mutex::new(false),
                    written_signal: Condvar::new(),
                }
            })
            .collect();

        CompactionScheduler {
            config,
            catalog,
            plan,
            source,
            writer,
            whole_genome_settings: whole_genome::whole_genome_settings(catalog, config),
            states,
            cursor: AtomicU32::new(0),
            abort: AtomicBool::new(false),
            contacts: AtomicU64::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Run the pool to completion; the first worker error aborts everyone
    pub fn run(self) -> Result<SchedulerOutput> {
        let threads = self.config.threads.max(1);
        info!(
            "Compacting {} chunks of {} pairs with {} worker(s)",
            self.plan.total_chunks(),
            self.plan.pairs().len(),
            threads
        );
        let start = Instant::now();

        let results: Vec<Result<WorkerOutput>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let this = &self;
                    s.spawn(move || {
                        let result = this.run_worker(worker);
                        if result.is_err() {
                            this.abort_all();
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(CompactError::consistency("worker thread panicked")))
                })
                .collect()
        });

        let mut workers = Vec::with_capacity(results.len());
        for result in results {
            workers.push(result?);
        }

        for state in &self.states {
            if state.total_chunks > 0 && !*lock(&state.written, "pair")? {
                return Err(CompactError::consistency(format!(
                    "pair {} finished with {}/{} chunks",
                    state.pair.name,
                    state.completed.load(Ordering::SeqCst),
                    state.total_chunks
                )));
            }
        }

        info!(
            "Compaction pool finished in {:.2}s, {} contacts",
            start.elapsed().as_secs_f64(),
            self.contacts.load(Ordering::Relaxed)
        );
        let written = self
            .written
            .into_inner()
            .map_err(|_| CompactError::consistency("written pairs lock poisoned"))?;
        Ok(SchedulerOutput { written, workers })
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Stop all workers and wake every waiter
    fn abort_all(&self) {
        self.abort.store(true, Ordering::SeqCst);
        for state in &self.states {
            // Taking the lock orders the flag before any waiter's re-check
            let _guard = state.written.lock();
            state.written_signal.notify_all();
        }
    }

    fn run_worker(&self, worker: usize) -> Result<WorkerOutput> {
        let total = self.plan.total_chunks();
        let mut expected = ExpectedValues::new(&self.config.resolutions(), self.catalog);
        let mut whole = whole_genome::new_accumulator(self.catalog, &self.whole_genome_settings);
        let mut chunks = 0u32;
        let mut contacts = 0u64;

        let mut next = self.cursor.fetch_add(1, Ordering::SeqCst);
        while next < total && !self.aborted() {
            let pair_id = self
                .plan
                .pair_of(next)
                .ok_or_else(|| CompactError::consistency(format!("chunk {next} has no pair")))?;
            let state = &self.states[pair_id as usize];
            let mut local = PairAccumulator::new(state.pair.chr1, state.pair.chr2, self.catalog, &state.settings);

            let mut processed = 0u32;
            let mut chunk = next;
            loop {
                let overview = if state.included { Some(&mut whole) } else { None };
                contacts += self.process_chunk(chunk, &state.pair, &mut local, &mut expected, overview)?;
                processed += 1;
                chunk = self.cursor.fetch_add(1, Ordering::SeqCst);
                if chunk >= total || self.plan.pair_of(chunk) != Some(pair_id) || self.aborted() {
                    break;
                }
            }
            chunks += processed;
            next = chunk;

            self.complete(state, local, processed, worker)?;
        }

        debug!("Worker {worker} done: {chunks} chunks, {contacts} contacts");
        Ok(WorkerOutput {
            worker,
            expected,
            whole_genome: whole,
            chunks,
            contacts,
        })
    }

    fn process_chunk(
        &self,
        chunk: u32,
        pair: &ChromosomePair,
        local: &mut PairAccumulator,
        expected: &mut ExpectedValues,
        mut whole: Option<&mut PairAccumulator>,
    ) -> Result<u64> {
        let range = self
            .plan
            .range_of(chunk)
            .ok_or_else(|| CompactError::consistency(format!("chunk {chunk} has no byte range")))?;
        let mut count = 0u64;
        for record in self.source.records(range)? {
            let record = record?;
            if (record.chr1, record.chr2) != (pair.chr1, pair.chr2) {
                return Err(CompactError::format(format!(
                    "chunk {chunk} of pair {} holds a {}_{} record",
                    pair.name, record.chr1, record.chr2
                )));
            }
            local.increment_count(record.pos1, record.pos2, record.frag1, record.frag2, record.score, Some(&mut *expected));
            if let Some(whole) = whole.as_deref_mut() {
                whole_genome::add_contact(whole, self.catalog, &record);
            }
            count += 1;
        }
        self.contacts.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }

    /// Merge a worker's partial and either finish the pair or wait for it
    fn complete(&self, state: &PairState, local: PairAccumulator, processed: u32, worker: usize) -> Result<()> {
        let merge_start = Instant::now();
        {
            let mut running = lock(&state.running, "pair matrix")?;
            match running.as_mut() {
                Some(matrix) => matrix.merge_matrices(&local)?,
                None => *running = Some(local),
            }
        }
        state.contributors.fetch_add(1, Ordering::SeqCst);
        let done = state.completed.fetch_add(processed, Ordering::SeqCst) + processed;
        debug!(
            "Worker {worker} merged {processed} chunk(s) of pair {} in {}ms ({done}/{})",
            state.pair.name,
            merge_start.elapsed().as_millis(),
            state.total_chunks
        );

        if done > state.total_chunks {
            return Err(CompactError::consistency(format!(
                "pair {} completed {done} of {} chunks",
                state.pair.name, state.total_chunks
            )));
        }
        if done == state.total_chunks {
            return self.finish_pair(state);
        }

        let mut written = lock(&state.written, "pair")?;
        while !*written && !self.aborted() {
            written = state
                .written_signal
                .wait(written)
                .map_err(|_| CompactError::consistency("pair lock poisoned"))?;
        }
        Ok(())
    }

    fn finish_pair(&self, state: &PairState) -> Result<()> {
        let write_start = Instant::now();
        let mut matrix = lock(&state.running, "pair matrix")?
            .take()
            .ok_or_else(|| CompactError::consistency(format!("pair {} has no matrix to write", state.pair.name)))?;
        matrix.parsing_complete(self.config.min_count)?;

        if state.included {
            let contributors = state.contributors.load(Ordering::SeqCst);
            let written = self.writer.write_pair(&state.pair, &matrix, contributors)?;
            lock(&self.written, "written pairs")?.push(written);
            debug!(
                "Pair {} written by {} contributor(s) in {}ms",
                state.pair.name,
                contributors,
                write_start.elapsed().as_millis()
            );
        } else {
            debug!("Pair {} excluded from output", state.pair.name);
        }

        let mut written = lock(&state.written, "pair")?;
        if *written {
            return Err(CompactError::consistency(format!(
                "pair {} finalized twice",
                state.pair.name
            )));
        }
        *written = true;
        state.written_signal.notify_all();
        Ok(())
    }
}
