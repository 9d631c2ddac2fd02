//! # The Chain Engine
//!
//! One object owns the chain: the sled handle, the single coarse mutex, and
//! every derived cache behind it (height index, head, current target,
//! scoreboards, spam filter). Constructed once at startup; mines genesis
//! itself if the store is empty.
//!
//! ## Locking Discipline
//!
//! [`Blockchain::add_block`] runs its stateless checks — difficulty floor,
//! clock drift, payload size, proof of work, merkle commitment — before
//! taking the lock, so expensive validation never serializes other callers.
//! Everything that reads or writes chain state, including store reads on
//! the query paths, happens under the mutex.
//!
//! ## Crash Semantics
//!
//! A submission commits as a single batch: the new header, its payload, and
//! every `ismainchain` flip of a fork swap. The in-memory height index and
//! scoreboards are rebuilt from a full store scan after any main-chain
//! change rather than patched incrementally — if the batch landed, the
//! on-disk flags are the truth and the caches follow from them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{
    GENESIS_PAYLOAD, HEADER_VERSION, MAX_CLOCK_DRIFT_NANOS, MINIMUM_DIFFICULTY, RETARGET_WINDOW,
};
use crate::consensus::difficulty;
use crate::consensus::header::{Block, Hash, Header, ProcessedHeader};
use crate::consensus::pow;
use crate::error::{AddBlockError, BootstrapError, StoreError, StoreResult};
use crate::storage::ChainDb;

// ---------------------------------------------------------------------------
// Chain State
// ---------------------------------------------------------------------------

/// Everything behind the chain mutex.
struct ChainState {
    /// The stored header with the greatest cumulative difficulty.
    head: ProcessedHeader,
    /// Difficulty required of the next block extending `head`.
    current_target: u64,
    /// `height -> id` for the current main chain, total over `0..=head`.
    height_index: HashMap<u64, Hash>,
    /// Header ids already stored or already rejected. Process-local.
    spam: HashSet<Hash>,
    /// Producer -> count over every stored version-0 block.
    scores: HashMap<String, u64>,
    /// Producer -> count over blocks currently on the main chain.
    main_scores: HashMap<String, u64>,
    /// Producer -> count over blocks that were ever on the main chain.
    ever_scores: HashMap<String, u64>,
}

/// The consensus engine: persistent header DAG, best-difficulty main chain,
/// and the scoreboard derived from it.
pub struct Blockchain {
    db: ChainDb,
    state: Mutex<ChainState>,
}

impl Blockchain {
    /// Open (or create) the chain at `path`. Mines the genesis block if the
    /// store is empty; refuses to come up on a store it cannot read.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, BootstrapError> {
        Self::bootstrap(ChainDb::open(path)?)
    }

    /// An in-memory chain for tests, genesis included.
    pub fn open_temporary() -> Result<Self, BootstrapError> {
        Self::bootstrap(ChainDb::open_temporary()?)
    }

    fn bootstrap(db: ChainDb) -> Result<Self, BootstrapError> {
        let (height_index, head) = match scan_main_chain(&db)? {
            Some(loaded) => loaded,
            None => {
                info!("empty store; mining genesis block");
                let (ph, block) = mine_genesis()?;
                let mut batch = sled::Batch::default();
                ChainDb::stage_header(&mut batch, &ph)?;
                ChainDb::stage_block(&mut batch, &ph.id(), &block);
                db.write(batch)?;
                info!(id = %ph.id(), nonces = ?ph.header.nonces, "genesis block mined");
                (HashMap::from([(0, ph.id())]), ph)
            }
        };

        let (scores, main_scores, ever_scores) = scan_scores(&db)?;
        let current_target = target_for_child(&db, &height_index, &head)?;
        info!(
            height = head.block_height,
            totaldiff = head.total_difficulty,
            target = current_target,
            "chain loaded"
        );

        Ok(Blockchain {
            db,
            state: Mutex::new(ChainState {
                head,
                current_target,
                height_index,
                spam: HashSet::new(),
                scores,
                main_scores,
                ever_scores,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate and record a submitted block.
    ///
    /// On success the returned [`ProcessedHeader`] reflects where the block
    /// landed — `is_main_chain` tells the submitter whether they extended
    /// (or captured) the main chain or parked on a side fork.
    pub fn add_block(&self, header: Header, block: Block) -> Result<ProcessedHeader, AddBlockError> {
        // Stateless checks first, without the lock.
        if header.difficulty < MINIMUM_DIFFICULTY {
            return Err(AddBlockError::Difficulty {
                submitted: header.difficulty,
                required: MINIMUM_DIFFICULTY,
            });
        }
        let drift = (header.timestamp as i128 - now_nanos() as i128).unsigned_abs();
        if drift > MAX_CLOCK_DRIFT_NANOS as u128 {
            return Err(AddBlockError::ClockDrift);
        }
        header.validate(&block)?;

        let id = header.id();
        let mut state = self.state.lock();

        // Duplicate? Remember the id so repeats skip even the store lookup.
        if state.spam.contains(&id) || self.db.has_header(&id)? {
            state.spam.insert(id);
            return Err(AddBlockError::SpamHeader(id));
        }

        // Attach to the parent and price the required work.
        let parent = match self.db.header(&header.parent_id)? {
            Some(parent) => parent,
            None => {
                state.spam.insert(id);
                return Err(AddBlockError::ParentNotFound(header.parent_id));
            }
        };
        let required = target_for_child(&self.db, &state.height_index, &parent)?;
        if header.difficulty < required {
            state.spam.insert(id);
            return Err(AddBlockError::Difficulty {
                submitted: header.difficulty,
                required,
            });
        }

        let mut candidate = ProcessedHeader {
            header,
            block_height: parent.block_height + 1,
            is_main_chain: false,
            ever_main_chain: false,
            total_difficulty: parent.total_difficulty + header.difficulty,
        };

        // Stage the whole state change — fork swap included — as one batch.
        let mut batch = sled::Batch::default();
        if candidate.total_difficulty > state.head.total_difficulty {
            self.swap_main_fork(&state, parent, &mut candidate, &mut batch)?;
        }
        ChainDb::stage_header(&mut batch, &candidate)?;
        ChainDb::stage_block(&mut batch, &id, &block);
        self.db.write(batch).map_err(AddBlockError::Store)?;

        if candidate.is_main_chain {
            self.rebuild_caches(&mut state)?;
            info!(
                height = candidate.block_height,
                totaldiff = candidate.total_difficulty,
                id = %id,
                "chain tip advanced"
            );
        } else {
            debug!(
                height = candidate.block_height,
                totaldiff = candidate.total_difficulty,
                id = %id,
                "side-chain block recorded"
            );
        }

        Ok(candidate)
    }

    /// Flip the main chain onto the fork ending at `candidate`.
    ///
    /// Walks the side branch from `parent` up to the lowest common ancestor
    /// with the main chain, stages `ismainchain = false` for the abandoned
    /// main-chain suffix and `ismainchain = evermainchain = true` for the
    /// adopted side branch. Only flag flips are staged; the height index is
    /// rebuilt from the store after the batch commits.
    fn swap_main_fork(
        &self,
        state: &ChainState,
        parent: ProcessedHeader,
        candidate: &mut ProcessedHeader,
        batch: &mut sled::Batch,
    ) -> StoreResult<()> {
        // Side branch, child-first, ending just below the common ancestor.
        let mut side = Vec::new();
        let mut cursor = parent;
        while !cursor.is_main_chain {
            let parent_id = cursor.header.parent_id;
            side.push(cursor);
            cursor = self
                .db
                .header(&parent_id)?
                .ok_or(StoreError::BrokenChain(parent_id))?;
        }
        let fork = cursor;

        // Abandoned main-chain suffix, head down to just above the fork.
        let mut reverted = 0usize;
        let mut height = state.head.block_height;
        while height > fork.block_height {
            let id = state
                .height_index
                .get(&height)
                .copied()
                .ok_or(StoreError::MissingHeight(height))?;
            let mut main = self.db.header(&id)?.ok_or(StoreError::BrokenChain(id))?;
            main.is_main_chain = false;
            ChainDb::stage_header(batch, &main)?;
            reverted += 1;
            height -= 1;
        }

        let applied = side.len();
        for mut ph in side {
            ph.is_main_chain = true;
            ph.ever_main_chain = true;
            ChainDb::stage_header(batch, &ph)?;
        }

        candidate.is_main_chain = true;
        candidate.ever_main_chain = true;

        if reverted > 0 || applied > 0 {
            info!(
                fork_height = fork.block_height,
                reverted, applied, "fork swap"
            );
        }
        Ok(())
    }

    /// Rebuild every derived cache from the store: height index, head,
    /// current target, and the three scoreboards.
    fn rebuild_caches(&self, state: &mut ChainState) -> StoreResult<()> {
        let (height_index, head) =
            scan_main_chain(&self.db)?.ok_or(StoreError::EmptyChain)?;
        state.current_target = target_for_child(&self.db, &height_index, &head)?;
        state.height_index = height_index;
        state.head = head;

        let (scores, main_scores, ever_scores) = scan_scores(&self.db)?;
        state.scores = scores;
        state.main_scores = main_scores;
        state.ever_scores = ever_scores;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The current head's processed header.
    pub fn head(&self) -> ProcessedHeader {
        self.state.lock().head.clone()
    }

    /// Difficulty required of the next block extending the head.
    pub fn current_target(&self) -> u64 {
        self.state.lock().current_target
    }

    /// A template for miners: parent and difficulty filled in, everything
    /// else — payload commitment, timestamp, nonces — theirs to provide.
    pub fn next_template(&self) -> Header {
        let state = self.state.lock();
        Header {
            parent_id: state.head.id(),
            merkle_root: Hash::ZERO,
            difficulty: state.current_target,
            timestamp: 0,
            nonces: [0; 3],
            version: HEADER_VERSION,
        }
    }

    /// Full view of one stored block: header, payload, chain position, and
    /// the difficulty a child would owe.
    pub fn explore_block(&self, id: &Hash) -> StoreResult<Option<ExploreBlock>> {
        let state = self.state.lock();
        let Some(ph) = self.db.header(id)? else {
            return Ok(None);
        };
        let Some(block) = self.db.block(id)? else {
            return Ok(None);
        };
        Ok(Some(explore(&self.db, &state.height_index, ph, block)?))
    }

    /// Every stored block whose payload contains `needle`.
    pub fn search(&self, needle: &str) -> StoreResult<Vec<ExploreBlock>> {
        let state = self.state.lock();
        let mut matches = Vec::new();
        for entry in self.db.blocks() {
            let (id, block) = entry?;
            if !block.producer().contains(needle) {
                continue;
            }
            let ph = self.db.header(&id)?.ok_or(StoreError::BrokenChain(id))?;
            matches.push(explore(&self.db, &state.height_index, ph, block)?);
        }
        Ok(matches)
    }

    /// The leaderboard: chain length, cumulative work, and the three
    /// producer scoreboards.
    pub fn score_report(&self) -> ScoreReport {
        let state = self.state.lock();
        ScoreReport {
            height: state.head.block_height + 1,
            total_difficulty: state.head.total_difficulty,
            main_scores: state.main_scores.clone(),
            ever_scores: state.ever_scores.clone(),
            scores: state.scores.clone(),
        }
    }

    /// The whole header DAG as nodes and edges, for the explorer page.
    pub fn graph(&self) -> StoreResult<ChainGraph> {
        let state = self.state.lock();
        let head_height = state.head.block_height;

        let mut graph = ChainGraph {
            height: head_height,
            ..ChainGraph::default()
        };
        for entry in self.db.headers() {
            let ph = entry?;
            let id = ph.id();
            let label = match self.db.block(&id)? {
                Some(block) => block.producer().chars().take(8).collect(),
                None => String::new(),
            };
            graph.nodes.push(GraphNode {
                id,
                level: head_height.saturating_sub(ph.block_height),
                label,
                is_main_chain: ph.is_main_chain,
                ever_main_chain: ph.ever_main_chain,
            });
            if ph.block_height > 0 {
                graph.edges.push(GraphEdge {
                    from: ph.header.parent_id,
                    to: id,
                });
            }
        }
        Ok(graph)
    }
}

// ---------------------------------------------------------------------------
// Difficulty windowing
// ---------------------------------------------------------------------------

/// Difficulty required of a block whose parent is `parent`.
///
/// Mid-window this is the difficulty of the window's anchor block (the one
/// at the last multiple of [`RETARGET_WINDOW`]); when `parent` closes a
/// window, the retargeting rule produces the next value. The anchor lookup
/// goes through the height index when `parent` sits on the main chain and
/// walks parent links otherwise — side forks retarget against their own
/// ancestry.
fn target_for_child(
    db: &ChainDb,
    height_index: &HashMap<u64, Hash>,
    parent: &ProcessedHeader,
) -> StoreResult<u64> {
    let height = parent.block_height;
    let offset = height % RETARGET_WINDOW;

    let anchor = if offset == 0 {
        parent.clone()
    } else {
        let anchor_height = height - offset;
        if height_index.get(&height) == Some(&parent.id()) {
            let id = height_index
                .get(&anchor_height)
                .ok_or(StoreError::MissingHeight(anchor_height))?;
            db.header(id)?.ok_or(StoreError::BrokenChain(*id))?
        } else {
            let mut cursor = parent.clone();
            while cursor.block_height > anchor_height {
                let parent_id = cursor.header.parent_id;
                cursor = db
                    .header(&parent_id)?
                    .ok_or(StoreError::BrokenChain(parent_id))?;
            }
            cursor
        }
    };

    if offset != RETARGET_WINDOW - 1 {
        return Ok(anchor.header.difficulty);
    }

    let window_nanos = parent.header.timestamp - anchor.header.timestamp;
    let next = difficulty::retarget(anchor.header.difficulty, window_nanos);
    if next != anchor.header.difficulty {
        info!(
            closed_at = height,
            old = anchor.header.difficulty,
            new = next,
            "difficulty retargeted"
        );
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Store scans
// ---------------------------------------------------------------------------

/// Rebuild the height index and head from the `ismainchain` flags on disk.
///
/// Returns `None` for a store with no headers at all; a store with headers
/// but no main chain is corrupt.
fn scan_main_chain(
    db: &ChainDb,
) -> StoreResult<Option<(HashMap<u64, Hash>, ProcessedHeader)>> {
    let mut index = HashMap::new();
    let mut head: Option<ProcessedHeader> = None;
    let mut any = false;

    for entry in db.headers() {
        let ph = entry?;
        any = true;
        if !ph.is_main_chain {
            continue;
        }
        index.insert(ph.block_height, ph.id());
        if head
            .as_ref()
            .is_none_or(|best| ph.total_difficulty > best.total_difficulty)
        {
            head = Some(ph);
        }
    }

    match head {
        Some(head) => Ok(Some((index, head))),
        None if any => Err(StoreError::EmptyChain),
        None => Ok(None),
    }
}

/// Rebuild the three scoreboards from a full store scan.
type Scoreboards = (
    HashMap<String, u64>,
    HashMap<String, u64>,
    HashMap<String, u64>,
);

fn scan_scores(db: &ChainDb) -> StoreResult<Scoreboards> {
    let mut scores = HashMap::new();
    let mut main_scores = HashMap::new();
    let mut ever_scores = HashMap::new();

    for entry in db.headers() {
        let ph = entry?;
        if ph.header.version != HEADER_VERSION {
            continue;
        }
        let Some(block) = db.block(&ph.id())? else {
            continue;
        };
        let producer = block.producer();
        *scores.entry(producer.clone()).or_insert(0) += 1;
        if ph.is_main_chain {
            *main_scores.entry(producer.clone()).or_insert(0) += 1;
        }
        if ph.ever_main_chain {
            *ever_scores.entry(producer).or_insert(0) += 1;
        }
    }

    Ok((scores, main_scores, ever_scores))
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Mine the chain's first block over the fixed genesis payload.
fn mine_genesis() -> Result<(ProcessedHeader, Block), BootstrapError> {
    let block = Block::from(GENESIS_PAYLOAD);
    let mut header = Header {
        parent_id: Hash::ZERO,
        merkle_root: block.merkle_root(),
        difficulty: MINIMUM_DIFFICULTY,
        timestamp: now_nanos(),
        nonces: [0; 3],
        version: HEADER_VERSION,
    };
    pow::mine(&mut header)?;

    let ph = ProcessedHeader {
        header,
        block_height: 0,
        is_main_chain: true,
        ever_main_chain: true,
        total_difficulty: header.difficulty,
    };
    Ok((ph, block))
}

/// Wall clock in nanoseconds since the Unix epoch. Saturates in 2262; the
/// course will be over by then.
fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Read Models
// ---------------------------------------------------------------------------

/// One stored block with its chain position and derived fields, as served
/// by the block, search, and add endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ExploreBlock {
    pub id: Hash,
    pub header: Header,
    pub block: Block,
    #[serde(rename = "blockheight")]
    pub block_height: u64,
    #[serde(rename = "ismainchain")]
    pub is_main_chain: bool,
    #[serde(rename = "evermainchain")]
    pub ever_main_chain: bool,
    #[serde(rename = "totaldiff")]
    pub total_difficulty: u64,
    /// Difficulty a child of this block would owe.
    #[serde(rename = "nextdiff")]
    pub next_difficulty: u64,
    /// The header timestamp rendered as RFC 3339.
    pub timestamp: String,
}

fn explore(
    db: &ChainDb,
    height_index: &HashMap<u64, Hash>,
    ph: ProcessedHeader,
    block: Block,
) -> StoreResult<ExploreBlock> {
    let next_difficulty = target_for_child(db, height_index, &ph)?;
    let timestamp = DateTime::<Utc>::from_timestamp_nanos(ph.header.timestamp).to_rfc3339();
    Ok(ExploreBlock {
        id: ph.id(),
        header: ph.header,
        block,
        block_height: ph.block_height,
        is_main_chain: ph.is_main_chain,
        ever_main_chain: ph.ever_main_chain,
        total_difficulty: ph.total_difficulty,
        next_difficulty,
        timestamp,
    })
}

/// The `/scores` report.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    /// Chain length: head height plus one.
    pub height: u64,
    #[serde(rename = "totaldifficulty")]
    pub total_difficulty: u64,
    #[serde(rename = "mainchain")]
    pub main_scores: HashMap<String, u64>,
    #[serde(rename = "everinmainchain")]
    pub ever_scores: HashMap<String, u64>,
    #[serde(rename = "total")]
    pub scores: HashMap<String, u64>,
}

/// The header DAG in explorer form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: Hash,
    /// Vertical rank for rendering: distance below the head.
    pub level: u64,
    /// Payload prefix, enough to recognize a team.
    pub label: String,
    #[serde(rename = "ismainchain")]
    pub is_main_chain: bool,
    /// Distinguishes reorganized-off blocks from never-main ones.
    #[serde(rename = "evermainchain")]
    pub ever_main_chain: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: Hash,
    pub to: Hash,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
