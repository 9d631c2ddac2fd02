//! End-to-end tests for the tricoin consensus core.
//!
//! These exercise the engine the way the HTTP node does: poll the template,
//! mine a real witness, submit, and read the chain back out. They prove the
//! pieces compose — puzzle, chain engine, fork resolution, scoreboard, and
//! persistence — without reaching into any internals.
//!
//! Each test stands alone with its own temporary store. No shared state,
//! no test ordering dependencies.

use tricoin_protocol::config::{GENESIS_PAYLOAD, MINIMUM_DIFFICULTY};
use tricoin_protocol::consensus::{pow, Block, Blockchain, Header, ProcessedHeader};
use tricoin_protocol::error::AddBlockError;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Fill a `/next`-style template the way a miner would: commit to the
/// payload, stamp the clock, and search for a witness.
fn mine_template(template: Header, payload: &str) -> (Header, Block) {
    let block = Block::from(payload);
    let mut header = template;
    header.merkle_root = block.merkle_root();
    header.timestamp = chrono_now_nanos();
    pow::mine(&mut header).expect("nonce space is effectively unbounded here");
    (header, block)
}

/// Mine a child of an arbitrary parent at an explicit difficulty.
fn mine_child(parent: &Header, payload: &str, difficulty: u64) -> (Header, Block) {
    let template = Header {
        parent_id: parent.id(),
        merkle_root: Block::default().merkle_root(),
        difficulty,
        timestamp: 0,
        nonces: [0; 3],
        version: 0,
    };
    mine_template(template, payload)
}

fn chrono_now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn submit(chain: &Blockchain, header: Header, block: Block) -> ProcessedHeader {
    chain.add_block(header, block).expect("submission should be accepted")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn fresh_node_establishes_genesis() {
    let chain = Blockchain::open_temporary().unwrap();
    let head = chain.head();

    assert_eq!(head.block_height, 0);
    assert_eq!(head.header.difficulty, MINIMUM_DIFFICULTY);
    assert_eq!(head.total_difficulty, MINIMUM_DIFFICULTY);
    assert!(head.is_main_chain && head.ever_main_chain);

    let genesis = chain.explore_block(&head.id()).unwrap().unwrap();
    assert_eq!(genesis.block.as_bytes(), GENESIS_PAYLOAD);
    assert_eq!(genesis.header.merkle_root, Block::from(GENESIS_PAYLOAD).merkle_root());
}

#[test]
fn miner_lifecycle_extends_the_chain() {
    let chain = Blockchain::open_temporary().unwrap();

    // The miner's loop: fetch the template, fill it, submit.
    let (header, block) = mine_template(chain.next_template(), "team-a");
    let accepted = submit(&chain, header, block);

    assert_eq!(accepted.block_height, 1);
    assert_eq!(chain.head(), accepted);
    assert_eq!(chain.head().id(), header.id());

    let report = chain.score_report();
    assert_eq!(report.height, 2);
    assert_eq!(report.main_scores["team-a"], 1);

    // The next template now points at the new head.
    assert_eq!(chain.next_template().parent_id, accepted.id());
}

#[test]
fn heavier_sibling_reorganizes_the_chain() {
    let chain = Blockchain::open_temporary().unwrap();
    let genesis = chain.head().header;

    let (h1, b1) = mine_child(&genesis, "team-a", MINIMUM_DIFFICULTY);
    let first = submit(&chain, h1, b1);
    assert!(first.is_main_chain);

    let (h2, b2) = mine_child(&genesis, "team-b", 2 * MINIMUM_DIFFICULTY);
    let second = submit(&chain, h2, b2);
    assert!(second.is_main_chain);
    assert_eq!(chain.head(), second);

    // The displaced block keeps its history but loses the chain.
    let displaced = chain.explore_block(&first.id()).unwrap().unwrap();
    assert!(!displaced.is_main_chain);
    assert!(displaced.ever_main_chain);

    let report = chain.score_report();
    assert_eq!(report.main_scores.get("team-a"), None);
    assert_eq!(report.main_scores["team-b"], 1);
    assert_eq!(report.ever_scores["team-a"], 1);
    assert_eq!(report.ever_scores["team-b"], 1);
    assert_eq!(report.scores["team-a"], 1);
    assert_eq!(report.scores["team-b"], 1);
}

#[test]
fn resubmission_is_rejected_as_spam() {
    let chain = Blockchain::open_temporary().unwrap();
    let (header, block) = mine_template(chain.next_template(), "team-a");

    submit(&chain, header, block.clone());
    match chain.add_block(header, block) {
        Err(AddBlockError::SpamHeader(id)) => assert_eq!(id, header.id()),
        other => panic!("expected a spam rejection, got {other:?}"),
    }

    // One record, not two: the search index sees a single team-a block.
    assert_eq!(chain.search("team-a").unwrap().len(), 1);
}

#[test]
fn corrupted_witness_is_rejected() {
    let chain = Blockchain::open_temporary().unwrap();
    let (mut header, block) = mine_template(chain.next_template(), "team-a");

    header.nonces[2] = header.nonces[2].wrapping_add(1);
    while pow::verify(&header) {
        header.nonces[2] = header.nonces[2].wrapping_add(1);
    }

    assert!(matches!(
        chain.add_block(header, block),
        Err(AddBlockError::InvalidPoW)
    ));
    // The chain did not move.
    assert_eq!(chain.head().block_height, 0);
    assert!(chain.search("team-a").unwrap().is_empty());
}

#[test]
fn chain_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (head_id, b1_id) = {
        let chain = Blockchain::open(dir.path()).unwrap();
        let (h1, b1) = mine_template(chain.next_template(), "team-a");
        let first = submit(&chain, h1, b1);
        let (h2, b2) = mine_template(chain.next_template(), "team-b");
        let second = submit(&chain, h2, b2);
        (second.id(), first.id())
    };

    let chain = Blockchain::open(dir.path()).unwrap();
    assert_eq!(chain.head().id(), head_id);
    assert_eq!(chain.head().block_height, 2);

    // Interior blocks, scores, and the template all come back from disk.
    let b1 = chain.explore_block(&b1_id).unwrap().unwrap();
    assert!(b1.is_main_chain);
    let report = chain.score_report();
    assert_eq!(report.main_scores["team-a"], 1);
    assert_eq!(report.main_scores["team-b"], 1);
    assert_eq!(chain.next_template().parent_id, head_id);
}

#[test]
fn search_spans_every_fork() {
    let chain = Blockchain::open_temporary().unwrap();
    let genesis = chain.head().header;

    let (h1, b1) = mine_child(&genesis, "quorum-east", MINIMUM_DIFFICULTY);
    submit(&chain, h1, b1);
    let (h2, b2) = mine_child(&genesis, "quorum-west", 2 * MINIMUM_DIFFICULTY);
    submit(&chain, h2, b2);

    // Both siblings match, main chain or not.
    let hits = chain.search("quorum").unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(chain.search("quorum-east").unwrap().len(), 1);
}
