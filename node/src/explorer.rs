//! # Chain Explorer
//!
//! Renders the whole header DAG as an HTML page with a vis-network graph:
//! one node per stored header, one edge per parent link, main-chain blocks
//! highlighted. The render walks the full store, so the page is cached and
//! refreshed at most once a minute — plenty live for a leaderboard screen.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tricoin_protocol::consensus::Blockchain;
use tricoin_protocol::error::StoreError;

/// Minimum time between two renders of the explorer page.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

const TEMPLATE: &str = include_str!("../templates/explore.html");

/// A cached render of the explorer page.
pub struct Explorer {
    cache: Mutex<Cache>,
}

struct Cache {
    rendered_at: Option<Instant>,
    html: String,
}

impl Explorer {
    pub fn new() -> Self {
        Explorer {
            cache: Mutex::new(Cache {
                rendered_at: None,
                html: String::new(),
            }),
        }
    }

    /// The explorer page, re-rendered if the cached copy has gone stale.
    pub fn html(&self, chain: &Blockchain) -> Result<String, StoreError> {
        let mut cache = self.cache.lock();
        let stale = cache
            .rendered_at
            .is_none_or(|at| at.elapsed() >= REFRESH_INTERVAL);
        if stale {
            cache.html = render(chain)?;
            cache.rendered_at = Some(Instant::now());
        }
        Ok(cache.html.clone())
    }
}

impl Default for Explorer {
    fn default() -> Self {
        Explorer::new()
    }
}

/// Render the page from a fresh graph scan.
fn render(chain: &Blockchain) -> Result<String, StoreError> {
    let graph = chain.graph()?;

    let mut nodes = String::new();
    for node in &graph.nodes {
        // Three histories, three colors: on the main chain, reorganized
        // off it, or never on it at all.
        let group = if node.is_main_chain {
            "main"
        } else if node.ever_main_chain {
            "ever"
        } else {
            "side"
        };
        nodes.push_str(&format!(
            "{{id:'{}',level:{},label:'{}',group:'{}'}},\n",
            node.id,
            node.level,
            escape(&node.label),
            group,
        ));
    }

    let mut edges = String::new();
    for edge in &graph.edges {
        edges.push_str(&format!("{{from:'{}',to:'{}'}},\n", edge.from, edge.to));
    }

    // Tall enough for the deepest level plus padding.
    let canvas_height = format!("{}px", (graph.height + 3) * 65);

    Ok(TEMPLATE
        .replace("{{nodes}}", &nodes)
        .replace("{{edges}}", &edges)
        .replace("{{height}}", &canvas_height))
}

/// Keep payload-derived labels from escaping their JS string literal.
fn escape(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '\'' | '"' | '\\' | '<' | '>' => '_',
            other => other,
        })
        .collect()
}
