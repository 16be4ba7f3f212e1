use rand::Rng;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; honours `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Distinct random flow identifiers.
#[allow(dead_code)]
pub fn generate_flows(count: usize) -> Vec<u64> {
    let mut rng = rand::rng();
    let mut flows = std::collections::HashSet::with_capacity(count);
    while flows.len() < count {
        flows.insert(rng.random::<u64>());
    }
    flows.into_iter().collect()
}

/// Searches `0..limit` for two distinct flows `fingerprint` maps to the same
/// value.
#[allow(dead_code)]
pub fn find_collision<F>(limit: u64, fingerprint: F) -> Option<(u64, u64)>
where
    F: Fn(&u64) -> u64,
{
    let mut seen = std::collections::HashMap::new();
    for flow in 0..limit {
        if let Some(&other) = seen.get(&fingerprint(&flow)) {
            return Some((other, flow));
        }
        seen.insert(fingerprint(&flow), flow);
    }
    None
}
