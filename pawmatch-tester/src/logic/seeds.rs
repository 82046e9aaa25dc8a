use anyhow::{Context, Result, bail};

/// Upper bound on seeds a single range token may expand to.
const MAX_RANGE_SEEDS: u64 = 10_000;

/// Resolve CLI seed tokens into concrete seeds.
///
/// Accepts decimal integers, `0x` hex literals, and inclusive ranges such as
/// `1..=8`. Duplicates keep their first position.
///
/// # Errors
///
/// Returns an error for an unparsable token, an empty list, or a range that
/// is reversed or too large.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds: Vec<u64> = Vec::new();
    for token in tokens {
        if let Some((start, end)) = token.split_once("..=") {
            let start = parse_seed(start)?;
            let end = parse_seed(end)?;
            if end < start {
                bail!("seed range {token} is reversed");
            }
            if end - start >= MAX_RANGE_SEEDS {
                bail!("seed range {token} expands past {MAX_RANGE_SEEDS} seeds");
            }
            for seed in start..=end {
                push_unique(&mut seeds, seed);
            }
        } else {
            push_unique(&mut seeds, parse_seed(token)?);
        }
    }
    if seeds.is_empty() {
        bail!("no seeds given");
    }
    Ok(seeds)
}

fn parse_seed(token: &str) -> Result<u64> {
    let token = token.trim();
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).with_context(|| format!("invalid hex seed {token}"));
    }
    token
        .parse::<u64>()
        .with_context(|| format!("invalid seed {token}"))
}

fn push_unique(seeds: &mut Vec<u64>, seed: u64) {
    if !seeds.contains(&seed) {
        seeds.push(seed);
    }
}
