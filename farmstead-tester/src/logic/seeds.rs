use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_SEED: u64 = 1337;
const MAX_RANGE_LEN: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("unrecognized seed token: {0}")]
    Unrecognized(String),
    #[error("seed range {start}..{end} is empty")]
    EmptyRange { start: u64, end: u64 },
    #[error("seed range {start}..{end} exceeds 10000 seeds")]
    RangeTooLarge { start: u64, end: u64 },
}

/// Resolve CLI seed tokens into a deduplicated, ordered seed list.
///
/// Supports decimal integers (negative values use their magnitude), `0x` hex
/// literals, and half-open ranges such as `10..20`. An empty list resolves to
/// [`DEFAULT_SEED`].
///
/// # Errors
///
/// Returns [`SeedError`] for tokens that are not seeds or ranges, and for
/// empty or oversized ranges.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>, SeedError> {
    let mut seeds = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |seed: u64| {
        if seen.insert(seed) {
            seeds.push(seed);
        }
    };

    for token in tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if let Some((start, end)) = token.split_once("..") {
            let (start, end) = (parse_seed(start)?, parse_seed(end)?);
            if end <= start {
                return Err(SeedError::EmptyRange { start, end });
            }
            if end - start > MAX_RANGE_LEN {
                return Err(SeedError::RangeTooLarge { start, end });
            }
            (start..end).for_each(&mut push);
        } else {
            push(parse_seed(token)?);
        }
    }

    if seeds.is_empty() {
        seeds.push(DEFAULT_SEED);
    }
    Ok(seeds)
}

fn parse_seed(token: &str) -> Result<u64, SeedError> {
    let token = token.trim();
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u64::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|_| SeedError::Unrecognized(token.to_string()));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    token
        .parse::<u64>()
        .map_err(|_| SeedError::Unrecognized(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn resolves_numbers_hex_and_ranges() {
        let seeds = resolve_seed_inputs(&tokens(&["42", "-7", "0xFF", "3..6", "4"])).unwrap();
        assert_eq!(seeds, vec![42, 7, 255, 3, 4, 5]);
    }

    #[test]
    fn empty_input_uses_default() {
        assert_eq!(resolve_seed_inputs(&[]).unwrap(), vec![DEFAULT_SEED]);
        assert_eq!(
            resolve_seed_inputs(&tokens(&["", "  "])).unwrap(),
            vec![DEFAULT_SEED]
        );
    }

    #[test]
    fn rejects_garbage_and_bad_ranges() {
        assert_eq!(
            resolve_seed_inputs(&tokens(&["carrot"])),
            Err(SeedError::Unrecognized(String::from("carrot")))
        );
        assert_eq!(
            resolve_seed_inputs(&tokens(&["9..9"])),
            Err(SeedError::EmptyRange { start: 9, end: 9 })
        );
        assert!(matches!(
            resolve_seed_inputs(&tokens(&["0..20000"])),
            Err(SeedError::RangeTooLarge { .. })
        ));
    }
}
