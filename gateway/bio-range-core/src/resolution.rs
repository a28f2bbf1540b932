//! Picks the precomputed resolution level used for a query.

use crate::model::ResolutionLevel;

/// Returns the level with the greatest reduction factor not exceeding `requested`.
///
/// `None` means the unreduced base data should be read: either no granularity was
/// requested or every level is coarser than the request. Levels may come in any
/// order; among levels with equal reduction factors the first one in source order wins.
pub fn select_resolution(
    requested: Option<u64>,
    levels: &[ResolutionLevel],
) -> Option<ResolutionLevel> {
    let requested = requested?;
    let mut best: Option<ResolutionLevel> = None;
    for level in levels {
        if level.reduction_factor > requested {
            continue;
        }
        if best.is_none_or(|b| level.reduction_factor > b.reduction_factor) {
            best = Some(*level);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(factors: &[(u32, u64)]) -> Vec<ResolutionLevel> {
        factors
            .iter()
            .map(|&(index, reduction_factor)| ResolutionLevel {
                index,
                reduction_factor,
            })
            .collect()
    }

    #[test]
    fn test_exact_match() {
        let levels = levels(&[(0, 10), (1, 100), (2, 1000)]);
        let chosen = select_resolution(Some(100), &levels).unwrap();
        assert_eq!(chosen.reduction_factor, 100);
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn test_closest_without_exceeding() {
        let levels = levels(&[(0, 10), (1, 100), (2, 1000)]);
        assert_eq!(
            select_resolution(Some(999), &levels).unwrap().reduction_factor,
            100
        );
        assert_eq!(
            select_resolution(Some(50_000), &levels)
                .unwrap()
                .reduction_factor,
            1000
        );
    }

    #[test]
    fn test_falls_back_to_base() {
        let levels = levels(&[(0, 100), (1, 1000)]);
        assert!(select_resolution(Some(50), &levels).is_none());
        assert!(select_resolution(None, &levels).is_none());
        assert!(select_resolution(Some(100), &[]).is_none());
    }

    #[test]
    fn test_unsorted_levels() {
        let levels = levels(&[(0, 1000), (1, 10), (2, 100)]);
        let chosen = select_resolution(Some(500), &levels).unwrap();
        assert_eq!(chosen.index, 2);
    }

    #[test]
    fn test_tie_keeps_first_declared() {
        let levels = levels(&[(4, 100), (7, 100), (1, 10)]);
        assert_eq!(select_resolution(Some(100), &levels).unwrap().index, 4);
    }
}
