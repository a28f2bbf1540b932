//! Condenses positioned records into a fixed number of pixel buckets.
//!
//! A query domain `[start, end)` is mapped linearly onto `width` buckets with
//! `x(pos) = (pos - start) * width / (end - start)`. Each record updates the first
//! bucket it touches by merging its min/max, then *overwrites* the min/max of every
//! later bucket it covers. Output produced this way is compared bit for bit by
//! existing clients, so the overwrite must not become a running union.

use crate::model::{PixelBucket, ValueRecord, ZoomRecord};

/// A record that can be placed into pixel buckets.
pub trait Condensable {
    /// Covered source range `[start, end)`.
    fn range(&self) -> (u64, u64);
    /// Smallest and largest value of the record.
    fn bounds(&self) -> (f64, f64);
}

impl Condensable for ValueRecord {
    fn range(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    fn bounds(&self) -> (f64, f64) {
        (self.value, self.value)
    }
}

impl Condensable for ZoomRecord {
    fn range(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    fn bounds(&self) -> (f64, f64) {
        (self.min_val, self.max_val)
    }
}

/// What happens to buckets no record reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyBuckets {
    /// Keep them, with `null` min/max
    Null,
    /// Leave them out of the output
    Drop,
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: f64,
    max: f64,
}

impl Bounds {
    const EMPTY: Bounds = Bounds {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// Running state of one condensing pass.
#[derive(Debug)]
pub struct Resampler {
    start: u64,
    end: u64,
    buckets: Vec<Bounds>,
}

impl Resampler {
    /// Allocates `width` empty buckets over `[start, end)`.
    ///
    /// A zero width or an empty domain produces a resampler with no buckets.
    pub fn new(start: u64, end: u64, width: u32) -> Self {
        let width = if end > start { width as usize } else { 0 };
        Resampler {
            start,
            end,
            buckets: vec![Bounds::EMPTY; width],
        }
    }

    fn width(&self) -> u128 {
        self.buckets.len() as u128
    }

    fn length(&self) -> u128 {
        (self.end - self.start) as u128
    }

    /// Bucket index holding `pos`, which must lie inside the domain.
    fn bucket_of(&self, pos: u64) -> usize {
        (((pos - self.start) as u128 * self.width()) / self.length()) as usize
    }

    /// First position mapped to bucket `index`.
    fn bucket_start(&self, index: usize) -> u64 {
        let offset = (index as u128 * self.length()).div_ceil(self.width());
        self.start + offset as u64
    }

    /// Places one record.
    pub fn add<R: Condensable + ?Sized>(&mut self, record: &R) {
        if self.buckets.is_empty() {
            return;
        }
        let (record_start, record_end) = record.range();
        let clipped_start = record_start.max(self.start);
        let clipped_end = record_end.min(self.end);
        if clipped_end <= clipped_start {
            return;
        }
        let (min, max) = record.bounds();
        let cxs = self.bucket_of(clipped_start);
        let cxe = self.bucket_of(clipped_end - 1);

        let first = &mut self.buckets[cxs];
        first.min = first.min.min(min);
        first.max = first.max.max(max);
        for bucket in &mut self.buckets[cxs + 1..=cxe] {
            *bucket = Bounds { min, max };
        }
    }

    /// Places every record of a slice.
    pub fn extend<'a, R, I>(&mut self, records: I)
    where
        R: Condensable + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        for record in records {
            self.add(record);
        }
    }

    /// Converts the buckets into output records.
    pub fn finish(self, empty: EmptyBuckets) -> Vec<PixelBucket> {
        let count = self.buckets.len();
        let mut output = Vec::with_capacity(count);
        for (index, bounds) in self.buckets.iter().enumerate() {
            if bounds.is_empty() && empty == EmptyBuckets::Drop {
                continue;
            }
            let range_end = if index + 1 == count {
                self.end
            } else {
                self.bucket_start(index + 1)
            };
            let (min, max) = if bounds.is_empty() {
                (None, None)
            } else {
                (Some(bounds.min), Some(bounds.max))
            };
            output.push(PixelBucket {
                x: index as u32,
                start: self.bucket_start(index),
                end: range_end,
                min,
                max,
            });
        }
        output
    }
}

/// Condenses raw values, keeping empty buckets as `null`.
pub fn condense_values(
    records: &[ValueRecord],
    start: u64,
    end: u64,
    width: u32,
) -> Vec<PixelBucket> {
    let mut resampler = Resampler::new(start, end, width);
    resampler.extend(records);
    resampler.finish(EmptyBuckets::Null)
}

/// Condenses zoom records, dropping empty buckets.
pub fn condense_zoom(records: &[ZoomRecord], start: u64, end: u64, width: u32) -> Vec<PixelBucket> {
    let mut resampler = Resampler::new(start, end, width);
    resampler.extend(records);
    resampler.finish(EmptyBuckets::Drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(start: u64, end: u64, value: f64) -> ValueRecord {
        ValueRecord {
            chr: "chr1".to_string(),
            start,
            end,
            value,
        }
    }

    fn zoom(start: u64, end: u64, min_val: f64, max_val: f64) -> ZoomRecord {
        ZoomRecord {
            chr: "chr1".to_string(),
            start,
            end,
            valid_count: end - start,
            min_val,
            max_val,
            sum_data: 0.0,
            sum_squares: 0.0,
        }
    }

    #[test]
    fn test_bucket_shape() {
        let buckets = condense_values(&[value(150, 160, 4.0)], 0, 1000, 10);
        assert_eq!(buckets.len(), 10);
        for (i, bucket) in buckets.iter().enumerate() {
            assert_eq!(bucket.x, i as u32);
            assert_eq!(bucket.end - bucket.start, 100);
            assert_eq!(bucket.start, i as u64 * 100);
        }
        assert_eq!(buckets[1].min, Some(4.0));
        assert_eq!(buckets[1].max, Some(4.0));
        assert!(buckets[0].min.is_none());
        assert!(buckets[0].max.is_none());
        assert!(buckets[9].min.is_none());
    }

    #[test]
    fn test_first_bucket_merges() {
        let buckets = condense_values(
            &[value(210, 220, 3.0), value(250, 260, 9.0), value(270, 280, 1.0)],
            0,
            1000,
            10,
        );
        assert_eq!(buckets[2].min, Some(1.0));
        assert_eq!(buckets[2].max, Some(9.0));
    }

    #[test]
    fn test_later_buckets_are_overwritten() {
        // Earlier records put 5 in bucket 2 and 7 in bucket 3; the last one spans
        // buckets 2..=5 with value 1.
        let buckets = condense_values(
            &[value(250, 260, 5.0), value(300, 310, 7.0), value(280, 560, 1.0)],
            0,
            1000,
            10,
        );
        assert_eq!(buckets[2].min, Some(1.0));
        assert_eq!(buckets[2].max, Some(5.0));
        for x in 3..=5 {
            assert_eq!(buckets[x].min, Some(1.0), "bucket {x}");
            assert_eq!(buckets[x].max, Some(1.0), "bucket {x}");
        }
        assert!(buckets[6].min.is_none());
    }

    #[test]
    fn test_records_are_clipped_to_domain() {
        let buckets = condense_values(&[value(0, 5000, 2.0)], 1000, 2000, 4);
        assert_eq!(buckets.len(), 4);
        assert!(buckets.iter().all(|b| b.min == Some(2.0)));
        let buckets = condense_values(&[value(0, 1000, 2.0)], 1000, 2000, 4);
        assert!(buckets.iter().all(|b| b.min.is_none()));
    }

    #[test]
    fn test_zoom_condensing_drops_empty() {
        let buckets = condense_zoom(
            &[zoom(0, 100, 1.0, 3.0), zoom(500, 700, 2.0, 8.0)],
            0,
            1000,
            10,
        );
        let xs: Vec<u32> = buckets.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0, 5, 6]);
        assert_eq!(buckets[0].min, Some(1.0));
        assert_eq!(buckets[0].max, Some(3.0));
        assert_eq!(buckets[2].max, Some(8.0));
    }

    #[test]
    fn test_uneven_domain_covers_everything() {
        let buckets = condense_values(&[value(0, 7, 1.0)], 0, 7, 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, 0);
        assert_eq!(buckets[2].end, 7);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(buckets.iter().all(|b| b.max == Some(1.0)));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(condense_values(&[value(0, 10, 1.0)], 0, 1000, 0).is_empty());
        assert!(condense_values(&[value(0, 10, 1.0)], 10, 10, 5).is_empty());
    }
}
