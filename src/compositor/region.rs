//! Regions and damage tracking

use crate::protocol::{Point, Rect};

/// Default ceiling on rectangles kept in a damage set before it collapses
/// into its bounding box
pub const DEFAULT_DAMAGE_RECT_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOp {
    Add(Rect),
    Subtract(Rect),
}

/// A wl_region: an ordered list of add/subtract operations.
///
/// Membership is decided by the last operation whose rectangle covers the
/// point, which gives exact results without computing a rectangle
/// decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    ops: Vec<RegionOp>,
}

impl Region {
    pub fn new() -> Self {
        Region::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Region::new();
        region.add(rect);
        region
    }

    pub fn add(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.ops.push(RegionOp::Add(rect));
        }
    }

    pub fn subtract(&mut self, rect: Rect) {
        if rect.is_empty() || self.ops.is_empty() {
            return;
        }
        self.ops.push(RegionOp::Subtract(rect));
    }

    pub fn contains_point(&self, point: Point) -> bool {
        for op in self.ops.iter().rev() {
            match op {
                RegionOp::Add(rect) if rect.contains_point(point) => return true,
                RegionOp::Subtract(rect) if rect.contains_point(point) => return false,
                _ => {}
            }
        }
        false
    }

    /// True when no point can be inside the region
    pub fn is_empty(&self) -> bool {
        !self.ops.iter().any(|op| matches!(op, RegionOp::Add(_)))
    }

    /// Bounding box of all added rectangles (may over-approximate)
    pub fn extents(&self) -> Rect {
        self.ops.iter().fold(Rect::default(), |acc, op| match op {
            RegionOp::Add(rect) => acc.bounding_box(rect),
            RegionOp::Subtract(_) => acc,
        })
    }

    pub fn ops(&self) -> &[RegionOp] {
        &self.ops
    }
}

/// Accumulated damage for one commit.
///
/// Rectangles are coalesced whenever their bounding box costs no more area
/// than keeping them apart, and the whole set collapses to its bounding box
/// once it grows past the rectangle limit. Every operation only ever grows
/// the covered area, so the result is always a superset of what was added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageSet {
    rects: Vec<Rect>,
    limit: usize,
}

impl Default for DamageSet {
    fn default() -> Self {
        DamageSet::new(DEFAULT_DAMAGE_RECT_LIMIT)
    }
}

impl DamageSet {
    pub fn new(limit: usize) -> Self {
        DamageSet {
            rects: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Add damage. Parts beyond the coordinate range lie outside any
    /// surface and are dropped, so bounding boxes never saturate.
    pub fn add(&mut self, rect: Rect) {
        let mut merged = rect.clamped();
        if merged.is_empty() {
            return;
        }
        loop {
            let candidate = self.rects.iter().position(|existing| {
                existing.contains_rect(&merged)
                    || merged.bounding_box(existing).area() <= existing.area() + merged.area()
            });
            match candidate {
                Some(index) => {
                    let existing = self.rects.swap_remove(index);
                    if existing.contains_rect(&merged) {
                        merged = existing;
                    } else {
                        merged = merged.bounding_box(&existing);
                    }
                }
                None => break,
            }
        }
        self.rects.push(merged);

        if self.rects.len() > self.limit {
            let bounds = self.bounding_box();
            self.rects.clear();
            self.rects.push(bounds);
        }
    }

    pub fn extend(&mut self, other: &DamageSet) {
        for rect in &other.rects {
            self.add(*rect);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn bounding_box(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, rect| acc.bounding_box(rect))
    }

    /// Clip every rectangle to `bounds`, dropping the ones outside
    pub fn clip(&mut self, bounds: Rect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|rect| rect.intersection(&bounds))
            .collect();
    }

    pub fn take(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.rects)
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(set: &DamageSet, x: i32, y: i32) -> bool {
        set.rects()
            .iter()
            .any(|r| r.contains_point(Point::new(x as f64 + 0.5, y as f64 + 0.5)))
    }

    #[test]
    fn test_region_add_subtract() {
        let mut region = Region::from_rect(Rect::new(0, 0, 100, 100));
        region.subtract(Rect::new(10, 10, 10, 10));
        assert!(region.contains_point(Point::new(5.0, 5.0)));
        assert!(!region.contains_point(Point::new(15.0, 15.0)));
        region.add(Rect::new(12, 12, 2, 2));
        assert!(region.contains_point(Point::new(13.0, 13.0)));
        assert!(!region.contains_point(Point::new(150.0, 5.0)));
    }

    #[test]
    fn test_empty_region() {
        let mut region = Region::new();
        assert!(region.is_empty());
        region.subtract(Rect::new(0, 0, 5, 5));
        assert!(region.is_empty());
        assert!(!region.contains_point(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_overlapping_damage_merges() {
        let mut damage = DamageSet::default();
        damage.add(Rect::new(0, 0, 10, 10));
        damage.add(Rect::new(5, 0, 10, 10));
        assert_eq!(damage.rects(), &[Rect::new(0, 0, 15, 10)]);
    }

    #[test]
    fn test_distant_damage_stays_separate() {
        let mut damage = DamageSet::default();
        damage.add(Rect::new(0, 0, 10, 10));
        damage.add(Rect::new(100, 100, 10, 10));
        assert_eq!(damage.rects().len(), 2);
    }

    #[test]
    fn test_contained_damage_is_absorbed() {
        let mut damage = DamageSet::default();
        damage.add(Rect::new(0, 0, 50, 50));
        damage.add(Rect::new(10, 10, 5, 5));
        assert_eq!(damage.rects(), &[Rect::new(0, 0, 50, 50)]);
    }

    #[test]
    fn test_damage_collapses_past_limit_and_stays_superset() {
        let mut damage = DamageSet::new(4);
        let inputs: Vec<Rect> = (0..6).map(|i| Rect::new(i * 40, i * 40, 5, 5)).collect();
        for rect in &inputs {
            damage.add(*rect);
        }
        assert!(damage.rects().len() <= 4);
        for rect in &inputs {
            for x in rect.x..rect.x + rect.width {
                for y in rect.y..rect.y + rect.height {
                    assert!(covered(&damage, x, y), "({}, {}) lost", x, y);
                }
            }
        }
    }

    #[test]
    fn test_extreme_damage_keeps_its_visible_part() {
        let mut damage = DamageSet::default();
        damage.add(Rect::new(i32::MIN, 0, i32::MAX, 1));
        damage.add(Rect::new(0, 0, 100, 1));
        damage.add(Rect::new(0, 5, i32::MAX, i32::MAX));
        damage.clip(Rect::from_size(100, 100));
        for x in 0..100 {
            assert!(covered(&damage, x, 0), "({}, 0) lost", x);
            assert!(covered(&damage, x, 50), "({}, 50) lost", x);
        }
    }

    #[test]
    fn test_clip() {
        let mut damage = DamageSet::default();
        damage.add(Rect::new(-10, -10, 30, 30));
        damage.clip(Rect::from_size(15, 15));
        assert_eq!(damage.rects(), &[Rect::new(0, 0, 15, 15)]);
    }
}
