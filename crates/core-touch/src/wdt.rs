//! Weighted distance transform: propagate ownership out from a set of seed
//! pixels (accepted local maxima) over a cost field, bounded by connected
//! component membership so one maximum's basin never crosses into another
//! component's territory.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use core_math::{Image, Index2};

const UNASSIGNED: u16 = u16::MAX;

/// A queued pixel: lower cost pops first, ties broken by lower linear index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    cost: f32,
    index: usize,
    owner: u16,
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Run the transform. `obj` is the objective field, `labels` the connected
/// components obj was thresholded into, `seeds` the (linear index, owner id)
/// pairs to grow from. `owner` is filled with each pixel's owning seed id
/// (`UNASSIGNED` sentinel where no seed's basin reached it).
pub fn run(obj: &Image<f32>, labels: &Image<u16>, seeds: &[(usize, u16)], owner: &mut Image<u16>) {
    let size = obj.size();
    owner.resize(size);
    owner.fill(UNASSIGNED);

    let mut cost: Image<f32> = Image::new(size);
    cost.fill(f32::INFINITY);

    let mut heap = BinaryHeap::new();
    for &(index, id) in seeds {
        cost[index] = 0.0;
        owner[index] = id;
        heap.push(Entry { cost: 0.0, index, owner: id });
    }

    let width = size.x as usize;
    let stride = width;
    let span = size.span() as usize;

    while let Some(Entry { cost: c, index, owner: id }) = heap.pop() {
        if c > cost[index] {
            continue;
        }

        let x = index % width;
        let region = labels[index];

        let mut visit = |neighbor: Option<usize>, heap: &mut BinaryHeap<Entry>, cost: &mut Image<f32>, owner: &mut Image<u16>| {
            let Some(n) = neighbor else { return };
            if n >= span || labels[n] != region || region == 0 {
                return;
            }
            let step = 1.0 - obj[n];
            let next_cost = c + step.max(0.0);
            if next_cost < cost[n] {
                cost[n] = next_cost;
                owner[n] = id;
                heap.push(Entry { cost: next_cost, index: n, owner: id });
            }
        };

        let left = if x > 0 { Some(index - 1) } else { None };
        let right = if x + 1 < width { Some(index + 1) } else { None };
        let up = index.checked_sub(stride);
        let down = if index + stride < span { Some(index + stride) } else { None };

        visit(left, &mut heap, &mut cost, owner);
        visit(right, &mut heap, &mut cost, owner);
        visit(up, &mut heap, &mut cost, owner);
        visit(down, &mut heap, &mut cost, owner);
    }
}

pub const UNASSIGNED_OWNER: u16 = UNASSIGNED;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_seed_claims_its_whole_component() {
        let size = Index2::new(3, 3);
        let mut obj: Image<f32> = Image::new(size);
        obj.fill(1.0);
        let mut labels: Image<u16> = Image::new(size);
        labels.fill(1);
        let mut owner: Image<u16> = Image::new(size);

        run(&obj, &labels, &[(4, 0)], &mut owner);

        assert!(owner.iter().all(|&o| o == 0));
    }

    #[test]
    fn background_pixels_are_never_claimed() {
        let size = Index2::new(3, 1);
        let mut obj: Image<f32> = Image::new(size);
        obj.fill(1.0);
        let mut labels: Image<u16> = Image::new(size);
        labels[0] = 1;
        labels[1] = 0;
        labels[2] = 1;
        let mut owner: Image<u16> = Image::new(size);

        run(&obj, &labels, &[(0, 0)], &mut owner);

        assert_eq!(owner[0], 0);
        assert_eq!(owner[1], UNASSIGNED_OWNER);
        assert_eq!(owner[2], UNASSIGNED_OWNER);
    }

    #[test]
    fn closer_seed_wins_a_contested_pixel() {
        let size = Index2::new(5, 1);
        let mut obj: Image<f32> = Image::new(size);
        obj.fill(0.0);
        let mut labels: Image<u16> = Image::new(size);
        labels.fill(1);
        let mut owner: Image<u16> = Image::new(size);

        run(&obj, &labels, &[(0, 7), (4, 9)], &mut owner);

        assert_eq!(owner[0], 7);
        assert_eq!(owner[1], 7);
        assert_eq!(owner[3], 9);
        assert_eq!(owner[4], 9);
    }
}
