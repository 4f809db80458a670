//! Two-pass Fiorio-Gustedt union-find connected-component labeling.
//!
//! Background cells get label 0; foreground components are numbered 1..N in
//! order of their root's linear index. 4- or 8-connectivity is a compile-time
//! choice (`CONN` is 4 or 8), matching the original's `template<int C = 4>`.
//!
//! Reference: Christophe Fiorio and Jens Gustedt, "Two linear time Union-Find
//! strategies for image processing", Theoretical Computer Science 154 (1996).

use core_math::{Image, Index2};

const BACKGROUND_NONE: u16 = u16::MAX;

fn is_root(forest: &Image<u16>, idx: usize) -> bool {
    idx as u16 == forest[idx]
}

fn find_root(forest: &Image<u16>, mut idx: usize) -> usize {
    while !is_root(forest, idx) {
        idx = forest[idx] as usize;
    }
    idx
}

fn set_root(forest: &mut Image<u16>, mut idx: usize, new_root: u16) {
    while !is_root(forest, idx) {
        let next = forest[idx] as usize;
        forest[idx] = new_root;
        idx = next;
    }
    forest[idx] = new_root;
}

/// Merge the tree rooted (indirectly) at `t1_index`/`t1_root` with whatever
/// tree owns `t2_index`, unless `t2_index` is background. Returns the
/// (index, root) pair to keep chaining further neighbor merges from.
fn merge(forest: &mut Image<u16>, t1_index: usize, t1_root: u16, t2_index: usize, bg: u16) -> (usize, u16) {
    if forest[t2_index] == bg {
        return (t1_index, t1_root);
    }

    let t2_root = find_root(forest, t2_index) as u16;
    if t2_root < t1_root {
        set_root(forest, t1_index, t2_root);
        (t2_index, t2_root)
    } else if t1_root < t2_root {
        set_root(forest, t2_index, t1_root);
        (t1_index, t1_root)
    } else {
        (t1_index, t1_root)
    }
}

fn resolve(forest: &mut Image<u16>, background: u16) -> u16 {
    let mut n_labels: u16 = 0;
    let span = forest.size().span() as usize;
    for i in 0..span {
        if i as u16 == background {
            forest[i] = 0;
            continue;
        }
        if is_root(forest, i) {
            n_labels += 1;
            forest[i] = n_labels;
        } else {
            let root = forest[i] as usize;
            forest[i] = forest[root];
        }
    }
    n_labels
}

fn find_background<T: PartialOrd + Copy>(data: &Image<T>, threshold: T) -> u16 {
    let span = data.size().span() as usize;
    for i in 0..span {
        if data[i] <= threshold {
            return i as u16;
        }
    }
    BACKGROUND_NONE
}

/// Label `data` (thresholded at `threshold`) into `out`, overwriting it.
/// Returns the number of foreground components found. `CONN` must be 4 or 8.
pub fn label<const CONN: usize, T: PartialOrd + Copy>(
    out: &mut Image<u16>,
    data: &Image<T>,
    threshold: T,
) -> u16 {
    assert!(CONN == 4 || CONN == 8, "connectivity must be 4 or 8");
    let size = data.size();
    out.resize(size);

    if size.span() == 0 {
        return 0;
    }

    let stride = data.stride() as usize;
    let background = find_background(data, threshold);

    let span = size.span() as usize;
    let width = size.x as usize;

    // Pass 1: build the union-find forest.
    out[0] = 0;

    let mut i = 1usize;
    // y == 0 row: only a left neighbor is possible.
    while i < width {
        if data[i] <= threshold {
            out[i] = background;
        } else {
            out[i] = i as u16;
            merge(out, i, i as u16, i - 1, background);
        }
        i += 1;
    }

    while i < span {
        // x == 0: no left / up-left neighbor.
        if data[i] <= threshold {
            out[i] = background;
        } else {
            out[i] = i as u16;
            let mut tr = (i, i as u16);
            tr = merge(out, tr.0, tr.1, i - stride, background);
            if CONN == 8 {
                merge(out, tr.0, tr.1, i - stride + 1, background);
            }
        }
        i += 1;

        let limit = i + width.saturating_sub(2);
        while i < limit {
            if data[i] <= threshold {
                out[i] = background;
                i += 1;
                continue;
            }
            out[i] = i as u16;
            let mut tr = (i, i as u16);
            tr = merge(out, tr.0, tr.1, i - 1, background);
            if CONN == 8 {
                tr = merge(out, tr.0, tr.1, i - stride - 1, background);
            }
            tr = merge(out, tr.0, tr.1, i - stride, background);
            if CONN == 8 {
                merge(out, tr.0, tr.1, i - stride + 1, background);
            }
            i += 1;
        }

        // x == width - 1: no right / up-right neighbor.
        if data[i] <= threshold {
            out[i] = background;
        } else {
            out[i] = i as u16;
            let mut tr = (i, i as u16);
            tr = merge(out, tr.0, tr.1, i - 1, background);
            if CONN == 8 {
                tr = merge(out, tr.0, tr.1, i - stride - 1, background);
            }
            merge(out, tr.0, tr.1, i - stride, background);
        }
        i += 1;
    }

    // Pass 2: resolve roots to dense labels.
    resolve(out, background)
}
