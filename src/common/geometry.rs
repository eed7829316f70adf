/// Component-wise difference `a - b`.
pub fn subtract(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

pub fn norm(v: [f64; 2]) -> f64 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// Euclidean distance between two points.
pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    norm(subtract(a, b))
}

/// Overlap of two closed intervals, or `None` when they are disjoint.
///
/// Touching intervals (`[0, 2]` and `[2, 5]`) overlap in the single point `[2, 2]`.
pub fn intersect_sets(a: [f64; 2], b: [f64; 2]) -> Option<[f64; 2]> {
    if a[0] <= b[0] && b[1] <= a[1] {
        return Some(b);
    }
    if b[0] <= a[0] && a[1] <= b[1] {
        return Some(a);
    }
    if a[0] <= b[0] && b[0] <= a[1] && a[1] <= b[1] {
        return Some([b[0], a[1]]);
    }
    if b[0] <= a[0] && a[0] <= b[1] && b[1] <= a[1] {
        return Some([a[0], b[1]]);
    }
    None
}

/// Insert `[e, f]` into `sets`, a sorted flat list of boundaries `[a, b, c, d, ..]` describing
/// the disjoint intervals `[a, b], [c, d], ..`.
///
/// Boundaries swallowed by the new interval are dropped, so overlapping intervals merge into
/// a single span and the result stays sorted.
pub fn union_all(sets: &[f64], set: [f64; 2]) -> Vec<f64> {
    let first = sets.partition_point(|&v| v < set[0]);
    let second = sets.partition_point(|&v| v < set[1]);

    // An even insertion index falls in a gap, an odd one inside an existing interval.
    let middle: &[f64] = match (first % 2 == 1, second % 2 == 1) {
        (true, false) => &set[1..],
        (false, false) => &set[..],
        (false, true) => &set[..1],
        (true, true) => &[],
    };

    let mut merged = Vec::with_capacity(first + middle.len() + sets.len() - second);
    merged.extend_from_slice(&sets[..first]);
    merged.extend_from_slice(middle);
    merged.extend_from_slice(&sets[second..]);
    merged
}

/// A grid cell crossed by a segment, with the distances from the segment's start at which
/// the segment enters and leaves it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSegment {
    pub x: i64,
    pub y: i64,
    pub dist: [f64; 2],
}

/// Trace the segment `(x0, y0) -> (x1, y1)` through the unit grid.
///
/// Cells come back in traversal order. `distance` is the segment length the sub-intervals are
/// scaled to. Axis-aligned segments never advance along their zero axis (the crossing time is
/// infinite), and a segment ending exactly on a grid line does not report the cell beyond it.
pub fn line_seg_on_grid(x0: f64, y0: f64, x1: f64, y1: f64, distance: f64) -> Vec<GridSegment> {
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();

    let mut x = x0.floor() as i64;
    let mut y = y0.floor() as i64;

    let dtdx = 1.0 / dx;
    let dtdy = 1.0 / dy;

    let mut n: i64 = 1;
    let (x_inc, mut t_next_horizontal) = if dx == 0.0 {
        (0, f64::INFINITY)
    } else if x1 > x0 {
        n += x1.floor() as i64 - x;
        (1, (x as f64 + 1.0 - x0) * dtdx)
    } else {
        n += x - x1.floor() as i64;
        (-1, (x0 - x as f64) * dtdx)
    };
    let (y_inc, mut t_next_vertical) = if dy == 0.0 {
        (0, f64::INFINITY)
    } else if y1 > y0 {
        n += y1.floor() as i64 - y;
        (1, (y as f64 + 1.0 - y0) * dtdy)
    } else {
        n += y - y1.floor() as i64;
        (-1, (y0 - y as f64) * dtdy)
    };

    let mut grids = Vec::with_capacity(n.max(1) as usize);
    let mut d0 = 0.0;
    for _ in 0..n {
        if !grids.is_empty() && d0 >= distance {
            break;
        }
        let d1 = distance * t_next_horizontal.min(t_next_vertical).min(1.0);
        grids.push(GridSegment { x, y, dist: [d0, d1] });
        d0 = d1;

        if t_next_horizontal > t_next_vertical {
            y += y_inc;
            t_next_vertical += dtdy;
        } else {
            x += x_inc;
            t_next_horizontal += dtdx;
        }
    }
    grids
}

fn examine<F>(is_passable: &mut F, examined: &mut usize, x: i64, y: i64) -> bool
where
    F: FnMut(i64, i64) -> bool,
{
    *examined += 1;
    !is_passable(x, y)
}

/// Walk the cells between `(x0, y0)` and `(x1, y1)` and report whether the segment is clear.
///
/// A segment is blocked by any impassable cell on its path, or by passing exactly through a
/// corner whose two side cells are both impassable. `is_passable` must return `false` for
/// cells outside the grid. The second value is the number of cells examined.
pub fn line_of_sight_grid<F>(x0: f64, y0: f64, x1: f64, y1: f64, mut is_passable: F) -> (bool, usize)
where
    F: FnMut(i64, i64) -> bool,
{
    let mut examined = 0;
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();

    let mut x = x0.floor() as i64;
    let mut y = y0.floor() as i64;

    let on_lattice = x0.fract() == 0.0 && y0.fract() == 0.0;
    if x0.fract() != 0.0 && y0.fract() != 0.0 && examine(&mut is_passable, &mut examined, x, y) {
        return (false, examined);
    }
    if on_lattice && x1 > x0 && y1 > y0 && examine(&mut is_passable, &mut examined, x, y) {
        return (false, examined);
    }

    let mut n: i64 = 1;
    let mut error;
    let x_inc;
    let y_inc;

    if dx == 0.0 {
        x_inc = 0;
        error = f64::INFINITY;
    } else if x1 > x0 {
        x_inc = 1;
        n += x1.floor() as i64 - x;
        error = (x as f64 + 1.0 - x0) * dy;
    } else {
        x_inc = -1;
        n += x - x1.floor() as i64;
        error = (x0 - x as f64) * dy;
    }

    if dy == 0.0 {
        y_inc = 0;
        error = f64::NEG_INFINITY;
    } else if y1 > y0 {
        y_inc = 1;
        n += y1.floor() as i64 - y;
        error -= (y as f64 + 1.0 - y0) * dx;
    } else {
        y_inc = -1;
        n += y - y1.floor() as i64;
        error -= (y0 - y as f64) * dx;
    }

    n -= 1;
    while n > 0 {
        if error > 0.0 {
            y += y_inc;
            error -= dx;
        } else if error < 0.0 {
            x += x_inc;
            error += dy;
        } else {
            // Exactly through a corner: both side cells blocked closes the gap.
            if examine(&mut is_passable, &mut examined, x + x_inc, y)
                && examine(&mut is_passable, &mut examined, x, y + y_inc)
            {
                return (false, examined);
            }
            x += x_inc;
            error += dy;
            y += y_inc;
            error -= dx;
            n -= 1;
        }
        if examine(&mut is_passable, &mut examined, x, y) {
            return (false, examined);
        }
        n -= 1;
    }
    (true, examined)
}
