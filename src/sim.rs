use crate::density::{parse_override, DensityTable};
use crate::dir_field::{reverse, DirField2, DELTAS};
use crate::error::SimError;
use crate::field::Field2;
use crate::grid::Grid2;
use crate::numeric::{cast, Num};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::PathBuf;

pub const DEFAULT_SEED: u64 = 1337;

const WALL: u8 = b'#';
const DAMPING_SPECIES: u8 = b'.';
const DAMPING_FACTOR: f64 = 0.8;
// Index of (1, 0) in DELTAS.
const SOUTH: usize = 1;
const MAX_MOVE_DEPTH: usize = 1000;

#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    pub interval: usize,
    pub path: PathBuf,
}

/// Cellular fluid engine over three independently configured numeric
/// slots: pressure `P`, velocity `V`, velocity flow `VF`.
#[derive(Debug)]
pub struct Simulator<P: Num, V: Num, VF: Num> {
    grid: Grid2,
    cells: Field2<u8>,
    p: Field2<P>,
    old_p: Field2<P>,
    velocity: DirField2<V>,
    velocity_flow: DirField2<VF>,
    last_use: Field2<u64>,
    dirs: Field2<u32>,
    rho: DensityTable<P>,
    g: P,
    ut: u64,
    rng: ChaCha8Rng,
}

impl<P: Num, V: Num, VF: Num> Simulator<P, V, VF> {
    pub fn from_description(lines: &[String]) -> Result<Self, SimError> {
        Self::with_seed(lines, DEFAULT_SEED)
    }

    pub fn with_seed(lines: &[String], seed: u64) -> Result<Self, SimError> {
        if lines.len() < 2 {
            return Err(SimError::InvalidGrid("missing header".into()));
        }
        let (rows, cols) = parse_extents(&lines[0])?;
        let g = lines[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| SimError::InvalidGrid(format!("bad gravity line: {:?}", lines[1])))?;
        let grid = Grid2::new(rows, cols);
        if lines.len() < 2 + rows {
            return Err(SimError::InvalidGrid(format!(
                "expected {rows} field rows, got {}",
                lines.len() - 2
            )));
        }
        let cells = parse_field_rows(grid, &lines[2..2 + rows])?;
        let mut rho = DensityTable::new();
        for line in &lines[2 + rows..] {
            if let Some((species, value)) = parse_override(line) {
                rho.set(species, P::from_f64(value));
            }
        }
        let sim = Self {
            grid,
            dirs: neighbor_counts(&cells),
            cells,
            p: Field2::new(grid, P::zero()),
            old_p: Field2::new(grid, P::zero()),
            velocity: DirField2::new(grid),
            velocity_flow: DirField2::new(grid),
            last_use: Field2::new(grid, 0),
            rho,
            g: P::from_f64(g),
            ut: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        sim.log_summary();
        Ok(sim)
    }

    fn log_summary(&self) {
        info!(
            "loaded {}x{} field, gravity {}",
            self.grid.rows(),
            self.grid.cols(),
            self.g
        );
        for (species, value) in self.rho.overrides() {
            info!("density '{}' = {}", species as char, value);
        }
    }

    fn is_wall(&self, x: usize, y: usize) -> bool {
        self.cells.get(x, y) == WALL
    }

    /// One complete tick. Returns whether any movement was initiated.
    pub fn tick(&mut self) -> bool {
        self.apply_gravity();
        self.apply_pressure_forces();
        self.spread_flow();
        self.settle_flow();
        self.apply_movement()
    }

    /// Drives `steps` ticks, printing the species grid after each tick
    /// that moved fluid and writing periodic checkpoints when asked.
    pub fn run(
        &mut self,
        steps: usize,
        checkpoint: Option<&CheckpointConfig>,
    ) -> Result<(), SimError> {
        for step in 0..steps {
            debug!("starting step {}", step + 1);
            let moved = self.tick();
            if moved {
                println!("Tick {}:", step + 1);
                self.print_field();
            }
            if let Some(cp) = checkpoint {
                if cp.interval > 0 && (step + 1) % cp.interval == 0 {
                    let mut out = BufWriter::new(File::create(&cp.path)?);
                    self.save_state(&mut out)?;
                }
            }
        }
        Ok(())
    }

    fn print_field(&self) {
        let cols = self.grid.cols();
        for x in 0..self.grid.rows() {
            let row = &self.cells.as_slice()[x * cols..(x + 1) * cols];
            println!("{}", String::from_utf8_lossy(row));
        }
    }

    fn apply_gravity(&mut self) {
        for x in 0..self.grid.rows() {
            for y in 0..self.grid.cols() {
                if self.is_wall(x, y) {
                    continue;
                }
                // Only an in-bounds wall below suppresses gravity.
                if x + 1 < self.grid.rows() && self.cells.get(x + 1, y) == WALL {
                    continue;
                }
                let south = self.velocity.at(x, y, SOUTH) + cast::<P, V>(self.g);
                *self.velocity.at_mut(x, y, SOUTH) = south;
            }
        }
    }

    fn apply_pressure_forces(&mut self) {
        self.old_p.copy_from(&self.p);
        for x in 0..self.grid.rows() {
            for y in 0..self.grid.cols() {
                if self.is_wall(x, y) {
                    continue;
                }
                for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
                    let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                        continue;
                    };
                    if self.is_wall(nx, ny) || !(self.old_p.get(nx, ny) < self.old_p.get(x, y)) {
                        continue;
                    }
                    let mut force = self.old_p.get(x, y) - self.old_p.get(nx, ny);
                    let rev = reverse(dir);
                    let contr = self.velocity.at(nx, ny, rev);
                    let rho_n = self.rho.get(self.cells.get(nx, ny));
                    if cast::<V, P>(contr) * rho_n >= force {
                        *self.velocity.at_mut(nx, ny, rev) = contr - cast::<P, V>(force / rho_n);
                        continue;
                    }
                    force = force - cast::<V, P>(contr) * rho_n;
                    *self.velocity.at_mut(nx, ny, rev) = V::zero();
                    let rho_s = self.rho.get(self.cells.get(x, y));
                    *self.velocity.at_mut(x, y, dir) =
                        self.velocity.at(x, y, dir) + cast::<P, V>(force / rho_s);
                    let dp = force / P::from_f64(self.dirs.get(x, y) as f64);
                    *self.p.get_mut(x, y) = self.p.get(x, y) - dp;
                }
            }
        }
    }

    /// Phase C sweeps: repeat full-grid flow propagation until no call
    /// commits any more flow.
    fn spread_flow(&mut self) {
        self.velocity_flow.reset();
        loop {
            self.ut += 2;
            let mut any = false;
            for x in 0..self.grid.rows() {
                for y in 0..self.grid.cols() {
                    if self.is_wall(x, y) || self.last_use.get(x, y) == self.ut {
                        continue;
                    }
                    let (t, _, _) = self.propagate_flow(x, y, P::from_f64(1.0));
                    if t > P::zero() {
                        any = true;
                    }
                }
            }
            if !any {
                break;
            }
        }
    }

    /// Overwrites positive velocities with the committed flow and
    /// credits the released force back to pressure.
    fn settle_flow(&mut self) {
        for x in 0..self.grid.rows() {
            for y in 0..self.grid.cols() {
                if self.is_wall(x, y) {
                    continue;
                }
                for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
                    let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                        continue;
                    };
                    let old_v = self.velocity.at(x, y, dir);
                    let new_v = self.velocity_flow.at(x, y, dir);
                    if !(old_v > V::zero()) {
                        continue;
                    }
                    debug_assert!(new_v <= cast::<V, VF>(old_v));
                    *self.velocity.at_mut(x, y, dir) = cast::<VF, V>(new_v);
                    let mut force =
                        (cast::<V, P>(old_v) - cast::<VF, P>(new_v)) * self.rho.get(self.cells.get(x, y));
                    if self.cells.get(x, y) == DAMPING_SPECIES {
                        force = force.scale(DAMPING_FACTOR);
                    }
                    if self.is_wall(nx, ny) {
                        let dp = force / P::from_f64(self.dirs.get(x, y) as f64);
                        *self.p.get_mut(x, y) = self.p.get(x, y) + dp;
                    } else {
                        let dp = force / P::from_f64(self.dirs.get(nx, ny) as f64);
                        *self.p.get_mut(nx, ny) = self.p.get(nx, ny) + dp;
                    }
                }
            }
        }
    }

    fn propagate_flow(&mut self, x: usize, y: usize, lim: P) -> (P, bool, (usize, usize)) {
        self.last_use.set(x, y, self.ut - 1);
        let mut ret = P::zero();
        for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
            let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                continue;
            };
            if self.is_wall(nx, ny) || self.last_use.get(nx, ny) >= self.ut {
                continue;
            }
            let cap = self.velocity.at(x, y, dir);
            let flow = self.velocity_flow.at(x, y, dir);
            if flow == cast::<V, VF>(cap) {
                continue;
            }
            let residual = cast::<V, VF>(cap) - flow;
            let lim_vf = cast::<P, VF>(lim);
            let vp = if lim_vf < residual { lim_vf } else { residual };
            if self.last_use.get(nx, ny) == self.ut - 1 {
                // Neighbor is on the current recursion frontier; commit.
                *self.velocity_flow.at_mut(x, y, dir) = flow + vp;
                self.last_use.set(x, y, self.ut);
                return (cast::<VF, P>(vp), true, (nx, ny));
            }
            let (t, prop, end) = self.propagate_flow(nx, ny, cast::<VF, P>(vp));
            ret = ret + t;
            if prop {
                *self.velocity_flow.at_mut(x, y, dir) =
                    self.velocity_flow.at(x, y, dir) + cast::<P, VF>(t);
                self.last_use.set(x, y, self.ut);
                return (t, end != (x, y), end);
            }
        }
        self.last_use.set(x, y, self.ut);
        (ret, false, (0, 0))
    }

    fn move_prob(&self, x: usize, y: usize) -> P {
        let mut sum = P::zero();
        for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
            let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                continue;
            };
            if self.is_wall(nx, ny) || self.last_use.get(nx, ny) == self.ut {
                continue;
            }
            let v = self.velocity.at(x, y, dir);
            if v > V::zero() {
                sum = sum + cast::<V, P>(v);
            }
        }
        sum
    }

    fn random01(&mut self) -> P {
        // Uniform draws enter the numeric domain through the flow slot.
        cast::<VF, P>(VF::from_f64(self.rng.gen::<f64>()))
    }

    fn apply_movement(&mut self) -> bool {
        self.ut += 2;
        let mut moved = false;
        for x in 0..self.grid.rows() {
            for y in 0..self.grid.cols() {
                if self.is_wall(x, y) || self.last_use.get(x, y) == self.ut {
                    continue;
                }
                let prob = self.move_prob(x, y);
                if self.random01() < prob {
                    moved = true;
                    self.propagate_move(x, y, true, 0);
                } else {
                    self.propagate_stop(x, y, true);
                }
            }
        }
        moved
    }

    fn propagate_stop(&mut self, x: usize, y: usize, force: bool) {
        if !force {
            for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
                let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                    continue;
                };
                if !self.is_wall(nx, ny)
                    && self.last_use.get(nx, ny) < self.ut - 1
                    && self.velocity.at(x, y, dir) > V::zero()
                {
                    // Still has outflow pressure somewhere; keep going.
                    return;
                }
            }
        }
        self.last_use.set(x, y, self.ut);
        for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
            let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                continue;
            };
            if self.is_wall(nx, ny)
                || self.last_use.get(nx, ny) == self.ut
                || self.velocity.at(x, y, dir) > V::zero()
            {
                continue;
            }
            self.propagate_stop(nx, ny, false);
        }
    }

    fn propagate_move(&mut self, x: usize, y: usize, first: bool, depth: usize) -> bool {
        self.last_use.set(x, y, self.ut - if first { 1 } else { 0 });
        if depth > MAX_MOVE_DEPTH {
            warn!("{}", SimError::MaxDepthExceeded(x, y));
            return false;
        }
        let mut ret = false;
        let mut target = (0usize, 0usize);
        loop {
            let mut thresholds = [VF::zero(); 4];
            let mut sum = VF::zero();
            let mut last_open = None;
            for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
                if let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) {
                    if !self.is_wall(nx, ny) && self.last_use.get(nx, ny) != self.ut {
                        let v = self.velocity.at(x, y, dir);
                        if v > V::zero() {
                            sum = sum + cast::<V, VF>(v);
                            last_open = Some(dir);
                        }
                    }
                }
                thresholds[dir] = sum;
            }
            if sum == VF::zero() {
                break;
            }
            let r = VF::from_f64(self.rng.gen::<f64>()) * sum;
            // In float configs r can round up to exactly sum; fall back
            // to the last direction that contributed.
            let Some(dir) = thresholds.iter().position(|&t| t > r).or(last_open) else {
                break;
            };
            let (dx, dy) = DELTAS[dir];
            let Some((tx, ty)) = self.grid.neighbor(x, y, dx, dy) else {
                continue;
            };
            target = (tx, ty);
            ret = self.last_use.get(tx, ty) == self.ut - 1
                || self.propagate_move(tx, ty, false, depth + 1);
            if ret {
                break;
            }
        }
        self.last_use.set(x, y, self.ut);
        for (dir, &(dx, dy)) in DELTAS.iter().enumerate() {
            let Some((nx, ny)) = self.grid.neighbor(x, y, dx, dy) else {
                continue;
            };
            if !self.is_wall(nx, ny)
                && self.last_use.get(nx, ny) < self.ut - 1
                && self.velocity.at(x, y, dir) < V::zero()
            {
                self.propagate_stop(nx, ny, false);
            }
        }
        if ret && !first {
            self.swap_cells(x, y, target.0, target.1);
        }
        ret
    }

    fn swap_cells(&mut self, ax: usize, ay: usize, bx: usize, by: usize) {
        let species = self.cells.get(ax, ay);
        self.cells.set(ax, ay, self.cells.get(bx, by));
        self.cells.set(bx, by, species);

        let pressure = self.p.get(ax, ay);
        self.p.set(ax, ay, self.p.get(bx, by));
        self.p.set(bx, by, pressure);

        let v = self.velocity.get_array(ax, ay);
        self.velocity.set_array(ax, ay, self.velocity.get_array(bx, by));
        self.velocity.set_array(bx, by, v);
    }

    pub fn save_state<W: Write + ?Sized>(&self, out: &mut W) -> Result<(), SimError> {
        writeln!(out, "{} {}", self.grid.rows(), self.grid.cols())?;
        writeln!(out, "{}", self.g)?;
        let cols = self.grid.cols();
        for x in 0..self.grid.rows() {
            let row = &self.cells.as_slice()[x * cols..(x + 1) * cols];
            out.write_all(row)?;
            out.write_all(b"\n")?;
        }
        for x in 0..self.grid.rows() {
            for y in 0..cols {
                writeln!(out, "{} {}", self.p.get(x, y), self.old_p.get(x, y))?;
            }
        }
        for x in 0..self.grid.rows() {
            for y in 0..cols {
                let v = self.velocity.get_array(x, y);
                writeln!(out, "{} {} {} {}", v[0], v[1], v[2], v[3])?;
            }
        }
        writeln!(out, "{}", self.ut)?;
        for (species, value) in self.rho.overrides() {
            writeln!(out, "{} = {}", species as char, value)?;
        }
        Ok(())
    }

    pub fn load_state<R: BufRead + ?Sized>(&mut self, input: &mut R) -> Result<(), SimError> {
        let lines = input
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(SimError::Io)?;
        if lines.len() < 2 {
            return Err(SimError::InvalidGrid("truncated state: missing header".into()));
        }
        let (rows, cols) = parse_extents(&lines[0])?;
        let g = P::parse(lines[1].trim())
            .ok_or_else(|| SimError::InvalidGrid(format!("bad gravity line: {:?}", lines[1])))?;
        let grid = Grid2::new(rows, cols);
        let fields_end = 2 + rows;
        let pressures_end = fields_end + rows * cols;
        let velocities_end = pressures_end + rows * cols;
        if lines.len() < velocities_end + 1 {
            return Err(SimError::InvalidGrid("truncated state".into()));
        }
        let cells = parse_field_rows(grid, &lines[2..fields_end])?;

        let mut p = Field2::new(grid, P::zero());
        let mut old_p = Field2::new(grid, P::zero());
        for (i, line) in lines[fields_end..pressures_end].iter().enumerate() {
            let mut tokens = line.split_whitespace();
            let cur = tokens
                .next()
                .and_then(P::parse)
                .ok_or_else(|| SimError::InvalidGrid(format!("bad pressure line: {line:?}")))?;
            let old = tokens
                .next()
                .and_then(P::parse)
                .ok_or_else(|| SimError::InvalidGrid(format!("bad pressure line: {line:?}")))?;
            p.set(i / cols, i % cols, cur);
            old_p.set(i / cols, i % cols, old);
        }

        let mut velocity = DirField2::new(grid);
        for (i, line) in lines[pressures_end..velocities_end].iter().enumerate() {
            let mut values = [V::zero(); 4];
            let mut tokens = line.split_whitespace();
            for value in values.iter_mut() {
                *value = tokens
                    .next()
                    .and_then(V::parse)
                    .ok_or_else(|| SimError::InvalidGrid(format!("bad velocity line: {line:?}")))?;
            }
            velocity.set_array(i / cols, i % cols, values);
        }

        let ut = lines[velocities_end]
            .trim()
            .parse::<u64>()
            .map_err(|_| SimError::InvalidGrid("bad tick counter".into()))?;

        let mut rho = DensityTable::new();
        for line in &lines[velocities_end + 1..] {
            if let Some((species, value)) = parse_override(line) {
                rho.set(species, P::from_f64(value));
            }
        }

        self.grid = grid;
        self.dirs = neighbor_counts(&cells);
        self.cells = cells;
        self.p = p;
        self.old_p = old_p;
        self.velocity = velocity;
        self.velocity_flow = DirField2::new(grid);
        self.last_use = Field2::new(grid, 0);
        self.rho = rho;
        self.g = g;
        self.ut = ut;
        self.log_summary();
        Ok(())
    }
}

fn parse_extents(line: &str) -> Result<(usize, usize), SimError> {
    let mut tokens = line.split_whitespace();
    let rows = tokens.next().and_then(|t| t.parse::<usize>().ok());
    let cols = tokens.next().and_then(|t| t.parse::<usize>().ok());
    match (rows, cols) {
        (Some(rows), Some(cols)) if rows > 0 && cols > 0 => Ok((rows, cols)),
        _ => Err(SimError::InvalidGrid(format!("bad extents line: {line:?}"))),
    }
}

fn parse_field_rows(grid: Grid2, lines: &[String]) -> Result<Field2<u8>, SimError> {
    let mut cells = Field2::new(grid, b' ');
    for (x, line) in lines.iter().enumerate() {
        let row = line.strip_suffix('\r').unwrap_or(line).as_bytes();
        if row.len() != grid.cols() {
            return Err(SimError::InvalidGrid(format!(
                "field row {x} has {} columns, expected {}",
                row.len(),
                grid.cols()
            )));
        }
        for (y, &species) in row.iter().enumerate() {
            cells.set(x, y, species);
        }
    }
    Ok(cells)
}

fn neighbor_counts(cells: &Field2<u8>) -> Field2<u32> {
    let grid = cells.grid();
    Field2::from_fn(grid, |x, y| {
        if cells.get(x, y) == WALL {
            return 0;
        }
        let mut count = 0;
        for &(dx, dy) in &DELTAS {
            if let Some((nx, ny)) = grid.neighbor(x, y, dx, dy) {
                if cells.get(nx, ny) != WALL {
                    count += 1;
                }
            }
        }
        count
    })
}
