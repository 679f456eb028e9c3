#![allow(dead_code)]

use depsched::{
    atomic::JoinCounter,
    task::{ExecContext, Task, TaskHandle, TaskOptions, TaskRef},
};
use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering},
    },
};

// ---------------------------------------------------------------------------
// Fibonacci: fork-join through declared dependencies.
// ---------------------------------------------------------------------------

/// Indices up to this one are computed by direct recursion.
pub const FIB_THRESHOLD: u32 = 16;

pub fn serial_fib(n: u32) -> u64 {
    if n < 2 {
        u64::from(n)
    } else {
        serial_fib(n - 1) + serial_fib(n - 2)
    }
}

#[derive(Debug, Default)]
pub struct FibCounters {
    pub created: AtomicUsize,
    pub executed: AtomicUsize,
}

/// Above the threshold, the two sub-problems are separate tasks created up
/// front and exposed as dependencies.
pub struct Fibonacci {
    n: u32,
    pub result: u64,
    children: Option<[TaskHandle<Fibonacci>; 2]>,
    counters: Arc<FibCounters>,
}

impl Fibonacci {
    pub fn new(n: u32, counters: &Arc<FibCounters>) -> Self {
        counters.created.fetch_add(1, Ordering::Relaxed);
        let children = (n > FIB_THRESHOLD).then(|| {
            [
                TaskHandle::new(Self::new(n - 1, counters)),
                TaskHandle::new(Self::new(n - 2, counters)),
            ]
        });
        Self {
            n,
            result: 0,
            children,
            counters: Arc::clone(counters),
        }
    }
}

impl Task for Fibonacci {
    fn execute(&mut self, cx: &ExecContext<'_>) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        self.result = match &self.children {
            None => serial_fib(self.n),
            Some(children) => {
                if cx.scheduler().is_none() {
                    for child in children {
                        child.run_inline();
                    }
                }
                children
                    .iter()
                    .map(|child| {
                        assert!(child.is_executed(), "fib({}) ran before its dependency", self.n);
                        child.get().expect("child completed").result
                    })
                    .sum()
            }
        };
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        self.children
            .iter()
            .flatten()
            .map(TaskHandle::as_task_ref)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Perlin noise: large independent fan-out sharing one join counter.
// ---------------------------------------------------------------------------

const PERMUTATIONS: [u8; 256] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
    142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
    203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
    220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
    132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
    186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
    59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
    70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
    178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
    241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
    176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
    128, 195, 78, 66, 215, 61, 156, 180,
];

fn perm(index: i32) -> i32 {
    i32::from(PERMUTATIONS[(index & 255) as usize])
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(t: f32, a: f32, b: f32) -> f32 {
    a + t * (b - a)
}

fn grad(hash: i32, x: f32, y: f32, z: f32) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

#[allow(clippy::cast_possible_truncation, clippy::many_single_char_names)]
fn noise3(mut x: f32, mut y: f32, mut z: f32) -> f32 {
    let (fx, fy, fz) = (x.floor() as i32, y.floor() as i32, z.floor() as i32);
    let (cx, cy, cz) = (fx & 255, fy & 255, fz & 255);
    x -= fx as f32;
    y -= fy as f32;
    z -= fz as f32;
    let (u, v, w) = (fade(x), fade(y), fade(z));
    let a = perm(cx) + cy;
    let (aa, ab) = (perm(a) + cz, perm(a + 1) + cz);
    let b = perm(cx + 1) + cy;
    let (ba, bb) = (perm(b) + cz, perm(b + 1) + cz);

    lerp(
        w,
        lerp(
            v,
            lerp(u, grad(perm(aa), x, y, z), grad(perm(ba), x - 1.0, y, z)),
            lerp(u, grad(perm(ab), x, y - 1.0, z), grad(perm(bb), x - 1.0, y - 1.0, z)),
        ),
        lerp(
            v,
            lerp(
                u,
                grad(perm(aa + 1), x, y, z - 1.0),
                grad(perm(ba + 1), x - 1.0, y, z - 1.0),
            ),
            lerp(
                u,
                grad(perm(ab + 1), x, y - 1.0, z - 1.0),
                grad(perm(bb + 1), x - 1.0, y - 1.0, z - 1.0),
            ),
        ),
    )
}

/// 16-octave noise value of one pixel.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn perlin_pixel(x: usize, y: usize) -> u8 {
    let mut result = 0.0_f32;
    let mut scale = 0.001_f32;
    let mut weight = 1.0_f32;
    for _ in 0..16 {
        result += noise3(x as f32 * scale, y as f32 * scale, 1.0) * weight;
        scale *= 2.0;
        weight *= 0.5;
    }
    ((result * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0) as u8
}

pub fn new_image(width: usize, height: usize) -> Arc<[AtomicU8]> {
    (0..width * height).map(|_| AtomicU8::new(0)).collect()
}

pub fn image_bytes(image: &[AtomicU8]) -> Vec<u8> {
    image.iter().map(|px| px.load(Ordering::Relaxed)).collect()
}

/// Renders the `width`×`height` rectangle at (`x`, `y`) of an image whose
/// rows are `stride` pixels long.
pub struct PerlinTile {
    pub image: Arc<[AtomicU8]>,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

impl Task for PerlinTile {
    fn execute(&mut self, _cx: &ExecContext<'_>) {
        for py in self.y..self.y + self.height {
            for px in self.x..self.x + self.width {
                self.image[py * self.stride + px].store(perlin_pixel(px, py), Ordering::Relaxed);
            }
        }
    }
}

/// Renders `grid`×`grid` tiles of `tile`×`tile` pixels in parallel and returns
/// the image.
///
/// Tile 0 carries the wait event; every other tile joins tile 0's own join
/// counter, so tile 0 is fully executed only once all tiles are.
pub fn render_tiled(handle: &depsched::scheduler::Handle, grid: usize, tile: usize) -> Vec<u8> {
    let side = grid * tile;
    let image = new_image(side, side);
    let tile_at = |index: usize| PerlinTile {
        image: Arc::clone(&image),
        x: (index % grid) * tile,
        y: (index / grid) * tile,
        width: tile,
        height: tile,
        stride: side,
    };
    let first = TaskHandle::with_options(tile_at(0), TaskOptions::new().with_wait_event());
    let rest: Vec<_> = (1..grid * grid)
        .map(|index| {
            TaskHandle::with_options(
                tile_at(index),
                TaskOptions::new().with_exec_counter(first.join_counter()),
            )
        })
        .collect();
    handle.add_task(&first);
    for task in &rest {
        handle.add_task(task);
    }
    first.sync().expect("tile 0 must not fail");
    assert!(rest.iter().all(TaskHandle::is_executed));
    image_bytes(&image)
}

/// Renders the same image as [`render_tiled`] on the calling thread.
pub fn render_serial(side: usize) -> Vec<u8> {
    let image = new_image(side, side);
    let task = TaskHandle::new(PerlinTile {
        image: Arc::clone(&image),
        x: 0,
        y: 0,
        width: side,
        height: side,
        stride: side,
    });
    task.run_inline();
    image_bytes(&image)
}

// ---------------------------------------------------------------------------
// Quicksort: recursive spawning of scheduler-owned subtasks.
// ---------------------------------------------------------------------------

pub const SORT_THRESHOLD: usize = 65_536;

/// Sorts `range` of `data`. Above `threshold`, partitions once and spawns one
/// scheduler-owned task per side; every descendant joins the root's counter.
pub struct QuickSort {
    data: Arc<[AtomicI32]>,
    range: Range<usize>,
    threshold: usize,
}

impl QuickSort {
    pub fn new(data: Arc<[AtomicI32]>, threshold: usize) -> Self {
        let range = 0..data.len();
        Self {
            data,
            range,
            threshold,
        }
    }

    fn sort_serial(&self) {
        let slice = &self.data[self.range.clone()];
        let mut values: Vec<i32> = slice.iter().map(|v| v.load(Ordering::Relaxed)).collect();
        values.sort_unstable();
        for (slot, value) in slice.iter().zip(values) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    /// Lomuto partition around the middle element. Returns the pivot's final
    /// index.
    fn partition(&self) -> usize {
        let data = &self.data;
        let Range { start, end } = self.range;
        let last = end - 1;
        let swap = |a: usize, b: usize| {
            let tmp = data[a].load(Ordering::Relaxed);
            data[a].store(data[b].load(Ordering::Relaxed), Ordering::Relaxed);
            data[b].store(tmp, Ordering::Relaxed);
        };
        swap(start + (end - start) / 2, last);
        let pivot = data[last].load(Ordering::Relaxed);
        let mut store = start;
        for i in start..last {
            if data[i].load(Ordering::Relaxed) < pivot {
                swap(i, store);
                store += 1;
            }
        }
        swap(store, last);
        store
    }
}

impl Task for QuickSort {
    fn execute(&mut self, cx: &ExecContext<'_>) {
        let Some(scheduler) = cx.scheduler() else {
            self.sort_serial();
            return;
        };
        if self.range.len() <= self.threshold {
            self.sort_serial();
            return;
        }
        let pivot = self.partition();
        let counter: JoinCounter = cx.completion_counter();
        for range in [self.range.start..pivot, pivot + 1..self.range.end] {
            if range.is_empty() {
                continue;
            }
            scheduler.spawn(
                Self {
                    data: Arc::clone(&self.data),
                    range,
                    threshold: self.threshold,
                },
                TaskOptions::new().with_exec_counter(counter.clone()),
            );
        }
    }
}

/// Deterministic pseudo-random integers.
pub fn random_values(len: usize, seed: u64) -> Vec<i32> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            #[allow(clippy::cast_possible_truncation)]
            let value = (state >> 33) as i32;
            value
        })
        .collect()
}

pub fn to_atomic(values: &[i32]) -> Arc<[AtomicI32]> {
    values.iter().map(|&v| AtomicI32::new(v)).collect()
}

pub fn from_atomic(values: &[AtomicI32]) -> Vec<i32> {
    values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
}

// ---------------------------------------------------------------------------
// Small helpers.
// ---------------------------------------------------------------------------

/// Runs a closure as a task body.
pub struct FnTask<F>(F);

impl<F> FnTask<F>
where
    F: FnMut(&ExecContext<'_>) + Send + Sync + 'static,
{
    pub fn new(body: F) -> Self {
        Self(body)
    }
}

impl<F: FnMut(&ExecContext<'_>) + Send + Sync + 'static> Task for FnTask<F> {
    fn execute(&mut self, cx: &ExecContext<'_>) {
        (self.0)(cx);
    }
}

/// A task that records its name when it runs and checks that every
/// dependency was already executed.
pub struct Recorder {
    pub name: &'static str,
    pub log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    pub dependencies: Vec<TaskRef>,
}

impl Task for Recorder {
    fn execute(&mut self, _cx: &ExecContext<'_>) {
        for dependency in &self.dependencies {
            assert!(dependency.is_executed(), "{} ran before a dependency", self.name);
        }
        self.log.lock().unwrap().push(self.name);
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        self.dependencies.clone()
    }
}
