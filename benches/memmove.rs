use core::ffi::c_void;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use fastmem::memmove::{MovePlan, move_with, plan_move};
use fastmem::{Capabilities, Config, Dispatcher};
use std::time::Duration;

unsafe extern "C" {
    #[link_name = "memmove"]
    fn libc_memmove(dest: *mut c_void, src: *const c_void, n: usize) -> *mut c_void;
}

/// Source and destination offsets inside one buffer, measured from a
/// 64-byte boundary.
struct MoveCase {
    label: String,
    len: usize,
    src_at: usize,
    dst_at: usize,
}

impl MoveCase {
    /// Disjoint ranges: the move is a plain copy through the dispatcher.
    fn disjoint(len: usize, src_shift: usize, dst_shift: usize) -> Self {
        let dst_at = 64 + dst_shift;
        MoveCase {
            label: format!("disjoint_{len}_s{src_shift}_d{dst_shift}"),
            len,
            src_at: dst_at - dst_shift + ((len + 127) & !63) + src_shift,
            dst_at,
        }
    }

    /// `dst = src + k`: overlapping ranges for small `|k| < len`.
    fn shifted(len: usize, k: isize) -> Self {
        let src_at = 256usize;
        MoveCase {
            label: format!("overlap_{len}_k{k}"),
            len,
            src_at,
            dst_at: src_at.wrapping_add_signed(k),
        }
    }

    fn buffer_len(&self) -> usize {
        self.src_at.max(self.dst_at) + self.len + 64
    }
}

fn cases() -> Vec<MoveCase> {
    let mut cases = Vec::new();

    // Vector minimum, misaligned-destination minimum and the cache check
    // bound, with a co-aligned pair and a misaligned destination.
    for len in [1023usize, 1024, 3999, 4000, 31999, 32000, 32001] {
        cases.push(MoveCase::disjoint(len, 0, 0));
        cases.push(MoveCase::disjoint(len, 11, 3));
    }
    // Odd relative shift around the composite-strategy minimum.
    for len in [15999usize, 16000, 16064, 262144] {
        cases.push(MoveCase::disjoint(len, 12, 5));
    }

    for len in [64usize, 65, 300, 4096, 65536, 1 << 20] {
        for k in [-100isize, -1, 1, 100] {
            cases.push(MoveCase::shifted(len, k));
        }
    }

    cases
}

fn memmove_benches(c: &mut Criterion) {
    let caps = Capabilities::get();
    let with_avx2 = Dispatcher::new(&Config::default(), caps);
    let portable_only = Dispatcher::new(
        &Config {
            avx2: false,
            ..Config::default()
        },
        caps,
    );

    let mut group = c.benchmark_group("memmove");
    group.sample_size(30);
    group.warm_up_time(Duration::from_millis(250));
    group.measurement_time(Duration::from_millis(700));

    for case in cases() {
        let mut buf: Vec<u8> = (0..case.buffer_len() + 64).map(|i| (i % 251) as u8).collect();
        let base = unsafe { buf.as_mut_ptr().add(buf.as_ptr().align_offset(64)) };
        let src = unsafe { base.add(case.src_at) };
        let dst = unsafe { base.add(case.dst_at) };

        let plan = plan_move(dst as usize, src as usize, case.len);
        let label = format!("{}_{plan:?}", case.label);
        group.throughput(Throughput::Bytes(case.len as u64));

        group.bench_with_input(BenchmarkId::new("glibc", &label), &case.len, |b, &n| {
            b.iter(|| unsafe {
                libc_memmove(black_box(dst.cast()), black_box(src.cast()), black_box(n));
                black_box(core::ptr::read_volatile(dst));
            });
        });

        for (name, d) in [("avx2", &with_avx2), ("portable", &portable_only)] {
            // Disjoint moves never reach the AVX2 overlap loops.
            if plan == MovePlan::Copy && name == "portable" {
                continue;
            }
            group.bench_with_input(BenchmarkId::new(name, &label), &case.len, |b, &n| {
                b.iter(|| unsafe {
                    move_with(d, black_box(dst), black_box(src), black_box(n));
                    black_box(core::ptr::read_volatile(dst));
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, memmove_benches);
criterion_main!(benches);
