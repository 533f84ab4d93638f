//! Throughput benchmarks for the command framer.
//!
//! ## Running the benchmarks
//!
//! ```bash
//! cargo bench -p vortex-protocol
//! ```
//!
//! ## Benchmarks included
//!
//! - `fixed_commands/N` - Newline framing of a stream of short commands, chunked at N bytes
//! - `bulk_data/N` - Length-prefixed framing of 8 KiB data chunks, chunked at N bytes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vortex_protocol::{encode_variable, CommandFramer, TAG_DATA};

/// Packet sizes seen on the wire: tiny fragments up to the transport packet size.
const CHUNK_SIZES: [usize; 3] = [64, 512, 1024];

fn fixed_stream() -> Vec<u8> {
    let commands: [&[u8]; 3] = [b"VX!RATE 1/2\n", b"VX!POWERLEVEL 83\n", b"VX!BLOCKSIZE 34\n"];
    commands.iter().cycle().take(3000).flat_map(|c| c.iter().copied()).collect()
}

fn bulk_stream() -> Vec<u8> {
    let body: Vec<u8> = (0..8192).map(|i| (i % 256) as u8).collect();
    (0..16).flat_map(|_| encode_variable(TAG_DATA, &body)).collect()
}

fn bench_stream(c: &mut Criterion, name: &str, stream: &[u8]) {
    let mut group = c.benchmark_group(name);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in CHUNK_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), chunk_size, |b, &size| {
            b.iter(|| {
                let mut framer = CommandFramer::new();
                let mut count = 0;
                for chunk in stream.chunks(size) {
                    count += framer.process(chunk).len();
                }
                black_box(count)
            });
        });
    }

    group.finish();
}

fn bench_fixed_commands(c: &mut Criterion) {
    bench_stream(c, "fixed_commands", &fixed_stream());
}

fn bench_bulk_data(c: &mut Criterion) {
    bench_stream(c, "bulk_data", &bulk_stream());
}

criterion_group!(benches, bench_fixed_commands, bench_bulk_data);

criterion_main!(benches);
